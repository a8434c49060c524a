use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::json;
use tasklive_common::types::Notification;

use crate::{
    auth::middleware::AuthenticatedUser,
    error::{ErrorCode, RelayError},
    hub::RealtimeHub,
};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct NotificationListResponse {
    notifications: Vec<Notification>,
    unread_count: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UnreadCountResponse {
    unread_count: usize,
}

pub(super) fn routes() -> Router {
    Router::new()
        .route("/v1/notifications", get(list_notifications).delete(clear_notifications))
        .route("/v1/notifications/unread-count", get(unread_count))
        .route("/v1/notifications/{notification_id}/read", post(mark_read))
}

async fn list_notifications(
    Extension(hub): Extension<RealtimeHub>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Json<NotificationListResponse> {
    let store = hub.notifications();
    let notifications = store.list_for(&user.user_id).await;
    let unread_count = notifications.iter().filter(|notification| !notification.read).count();
    Json(NotificationListResponse { notifications, unread_count })
}

async fn unread_count(
    Extension(hub): Extension<RealtimeHub>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Json<UnreadCountResponse> {
    Json(UnreadCountResponse { unread_count: hub.notifications().unread_count(&user.user_id).await })
}

async fn mark_read(
    Extension(hub): Extension<RealtimeHub>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(notification_id): Path<String>,
) -> Result<StatusCode, RelayError> {
    if hub.notifications().mark_read(&user.user_id, &notification_id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(RelayError::new(ErrorCode::NotFound, "notification not found")
            .with_details(json!({ "notification_id": notification_id })))
    }
}

async fn clear_notifications(
    Extension(hub): Extension<RealtimeHub>,
    Extension(user): Extension<AuthenticatedUser>,
) -> StatusCode {
    hub.notifications().clear_all(&user.user_id).await;
    StatusCode::NO_CONTENT
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use tasklive_common::types::NotificationCategory;
    use tower::ServiceExt;

    use crate::api::test_support::{json_body, request, user, TestApp};

    #[tokio::test]
    async fn lists_only_the_callers_notifications() {
        let app = TestApp::new();
        let store = app.hub.notifications();
        store.record(&user("a"), NotificationCategory::Task, "Task Created", "one", None).await;
        store.record(&user("a"), NotificationCategory::System, "Hello", "two", None).await;
        store.record(&user("b"), NotificationCategory::System, "Other", "three", None).await;

        let token = app.token("a");
        let response = app
            .router
            .oneshot(request("GET", "/v1/notifications", &token, None))
            .await
            .expect("request should return a response");
        let (status, body) = json_body(response).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["unreadCount"], 2);
        let titles: Vec<&str> = body["notifications"]
            .as_array()
            .expect("notifications should be an array")
            .iter()
            .filter_map(|notification| notification["title"].as_str())
            .collect();
        assert_eq!(titles, vec!["Task Created", "Hello"]);
    }

    #[tokio::test]
    async fn mark_read_returns_not_found_for_other_users_notification() {
        let app = TestApp::new();
        let notification = app.hub.notifications().notify_system(&user("a"), "t", "m").await;

        let token = app.token("b");
        let uri = format!("/v1/notifications/{}/read", notification.id);
        let response = app
            .router
            .clone()
            .oneshot(request("POST", &uri, &token, None))
            .await
            .expect("request should return a response");
        let (status, body) = json_body(response).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "NOT_FOUND");
        assert_eq!(app.hub.notifications().unread_count(&user("a")).await, 1);
    }

    #[tokio::test]
    async fn mark_read_then_unread_count_drops() {
        let app = TestApp::new();
        let notification = app.hub.notifications().notify_system(&user("a"), "t", "m").await;
        let token = app.token("a");

        let uri = format!("/v1/notifications/{}/read", notification.id);
        let response = app
            .router
            .clone()
            .oneshot(request("POST", &uri, &token, None))
            .await
            .expect("request should return a response");
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = app
            .router
            .oneshot(request("GET", "/v1/notifications/unread-count", &token, None))
            .await
            .expect("request should return a response");
        let (_, body) = json_body(response).await;
        assert_eq!(body["unreadCount"], 0);
    }

    #[tokio::test]
    async fn clear_discards_the_log() {
        let app = TestApp::new();
        app.hub.notifications().notify_system(&user("a"), "t", "m").await;
        let token = app.token("a");

        let response = app
            .router
            .clone()
            .oneshot(request("DELETE", "/v1/notifications", &token, None))
            .await
            .expect("request should return a response");
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(app.hub.notifications().list_for(&user("a")).await.is_empty());
    }
}
