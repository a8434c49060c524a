// Hooks the task service calls once a mutation has committed. They act on
// behalf of the user named in the body and sit behind the hook credential.

use axum::{extract::Extension, http::StatusCode, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tasklive_common::protocol::events::TaskEventKind;
use tasklive_common::types::{Notification, NotificationCategory, UserId};

use crate::{
    error::{ErrorCode, RelayError},
    events::TaskSubject,
    fanout::DeliveryReport,
    hub::RealtimeHub,
    validation::ValidatedJson,
};

const MAX_TITLE_CHARS: usize = 200;
const MAX_MESSAGE_CHARS: usize = 2_000;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PublishTaskEventRequest {
    /// `task:created` or the bare kind (`created`).
    event: String,
    /// Owner of the task.
    user_id: UserId,
    #[serde(default)]
    task: Option<Value>,
    #[serde(default)]
    task_id: Option<Value>,
    /// Used for the notification when `task` has no title.
    #[serde(default)]
    title: Option<String>,
    #[serde(default = "default_notify")]
    notify: bool,
    /// Deliver to every connection instead of only the owner's.
    #[serde(default)]
    broadcast: bool,
}

fn default_notify() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecordNotificationRequest {
    user_id: UserId,
    #[serde(rename = "type")]
    category: NotificationCategory,
    title: String,
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PublishResponse {
    recipients: usize,
    delivered: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    notification: Option<Notification>,
}

impl PublishResponse {
    fn new(report: DeliveryReport, notification: Option<Notification>) -> Self {
        Self { recipients: report.recipients, delivered: report.delivered, notification }
    }
}

pub(super) fn routes() -> Router {
    Router::new()
        .route("/v1/events/tasks", post(publish_task_event))
        .route("/v1/events/notifications", post(record_notification))
}

async fn publish_task_event(
    Extension(hub): Extension<RealtimeHub>,
    ValidatedJson(payload): ValidatedJson<PublishTaskEventRequest>,
) -> Result<(StatusCode, Json<PublishResponse>), RelayError> {
    let kind = parse_task_event(&payload.event)?;
    let subject = match (payload.task, payload.task_id) {
        (Some(task @ Value::Object(_)), _) => TaskSubject::Task(task),
        (Some(_), _) => {
            return Err(RelayError::new(ErrorCode::ValidationFailed, "task must be an object"))
        }
        (None, Some(task_id)) => TaskSubject::Id(task_id),
        (None, None) => {
            return Err(RelayError::new(
                ErrorCode::ValidationFailed,
                "either task or taskId is required",
            ))
        }
    };

    let owner = payload.user_id;
    let events = hub.task_events();
    let report = if payload.broadcast {
        events.broadcast(&owner, kind, &subject).await
    } else {
        events.publish(&owner, kind, &subject).await
    };
    let notification = if payload.notify {
        Some(events.notify(&owner, kind, &subject, payload.title.as_deref()).await)
    } else {
        None
    };

    Ok((StatusCode::ACCEPTED, Json(PublishResponse::new(report, notification))))
}

async fn record_notification(
    Extension(hub): Extension<RealtimeHub>,
    ValidatedJson(payload): ValidatedJson<RecordNotificationRequest>,
) -> Result<(StatusCode, Json<Notification>), RelayError> {
    validate_text("title", &payload.title, MAX_TITLE_CHARS)?;
    validate_text("message", &payload.message, MAX_MESSAGE_CHARS)?;

    let notification = hub
        .notifications()
        .record(&payload.user_id, payload.category, payload.title, payload.message, payload.data)
        .await;

    Ok((StatusCode::CREATED, Json(notification)))
}

fn parse_task_event(event: &str) -> Result<TaskEventKind, RelayError> {
    let qualified = if event.contains(':') { event.to_owned() } else { format!("task:{event}") };
    TaskEventKind::from_event_name(&qualified).ok_or_else(|| {
        RelayError::new(ErrorCode::ValidationFailed, "unsupported task event")
            .with_details(json!({ "event": event }))
    })
}

fn validate_text(field: &'static str, value: &str, max_chars: usize) -> Result<(), RelayError> {
    if value.trim().is_empty() {
        return Err(RelayError::new(ErrorCode::ValidationFailed, format!("{field} must not be empty"))
            .with_details(json!({ "field": field })));
    }
    if value.chars().count() > max_chars {
        return Err(RelayError::new(
            ErrorCode::ValidationFailed,
            format!("{field} exceeds {max_chars} characters"),
        )
        .with_details(json!({ "field": field })));
    }
    Ok(())
}
