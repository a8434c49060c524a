// Input validation helpers.
//
// - `ValidatedJson<T>` extractor: content-type check + serde + size enforcement.
// - WebSocket frame size limit.

use axum::{
    extract::{rejection::JsonRejection, FromRequest, Request},
    response::{IntoResponse, Response},
    Json,
};
use serde::de::DeserializeOwned;

use crate::error::{default_code_for_status, RelayError};

/// Maximum WebSocket text frame in bytes (64 KiB).
pub const MAX_WS_FRAME_BYTES: usize = 64 * 1024;

/// Maximum REST request body in bytes (256 KiB).
pub const MAX_REST_BODY_BYTES: usize = 256 * 1024;

/// A JSON body extractor that returns structured `RelayError` on failure.
///
/// Use this instead of `axum::Json<T>` in handlers to get consistent
/// VALIDATION_FAILED error responses instead of plain-text Axum rejections.
pub struct ValidatedJson<T>(pub T);

impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ValidatedJson(value)),
            Err(rejection) => {
                let (message, details) = classify_json_rejection(&rejection);
                Err(RelayError::new(default_code_for_status(rejection.status()), message)
                    .with_details(details)
                    .into_response())
            }
        }
    }
}

fn classify_json_rejection(rejection: &JsonRejection) -> (String, serde_json::Value) {
    match rejection {
        JsonRejection::JsonDataError(e) => (
            format!("invalid JSON payload: {e}"),
            serde_json::json!({ "kind": "data_error" }),
        ),
        JsonRejection::JsonSyntaxError(e) => (
            format!("malformed JSON: {e}"),
            serde_json::json!({ "kind": "syntax_error" }),
        ),
        JsonRejection::MissingJsonContentType(_) => (
            "expected Content-Type: application/json".to_string(),
            serde_json::json!({ "kind": "missing_content_type" }),
        ),
        JsonRejection::BytesRejection(e) => (
            format!("request body error: {e}"),
            serde_json::json!({ "kind": "body_error" }),
        ),
        other => (
            format!("request body error: {other}"),
            serde_json::json!({ "kind": "unknown" }),
        ),
    }
}

/// Rejects text frames over [`MAX_WS_FRAME_BYTES`]. The message is sent back
/// to the client in an `error` frame.
pub fn check_ws_frame_size(payload: &str) -> Result<(), String> {
    if payload.len() > MAX_WS_FRAME_BYTES {
        Err(format!(
            "frame size {} bytes exceeds limit of {} bytes",
            payload.len(),
            MAX_WS_FRAME_BYTES
        ))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
        routing::post,
        Router,
    };
    use serde::Deserialize;
    use tower::ServiceExt;

    #[derive(Deserialize)]
    struct Payload {
        #[allow(dead_code)]
        title: String,
    }

    async fn accept(ValidatedJson(_payload): ValidatedJson<Payload>) -> StatusCode {
        StatusCode::NO_CONTENT
    }

    async fn send(body: &'static str, content_type: Option<&str>) -> (StatusCode, serde_json::Value) {
        let mut builder = Request::builder().method("POST").uri("/");
        if let Some(content_type) = content_type {
            builder = builder.header("content-type", content_type);
        }
        let response = Router::new()
            .route("/", post(accept))
            .oneshot(builder.body(Body::from(body)).expect("request should build"))
            .await
            .expect("request should return a response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body should read");
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("error body should be json")
        };
        (status, json)
    }

    #[tokio::test]
    async fn accepts_well_formed_json() {
        let (status, _) = send(r#"{"title":"ok"}"#, Some("application/json")).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn syntax_errors_are_classified() {
        let (status, body) = send("{not json", Some("application/json")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_FAILED");
        assert_eq!(body["error"]["details"]["kind"], "syntax_error");
    }

    #[tokio::test]
    async fn missing_fields_are_data_errors() {
        let (_, body) = send(r#"{"other":1}"#, Some("application/json")).await;
        assert_eq!(body["error"]["details"]["kind"], "data_error");
    }

    #[tokio::test]
    async fn missing_content_type_is_rejected() {
        let (_, body) = send(r#"{"title":"ok"}"#, None).await;
        assert_eq!(body["error"]["details"]["kind"], "missing_content_type");
    }

    #[test]
    fn frame_size_limit() {
        assert!(check_ws_frame_size("small").is_ok());
        let oversized = "a".repeat(MAX_WS_FRAME_BYTES + 1);
        assert!(check_ws_frame_size(&oversized).is_err());
    }
}
