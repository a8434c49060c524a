use axum::extract::ws::{Message, WebSocket};
use serde_json::Value;
use tasklive_common::protocol::ws::{ErrorFrame, FrameError, JoinRejection};

use crate::registry::OutboundFrame;

pub const INVALID_FRAME: &str = "INVALID_FRAME";
pub const UNSUPPORTED_EVENT: &str = "UNSUPPORTED_EVENT";
pub const INVALID_PAYLOAD: &str = "INVALID_PAYLOAD";
pub const JOIN_INVALID: &str = "JOIN_INVALID";
pub const FRAME_TOO_LARGE: &str = "FRAME_TOO_LARGE";

/// Problems with one inbound frame. Reported back to the sender as an
/// `error` frame; the connection stays open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundError {
    pub code: &'static str,
    pub message: String,
}

impl InboundError {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }

    pub fn to_frame(&self) -> ErrorFrame {
        ErrorFrame { code: self.code.to_string(), message: self.message.clone(), retryable: false }
    }

    pub fn payload(&self) -> Value {
        serde_json::to_value(self.to_frame()).unwrap_or(Value::Null)
    }
}

impl From<FrameError> for InboundError {
    fn from(error: FrameError) -> Self {
        let code = match &error {
            FrameError::Malformed(_) => INVALID_FRAME,
            FrameError::UnsupportedEvent(_) => UNSUPPORTED_EVENT,
            FrameError::InvalidPayload { .. } => INVALID_PAYLOAD,
        };
        Self::new(code, error.to_string())
    }
}

impl From<JoinRejection> for InboundError {
    fn from(rejection: JoinRejection) -> Self {
        Self::new(JOIN_INVALID, rejection.to_string())
    }
}

pub async fn send_ws_frame(socket: &mut WebSocket, frame: &OutboundFrame) -> Result<(), ()> {
    socket.send(Message::Text(frame.to_string().into())).await.map_err(|_| ())
}
