// WebSocket frame types for the tasklive real-time protocol.
//
// Every frame in either direction is a JSON object `{"event": <name>, "data": <payload>}`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::events::{self, TaskEventKind};
use crate::types::UserId;

/// Longest display name accepted in `user:join`.
pub const MAX_DISPLAY_NAME_LEN: usize = 64;

/// A raw frame as it travels over the socket.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Frame {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

impl Frame {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self { event: event.into(), data }
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Frames a client may send to the relay.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    Join(JoinRequest),
    Typing(TypingNotice),
    StoppedTyping(TypingNotice),
    /// A client echoing a task mutation it just performed.
    Task { kind: TaskEventKind, payload: Value },
    SendNotification(NotificationSend),
}

impl ClientMessage {
    pub fn decode(raw: &str) -> Result<Self, FrameError> {
        let frame = serde_json::from_str::<Frame>(raw).map_err(FrameError::Malformed)?;
        Self::from_frame(frame)
    }

    pub fn from_frame(frame: Frame) -> Result<Self, FrameError> {
        let Frame { event, data } = frame;
        match event.as_str() {
            events::USER_JOIN => parse_payload(&event, data).map(Self::Join),
            events::USER_TYPING => parse_payload(&event, data).map(Self::Typing),
            events::USER_STOPPED_TYPING => parse_payload(&event, data).map(Self::StoppedTyping),
            events::NOTIFICATION_SEND => parse_payload(&event, data).map(Self::SendNotification),
            name => match TaskEventKind::from_event_name(name) {
                Some(kind) => Ok(Self::Task { kind, payload: data }),
                None => Err(FrameError::UnsupportedEvent(event)),
            },
        }
    }

    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Join(_) => events::USER_JOIN,
            Self::Typing(_) => events::USER_TYPING,
            Self::StoppedTyping(_) => events::USER_STOPPED_TYPING,
            Self::Task { kind, .. } => kind.event_name(),
            Self::SendNotification(_) => events::NOTIFICATION_SEND,
        }
    }
}

fn parse_payload<T>(event: &str, data: Value) -> Result<T, FrameError>
where
    T: for<'de> Deserialize<'de>,
{
    let data = if data.is_null() { Value::Object(Map::new()) } else { data };
    serde_json::from_value(data)
        .map_err(|source| FrameError::InvalidPayload { event: event.to_string(), source })
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("frame is not a valid {{event, data}} object: {0}")]
    Malformed(#[source] serde_json::Error),
    #[error("unsupported event `{0}`")]
    UnsupportedEvent(String),
    #[error("invalid payload for `{event}`: {source}")]
    InvalidPayload {
        event: String,
        #[source]
        source: serde_json::Error,
    },
}

impl FrameError {
    /// The event the frame claimed to carry, when it got that far.
    pub fn event(&self) -> Option<&str> {
        match self {
            Self::Malformed(_) => None,
            Self::UnsupportedEvent(event) | Self::InvalidPayload { event, .. } => Some(event),
        }
    }
}

/// `user:join` payload. Fields are optional on the wire so a missing field
/// surfaces as a [`JoinRejection`] instead of a generic decode failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    #[serde(default, alias = "userId", skip_serializing_if = "Option::is_none")]
    pub logical_user_id: Option<UserId>,
    #[serde(default, alias = "username", skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl JoinRequest {
    pub fn new(logical_user_id: UserId, display_name: impl Into<String>) -> Self {
        Self { logical_user_id: Some(logical_user_id), display_name: Some(display_name.into()) }
    }

    pub fn validate(self) -> Result<(UserId, String), JoinRejection> {
        let user_id = self.logical_user_id.ok_or(JoinRejection::MissingUserId)?;
        let display_name = self
            .display_name
            .map(|name| name.trim().to_owned())
            .filter(|name| !name.is_empty())
            .ok_or(JoinRejection::MissingDisplayName)?;
        if display_name.chars().count() > MAX_DISPLAY_NAME_LEN {
            return Err(JoinRejection::DisplayNameTooLong);
        }
        Ok((user_id, display_name))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum JoinRejection {
    #[error("join requires a logical user id")]
    MissingUserId,
    #[error("join requires a display name")]
    MissingDisplayName,
    #[error("display name exceeds {MAX_DISPLAY_NAME_LEN} characters")]
    DisplayNameTooLong,
}

/// `user:typing` / `user:stopped-typing` payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TypingNotice {
    #[serde(default, alias = "userId", skip_serializing_if = "Option::is_none")]
    pub logical_user_id: Option<UserId>,
    #[serde(default, alias = "username", skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

/// `notification:send` payload: a target user (absent means everyone) plus
/// whatever notification fields the client supplied.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NotificationSend {
    #[serde(default, alias = "logicalUserId", skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// Payload of an `error` frame.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorFrame {
    pub code: String,
    pub message: String,
    pub retryable: bool,
}
