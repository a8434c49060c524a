// Core domain types shared by the relay and its clients.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// Longest logical user id the relay accepts.
pub const MAX_USER_ID_LEN: usize = 128;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UserIdError {
    #[error("user id must not be empty")]
    Empty,
    #[error("user id exceeds {MAX_USER_ID_LEN} characters")]
    TooLong,
}

/// Application-level identity a connection claims via `user:join`.
///
/// The REST layer hands these out as either integers or strings, so the
/// deserializer accepts both and normalizes to the decimal/string form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(value: impl Into<String>) -> Result<Self, UserIdError> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(UserIdError::Empty);
        }
        if trimmed.chars().count() > MAX_USER_ID_LEN {
            return Err(UserIdError::TooLong);
        }
        Ok(Self(trimmed.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for UserId {
    type Err = UserIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl<'de> Deserialize<'de> for UserId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawUserId {
            Text(String),
            Signed(i64),
            Unsigned(u64),
        }

        let raw = match RawUserId::deserialize(deserializer)? {
            RawUserId::Text(text) => text,
            RawUserId::Signed(number) => number.to_string(),
            RawUserId::Unsigned(number) => number.to_string(),
        };
        UserId::new(raw).map_err(serde::de::Error::custom)
    }
}

/// Opaque identifier of one live transport session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Aggregated online state of one logical user across all of its connections.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserPresence {
    pub logical_user_id: UserId,
    pub display_name: String,
    /// Sorted for stable output.
    pub connection_ids: Vec<ConnectionId>,
    pub first_joined_at: DateTime<Utc>,
}

/// Payload of `user:online` / `user:offline`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PresenceChange {
    pub logical_user_id: UserId,
    pub display_name: String,
    /// Distinct online users after the transition was applied.
    pub online_count: usize,
}

/// Payload of `users:online`, sent to a connection right after it joins.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OnlineRoster {
    pub users: Vec<UserPresence>,
    pub count: usize,
}

/// Status view returned by the presence endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PresenceSnapshot {
    pub online_count: usize,
    pub users: Vec<UserPresence>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NotificationCategory {
    Task,
    System,
    Message,
}

impl NotificationCategory {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Task => "task",
            Self::System => "system",
            Self::Message => "message",
        }
    }
}

/// A fact delivered to a user. Only `read` ever changes after creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub user_id: UserId,
    #[serde(rename = "type")]
    pub category: NotificationCategory,
    pub title: String,
    pub message: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}
