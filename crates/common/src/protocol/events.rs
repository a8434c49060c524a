// Event names of the real-time wire vocabulary.

use serde::{Deserialize, Serialize};

/// Client -> Server: claim a logical user identity for this connection.
pub const USER_JOIN: &str = "user:join";
/// Server -> joining client: current roster.
pub const USERS_ONLINE: &str = "users:online";
pub const USER_ONLINE: &str = "user:online";
pub const USER_OFFLINE: &str = "user:offline";
pub const USER_TYPING: &str = "user:typing";
pub const USER_STOPPED_TYPING: &str = "user:stopped-typing";
pub const TASK_CREATED: &str = "task:created";
pub const TASK_UPDATED: &str = "task:updated";
pub const TASK_DELETED: &str = "task:deleted";
pub const TASK_TOGGLED: &str = "task:toggled";
pub const NOTIFICATION_CREATED: &str = "notification:created";
pub const NOTIFICATION_RECEIVED: &str = "notification:received";
/// Client -> Server: ask the relay to push a notification to a user (or everyone).
pub const NOTIFICATION_SEND: &str = "notification:send";
/// Server -> Client: a frame could not be processed.
pub const ERROR: &str = "error";

/// The task mutations the REST layer announces.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskEventKind {
    Created,
    Updated,
    Deleted,
    Toggled,
}

impl TaskEventKind {
    pub const ALL: [TaskEventKind; 4] = [Self::Created, Self::Updated, Self::Deleted, Self::Toggled];

    pub const fn event_name(self) -> &'static str {
        match self {
            Self::Created => TASK_CREATED,
            Self::Updated => TASK_UPDATED,
            Self::Deleted => TASK_DELETED,
            Self::Toggled => TASK_TOGGLED,
        }
    }

    pub fn from_event_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.event_name() == name)
    }
}
