// Per-user notification logs, held in memory for the life of the process.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use serde_json::{json, Value};
use tasklive_common::protocol::events;
use tasklive_common::types::{Notification, NotificationCategory, UserId};
use tokio::sync::RwLock;
use tracing::{error, info};

use crate::fanout::FanoutRouter;
use crate::metrics;

/// Task lifecycle actions that produce a user-facing notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskAction {
    Created,
    Updated,
    Completed,
    Deleted,
}

impl TaskAction {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Completed => "completed",
            Self::Deleted => "deleted",
        }
    }

    fn title(self) -> &'static str {
        match self {
            Self::Created => "Task Created",
            Self::Updated => "Task Updated",
            Self::Completed => "Task Completed",
            Self::Deleted => "Task Deleted",
        }
    }

    fn message(self, task_title: &str) -> String {
        match self {
            Self::Created => format!("Your task \"{task_title}\" has been created."),
            Self::Updated => format!("Your task \"{task_title}\" has been updated."),
            Self::Completed => format!("You completed the task \"{task_title}\". Great job! 🎉"),
            Self::Deleted => format!("Your task \"{task_title}\" has been deleted."),
        }
    }
}

#[derive(Debug)]
pub struct NotificationStore {
    logs: RwLock<HashMap<UserId, Vec<Notification>>>,
    sequence: AtomicU64,
    router: FanoutRouter,
}

impl NotificationStore {
    pub fn new(router: FanoutRouter) -> Self {
        Self { logs: RwLock::new(HashMap::new()), sequence: AtomicU64::new(1), router }
    }

    /// Appends a notification to the user's log and pushes
    /// `notification:created` to that user's connections, if any.
    pub async fn record(
        &self,
        user_id: &UserId,
        category: NotificationCategory,
        title: impl Into<String>,
        message: impl Into<String>,
        data: Option<Value>,
    ) -> Notification {
        let created_at = Utc::now();
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let notification = Notification {
            id: format!("notif_{}_{sequence}", created_at.timestamp_millis()),
            user_id: user_id.clone(),
            category,
            title: title.into(),
            message: message.into(),
            read: false,
            created_at,
            data,
        };

        self.logs.write().await.entry(user_id.clone()).or_default().push(notification.clone());
        metrics::record_notification(category.as_str());
        info!(
            %user_id,
            notification_id = %notification.id,
            category = category.as_str(),
            "notification recorded"
        );

        match serde_json::to_value(&notification) {
            Ok(payload) => {
                self.router.to_user(user_id, events::NOTIFICATION_CREATED, payload).await;
            }
            Err(err) => error!(%user_id, error = %err, "failed to encode notification"),
        }

        notification
    }

    /// The user's notifications in creation order.
    pub async fn list_for(&self, user_id: &UserId) -> Vec<Notification> {
        self.logs.read().await.get(user_id).cloned().unwrap_or_default()
    }

    /// Marks one of `user_id`'s notifications read. Ids belonging to other
    /// users are treated as not found.
    pub async fn mark_read(&self, user_id: &UserId, notification_id: &str) -> bool {
        let mut logs = self.logs.write().await;
        let Some(notification) = logs
            .get_mut(user_id)
            .and_then(|log| log.iter_mut().find(|notification| notification.id == notification_id))
        else {
            return false;
        };
        notification.read = true;
        true
    }

    pub async fn unread_count(&self, user_id: &UserId) -> usize {
        self.logs
            .read()
            .await
            .get(user_id)
            .map(|log| log.iter().filter(|notification| !notification.read).count())
            .unwrap_or(0)
    }

    pub async fn clear_all(&self, user_id: &UserId) {
        if let Some(log) = self.logs.write().await.remove(user_id) {
            info!(%user_id, cleared = log.len(), "notifications cleared");
        }
    }

    pub async fn notify_task(
        &self,
        user_id: &UserId,
        action: TaskAction,
        task_title: &str,
        task_id: Value,
    ) -> Notification {
        self.record(
            user_id,
            NotificationCategory::Task,
            action.title(),
            action.message(task_title),
            Some(json!({ "taskId": task_id, "action": action.as_str() })),
        )
        .await
    }

    pub async fn notify_system(
        &self,
        user_id: &UserId,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Notification {
        self.record(user_id, NotificationCategory::System, title, message, None).await
    }
}
