// Task events published by the REST layer after a mutation commits.

use std::sync::Arc;

use serde_json::{json, Value};
use tasklive_common::protocol::events::TaskEventKind;
use tasklive_common::types::{Notification, UserId};
use tracing::debug;

use crate::fanout::{DeliveryReport, FanoutRouter};
use crate::notifications::{NotificationStore, TaskAction};

/// What was mutated: a full task record, or just its id once it is gone.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskSubject {
    Task(Value),
    Id(Value),
}

impl TaskSubject {
    fn task_id(&self) -> Value {
        match self {
            Self::Task(task) => task.get("id").cloned().unwrap_or(Value::Null),
            Self::Id(id) => id.clone(),
        }
    }

    fn title(&self) -> Option<&str> {
        match self {
            Self::Task(task) => task.get("title").and_then(Value::as_str),
            Self::Id(_) => None,
        }
    }

    fn is_completed(&self) -> bool {
        match self {
            Self::Task(task) => task.get("completed").and_then(Value::as_bool).unwrap_or(false),
            Self::Id(_) => false,
        }
    }
}

/// Notification action implied by a task event. A toggle counts as a
/// completion only when the task ended up completed.
fn action_for(kind: TaskEventKind, subject: &TaskSubject) -> TaskAction {
    match kind {
        TaskEventKind::Created => TaskAction::Created,
        TaskEventKind::Updated => TaskAction::Updated,
        TaskEventKind::Deleted => TaskAction::Deleted,
        TaskEventKind::Toggled if subject.is_completed() => TaskAction::Completed,
        TaskEventKind::Toggled => TaskAction::Updated,
    }
}

#[derive(Debug, Clone)]
pub struct TaskEvents {
    router: FanoutRouter,
    notifications: Arc<NotificationStore>,
}

impl TaskEvents {
    pub fn new(router: FanoutRouter, notifications: Arc<NotificationStore>) -> Self {
        Self { router, notifications }
    }

    /// Pushes `task:<kind>` with `{task | taskId, userId}` to the owner's
    /// connections.
    pub async fn publish(
        &self,
        owner: &UserId,
        kind: TaskEventKind,
        subject: &TaskSubject,
    ) -> DeliveryReport {
        let report = self.router.to_user(owner, kind.event_name(), payload(owner, subject)).await;
        debug!(%owner, event = kind.event_name(), delivered = report.delivered, "task event published");
        report
    }

    /// Same as [`publish`](Self::publish) but to every connection.
    pub async fn broadcast(
        &self,
        owner: &UserId,
        kind: TaskEventKind,
        subject: &TaskSubject,
    ) -> DeliveryReport {
        self.router.to_all(kind.event_name(), payload(owner, subject)).await
    }

    /// Records the task notification implied by `kind` for the owner.
    /// `fallback_title` is used when the subject carries no title.
    pub async fn notify(
        &self,
        owner: &UserId,
        kind: TaskEventKind,
        subject: &TaskSubject,
        fallback_title: Option<&str>,
    ) -> Notification {
        let title = subject.title().or(fallback_title).unwrap_or("Untitled");
        self.notifications
            .notify_task(owner, action_for(kind, subject), title, subject.task_id())
            .await
    }
}

fn payload(owner: &UserId, subject: &TaskSubject) -> Value {
    match subject {
        TaskSubject::Task(task) => json!({ "task": task, "userId": owner }),
        TaskSubject::Id(task_id) => json!({ "taskId": task_id, "userId": owner }),
    }
}

#[cfg(test)]
mod tests {
    use tasklive_common::types::ConnectionId;
    use tokio::sync::mpsc;

    use super::*;
    use crate::registry::{ConnectionRegistry, OutboundFrame};

    fn user(id: &str) -> UserId {
        UserId::new(id).expect("test user id should be valid")
    }

    struct Harness {
        registry: Arc<ConnectionRegistry>,
        notifications: Arc<NotificationStore>,
        events: TaskEvents,
    }

    fn harness() -> Harness {
        let registry = Arc::new(ConnectionRegistry::new());
        let router = FanoutRouter::new(Arc::clone(&registry));
        let notifications = Arc::new(NotificationStore::new(router.clone()));
        let events = TaskEvents::new(router, Arc::clone(&notifications));
        Harness { registry, notifications, events }
    }

    async fn joined(
        registry: &ConnectionRegistry,
        user_id: &str,
    ) -> mpsc::Receiver<OutboundFrame> {
        let connection_id = ConnectionId::new();
        let (tx, rx) = mpsc::channel(8);
        registry.register(connection_id, tx).await;
        registry.join(connection_id, user(user_id), user_id).await;
        rx
    }

    fn next(rx: &mut mpsc::Receiver<OutboundFrame>) -> Option<Value> {
        rx.try_recv().ok().map(|frame| serde_json::from_str(&frame).expect("frame should be json"))
    }

    #[tokio::test]
    async fn publish_reaches_only_the_owner() {
        let h = harness();
        let mut owner_rx = joined(&h.registry, "a").await;
        let mut other_rx = joined(&h.registry, "b").await;

        let subject = TaskSubject::Task(json!({ "id": 3, "title": "Write docs" }));
        let report = h.events.publish(&user("a"), TaskEventKind::Created, &subject).await;

        assert_eq!(report.delivered, 1);
        let frame = next(&mut owner_rx).expect("owner should receive the event");
        assert_eq!(frame["event"], "task:created");
        assert_eq!(frame["data"]["task"]["id"], 3);
        assert_eq!(frame["data"]["userId"], "a");
        assert!(next(&mut other_rx).is_none());
    }

    #[tokio::test]
    async fn deleted_event_carries_task_id() {
        let h = harness();
        let mut rx = joined(&h.registry, "a").await;

        h.events.publish(&user("a"), TaskEventKind::Deleted, &TaskSubject::Id(json!(9))).await;

        let frame = next(&mut rx).expect("event should arrive");
        assert_eq!(frame["event"], "task:deleted");
        assert_eq!(frame["data"]["taskId"], 9);
        assert!(frame["data"].get("task").is_none());
    }

    #[tokio::test]
    async fn broadcast_reaches_everyone() {
        let h = harness();
        let mut a = joined(&h.registry, "a").await;
        let mut b = joined(&h.registry, "b").await;

        let subject = TaskSubject::Task(json!({ "id": 1 }));
        h.events.broadcast(&user("a"), TaskEventKind::Updated, &subject).await;

        assert!(next(&mut a).is_some());
        assert!(next(&mut b).is_some());
    }

    #[tokio::test]
    async fn completed_toggle_records_completion_notification() {
        let h = harness();
        let mut rx = joined(&h.registry, "a").await;
        let subject = TaskSubject::Task(json!({ "id": 5, "title": "Ship", "completed": true }));

        h.events.publish(&user("a"), TaskEventKind::Toggled, &subject).await;
        h.events.notify(&user("a"), TaskEventKind::Toggled, &subject, None).await;

        let toggled = next(&mut rx).expect("task event should arrive first");
        assert_eq!(toggled["event"], "task:toggled");
        let created = next(&mut rx).expect("notification should follow");
        assert_eq!(created["event"], "notification:created");

        let log = h.notifications.list_for(&user("a")).await;
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].title, "Task Completed");
        assert_eq!(log[0].data, Some(json!({ "taskId": 5, "action": "completed" })));
    }

    #[tokio::test]
    async fn deleted_notification_uses_fallback_title() {
        let h = harness();
        h.events
            .notify(
                &user("offline"),
                TaskEventKind::Deleted,
                &TaskSubject::Id(json!(2)),
                Some("Old task"),
            )
            .await;

        let log = h.notifications.list_for(&user("offline")).await;
        assert_eq!(log[0].title, "Task Deleted");
        assert!(log[0].message.contains("\"Old task\""));
    }
}
