// Long-lived realtime state created once at startup and injected into the
// websocket and REST routers.

use std::sync::Arc;
use std::time::Duration;

use tasklive_common::types::{ConnectionId, PresenceSnapshot, UserId};
use tokio::sync::Mutex;
use tracing::info;

use crate::config::RelayConfig;
use crate::events::TaskEvents;
use crate::fanout::FanoutRouter;
use crate::metrics;
use crate::notifications::NotificationStore;
use crate::presence;
use crate::registry::ConnectionRegistry;

/// Per-connection session limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionLimits {
    pub outbound_queue_capacity: usize,
    pub heartbeat_interval: Duration,
    pub heartbeat_timeout: Duration,
}

impl From<&RelayConfig> for SessionLimits {
    fn from(config: &RelayConfig) -> Self {
        Self {
            outbound_queue_capacity: config.outbound_queue_capacity,
            heartbeat_interval: config.heartbeat_interval,
            heartbeat_timeout: config.heartbeat_timeout,
        }
    }
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self::from(&RelayConfig::default())
    }
}

#[derive(Debug, Clone)]
pub struct RealtimeHub {
    registry: Arc<ConnectionRegistry>,
    router: FanoutRouter,
    notifications: Arc<NotificationStore>,
    task_events: TaskEvents,
    limits: SessionLimits,
    /// Held across a presence mutation and its announcement, so observers
    /// see transitions in the order the registry applied them.
    presence_gate: Arc<Mutex<()>>,
}

impl RealtimeHub {
    pub fn new(limits: SessionLimits) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let router = FanoutRouter::new(Arc::clone(&registry));
        let notifications = Arc::new(NotificationStore::new(router.clone()));
        let task_events = TaskEvents::new(router.clone(), Arc::clone(&notifications));
        Self {
            registry,
            router,
            notifications,
            task_events,
            limits,
            presence_gate: Arc::new(Mutex::new(())),
        }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn router(&self) -> &FanoutRouter {
        &self.router
    }

    pub fn notifications(&self) -> &NotificationStore {
        &self.notifications
    }

    pub fn task_events(&self) -> &TaskEvents {
        &self.task_events
    }

    pub fn limits(&self) -> SessionLimits {
        self.limits
    }

    /// Attributes `connection_id` to `user_id` and announces any transitions.
    pub async fn join(
        &self,
        connection_id: ConnectionId,
        user_id: UserId,
        display_name: impl Into<String>,
    ) {
        let _gate = self.presence_gate.lock().await;
        let outcome = self.registry.join(connection_id, user_id, display_name).await;
        presence::announce_join(&self.router, connection_id, outcome).await;
    }

    /// Forgets `connection_id`, announcing `user:offline` when it was the
    /// user's last connection.
    pub async fn leave(&self, connection_id: ConnectionId) {
        let _gate = self.presence_gate.lock().await;
        if let Some(offline) = self.registry.leave(connection_id).await {
            presence::announce_departure(&self.router, offline).await;
        }
    }

    pub async fn presence_snapshot(&self) -> PresenceSnapshot {
        let users = self.registry.all_presences().await;
        PresenceSnapshot { online_count: users.len(), users }
    }

    pub async fn online_count(&self) -> usize {
        self.registry.online_count().await
    }

    /// Pushes connection, anonymous-connection and online-user counts into the
    /// gauges, all taken from one registry snapshot.
    pub async fn refresh_gauges(&self) {
        if let Some(metrics) = metrics::global_metrics() {
            metrics.set_presence_gauges(self.registry.counts().await);
        }
    }

    /// Drops every registered connection so session write loops wind down.
    pub async fn shutdown(&self) {
        let drained = self.registry.drain().await;
        info!(drained, "realtime hub drained");
    }
}

impl Default for RealtimeHub {
    fn default() -> Self {
        Self::new(SessionLimits::default())
    }
}
