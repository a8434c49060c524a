// Presence transitions and the frames that announce them.

use serde_json::Value;
use tasklive_common::protocol::events;
use tasklive_common::types::{ConnectionId, OnlineRoster, PresenceChange, UserId};
use tracing::info;

use crate::fanout::FanoutRouter;
use crate::metrics;
use crate::registry::JoinOutcome;

/// A user crossing the zero-connections boundary in either direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenceTransition {
    Online(PresenceChange),
    Offline(PresenceChange),
}

impl PresenceTransition {
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::Online(_) => events::USER_ONLINE,
            Self::Offline(_) => events::USER_OFFLINE,
        }
    }

    pub fn change(&self) -> &PresenceChange {
        match self {
            Self::Online(change) | Self::Offline(change) => change,
        }
    }

    pub fn payload(&self) -> Value {
        serde_json::to_value(self.change()).unwrap_or(Value::Null)
    }

    const fn metric_label(&self) -> &'static str {
        match self {
            Self::Online(_) => "online",
            Self::Offline(_) => "offline",
        }
    }
}

pub(crate) fn went_online(
    logical_user_id: UserId,
    display_name: String,
    online_count: usize,
) -> PresenceTransition {
    PresenceTransition::Online(PresenceChange { logical_user_id, display_name, online_count })
}

pub(crate) fn went_offline(
    logical_user_id: UserId,
    display_name: String,
    online_count: usize,
) -> PresenceTransition {
    PresenceTransition::Offline(PresenceChange { logical_user_id, display_name, online_count })
}

/// Broadcasts the transitions produced by a join. The joining connection
/// already knows it is online, so `user:online` skips it; it gets the full
/// roster instead.
pub async fn announce_join(router: &FanoutRouter, connection_id: ConnectionId, outcome: JoinOutcome) {
    if let Some(offline) = outcome.went_offline {
        announce_departure(router, offline).await;
    }

    if let Some(online) = outcome.came_online {
        let change = online.change();
        info!(
            logical_user_id = %change.logical_user_id,
            online_count = change.online_count,
            "user came online"
        );
        metrics::record_presence_transition(online.metric_label());
        router.to_others(connection_id, online.event_name(), online.payload()).await;
    }

    send_roster(router, connection_id).await;
}

/// Broadcasts `user:offline` to every remaining connection.
pub async fn announce_departure(router: &FanoutRouter, transition: PresenceTransition) {
    let change = transition.change();
    info!(
        logical_user_id = %change.logical_user_id,
        online_count = change.online_count,
        "user went offline"
    );
    metrics::record_presence_transition(transition.metric_label());
    router.to_all(transition.event_name(), transition.payload()).await;
}

/// Sends `users:online` with the current roster to one connection.
pub async fn send_roster(router: &FanoutRouter, connection_id: ConnectionId) {
    let users = router.registry().all_presences().await;
    let roster = OnlineRoster { count: users.len(), users };
    match serde_json::to_value(&roster) {
        Ok(payload) => {
            router.to_connection(connection_id, events::USERS_ONLINE, payload).await;
        }
        Err(error) => {
            tracing::error!(%connection_id, %error, "failed to encode online roster");
        }
    }
}
