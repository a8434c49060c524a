// Connection registry: which live connections exist and which logical user
// each one belongs to.
//
// Both maps live behind a single lock. A connection row that references a
// user and that user's presence entry are always created and destroyed in
// the same critical section, so readers never see a presence with zero
// connections or a connection pointing at a missing presence.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tasklive_common::types::{ConnectionId, UserId, UserPresence};
use tokio::sync::{mpsc, RwLock};

use crate::fanout::DeliveryTarget;
use crate::presence::{self, PresenceTransition};

/// Encoded frame shared by every recipient of one fan-out call.
pub type OutboundFrame = Arc<str>;

/// Sending half of a connection's bounded outbound queue.
pub type OutboundSender = mpsc::Sender<OutboundFrame>;

#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    state: RwLock<RegistryState>,
}

#[derive(Debug, Default)]
struct RegistryState {
    connections: HashMap<ConnectionId, ConnectionRecord>,
    presences: HashMap<UserId, PresenceRecord>,
}

#[derive(Debug)]
struct ConnectionRecord {
    user_id: Option<UserId>,
    /// `None` for connections attributed through [`ConnectionRegistry::join`]
    /// without a prior [`ConnectionRegistry::register`] (no transport attached).
    outbound: Option<OutboundSender>,
}

#[derive(Debug)]
struct PresenceRecord {
    display_name: String,
    connections: HashSet<ConnectionId>,
    first_joined_at: DateTime<Utc>,
}

/// Presence transitions caused by one `join` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JoinOutcome {
    /// The connection previously belonged to another user and was that
    /// user's last connection.
    pub went_offline: Option<PresenceTransition>,
    /// This was the first connection for the joining user.
    pub came_online: Option<PresenceTransition>,
}

/// One resolved delivery target.
#[derive(Debug, Clone)]
pub(crate) struct Recipient {
    pub(crate) connection_id: ConnectionId,
    pub(crate) outbound: Option<OutboundSender>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryCounts {
    /// Open connections, joined or not.
    pub connections: usize,
    /// Connections attributed to some user.
    pub joined: usize,
    /// Distinct users with at least one connection.
    pub online: usize,
}

impl RegistryCounts {
    /// Open connections that have not joined as any user.
    pub fn anonymous(&self) -> usize {
        self.connections.saturating_sub(self.joined)
    }
}

/// Identity a connection claimed via join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionIdentity {
    pub user_id: UserId,
    pub display_name: String,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a freshly accepted transport session. It stays anonymous until
    /// it joins, but still receives `to_all`/`to_others` deliveries.
    pub async fn register(&self, connection_id: ConnectionId, outbound: OutboundSender) {
        let mut guard = self.state.write().await;
        let record = guard.connections.entry(connection_id).or_insert_with(|| ConnectionRecord {
            user_id: None,
            outbound: None,
        });
        record.outbound = Some(outbound);
    }

    /// Attributes `connection_id` to `user_id`. Re-joining overwrites the
    /// previous attribution, which may take the previous owner offline.
    pub async fn join(
        &self,
        connection_id: ConnectionId,
        user_id: UserId,
        display_name: impl Into<String>,
    ) -> JoinOutcome {
        let display_name = display_name.into();
        let now = Utc::now();
        let mut guard = self.state.write().await;
        let state = &mut *guard;

        let record = state.connections.entry(connection_id).or_insert_with(|| ConnectionRecord {
            user_id: None,
            outbound: None,
        });
        let previous_owner = record.user_id.replace(user_id.clone());

        let mut outcome = JoinOutcome::default();
        if let Some(previous_owner) = previous_owner.filter(|owner| *owner != user_id) {
            outcome.went_offline = state.detach(connection_id, &previous_owner);
        }

        match state.presences.get_mut(&user_id) {
            Some(presence) => {
                presence.connections.insert(connection_id);
                presence.display_name = display_name;
            }
            None => {
                state.presences.insert(
                    user_id.clone(),
                    PresenceRecord {
                        display_name: display_name.clone(),
                        connections: HashSet::from([connection_id]),
                        first_joined_at: now,
                    },
                );
                outcome.came_online = Some(presence::went_online(
                    user_id,
                    display_name,
                    state.presences.len(),
                ));
            }
        }

        outcome
    }

    /// Forgets `connection_id`. Returns the offline transition when it was the
    /// last connection of its user. Unknown ids are a no-op.
    pub async fn leave(&self, connection_id: ConnectionId) -> Option<PresenceTransition> {
        let mut guard = self.state.write().await;
        let record = guard.connections.remove(&connection_id)?;
        let user_id = record.user_id?;
        guard.detach(connection_id, &user_id)
    }

    pub async fn connections_for(&self, user_id: &UserId) -> HashSet<ConnectionId> {
        self.state
            .read()
            .await
            .presences
            .get(user_id)
            .map(|presence| presence.connections.clone())
            .unwrap_or_default()
    }

    /// Snapshot of every online user, oldest first.
    pub async fn all_presences(&self) -> Vec<UserPresence> {
        let guard = self.state.read().await;
        let mut presences = guard
            .presences
            .iter()
            .map(|(user_id, presence)| {
                let mut connection_ids = presence.connections.iter().copied().collect::<Vec<_>>();
                connection_ids.sort();
                UserPresence {
                    logical_user_id: user_id.clone(),
                    display_name: presence.display_name.clone(),
                    connection_ids,
                    first_joined_at: presence.first_joined_at,
                }
            })
            .collect::<Vec<_>>();
        presences.sort_by(|left, right| {
            left.first_joined_at
                .cmp(&right.first_joined_at)
                .then_with(|| left.logical_user_id.cmp(&right.logical_user_id))
        });
        presences
    }

    /// Distinct logical users with at least one open connection.
    pub async fn online_count(&self) -> usize {
        self.state.read().await.presences.len()
    }

    /// Open connections, joined or not.
    pub async fn connection_count(&self) -> usize {
        self.state.read().await.connections.len()
    }

    pub async fn identity_of(&self, connection_id: ConnectionId) -> Option<ConnectionIdentity> {
        let guard = self.state.read().await;
        let user_id = guard.connections.get(&connection_id)?.user_id.clone()?;
        let display_name = guard.presences.get(&user_id)?.display_name.clone();
        Some(ConnectionIdentity { user_id, display_name })
    }

    /// Connection, joined-connection and online-user counts from one snapshot.
    pub async fn counts(&self) -> RegistryCounts {
        let guard = self.state.read().await;
        RegistryCounts {
            connections: guard.connections.len(),
            joined: guard.presences.values().map(|presence| presence.connections.len()).sum(),
            online: guard.presences.len(),
        }
    }

    /// Resolves a delivery target to concrete recipients under one read lock.
    pub(crate) async fn resolve(&self, target: &DeliveryTarget) -> Vec<Recipient> {
        let guard = self.state.read().await;
        let recipient = |connection_id: &ConnectionId| {
            guard.connections.get(connection_id).map(|record| Recipient {
                connection_id: *connection_id,
                outbound: record.outbound.clone(),
            })
        };

        match target {
            DeliveryTarget::User(user_id) => guard
                .presences
                .get(user_id)
                .map(|presence| presence.connections.iter().filter_map(recipient).collect())
                .unwrap_or_default(),
            DeliveryTarget::Connection(connection_id) => {
                recipient(connection_id).into_iter().collect()
            }
            DeliveryTarget::All => guard.connections.keys().filter_map(recipient).collect(),
            DeliveryTarget::AllExcept(excluded) => guard
                .connections
                .keys()
                .filter(|connection_id| *connection_id != excluded)
                .filter_map(recipient)
                .collect(),
        }
    }

    /// Drops every connection and presence. Outbound queues close once their
    /// senders are gone, which ends each connection's write loop.
    pub async fn drain(&self) -> usize {
        let mut guard = self.state.write().await;
        let drained = guard.connections.len();
        guard.connections.clear();
        guard.presences.clear();
        drained
    }

    #[cfg(test)]
    pub(crate) async fn assert_consistent(&self) {
        let guard = self.state.read().await;
        for (user_id, presence) in &guard.presences {
            assert!(!presence.connections.is_empty(), "presence for {user_id} has no connections");
            for connection_id in &presence.connections {
                let owner = guard
                    .connections
                    .get(connection_id)
                    .and_then(|record| record.user_id.as_ref());
                assert_eq!(owner, Some(user_id), "connection {connection_id} owner mismatch");
            }
        }
        for (connection_id, record) in &guard.connections {
            if let Some(user_id) = &record.user_id {
                let presence = guard.presences.get(user_id);
                assert!(
                    presence.is_some_and(|presence| presence.connections.contains(connection_id)),
                    "connection {connection_id} references absent presence {user_id}"
                );
            }
        }
    }
}

impl RegistryState {
    /// Removes `connection_id` from `user_id`'s presence, dropping the
    /// presence (and reporting offline) when it was the last one.
    fn detach(&mut self, connection_id: ConnectionId, user_id: &UserId) -> Option<PresenceTransition> {
        let presence = self.presences.get_mut(user_id)?;
        presence.connections.remove(&connection_id);
        if !presence.connections.is_empty() {
            return None;
        }

        let presence = self.presences.remove(user_id)?;
        Some(presence::went_offline(user_id.clone(), presence.display_name, self.presences.len()))
    }
}
