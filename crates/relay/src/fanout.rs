// Addressed delivery of server events to live connections.
//
// Every helper funnels into `deliver`: the frame is stamped and encoded once,
// recipients are resolved under a single registry read, and each recipient's
// bounded queue is offered the frame with `try_send`. A slow or dead
// connection never blocks the caller or other recipients.

use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};
use tasklive_common::protocol::ws::Frame;
use tasklive_common::types::{ConnectionId, UserId};
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, error, warn};

use crate::metrics;
use crate::registry::{ConnectionRegistry, OutboundFrame};

/// Who a frame is addressed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryTarget {
    /// Every connection of one logical user.
    User(UserId),
    /// Every registered connection, joined or anonymous.
    All,
    /// Every registered connection except the given one.
    AllExcept(ConnectionId),
    /// Exactly one connection.
    Connection(ConnectionId),
}

/// Outcome of one fan-out call. Failed sends are absorbed, never returned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Connections the target resolved to.
    pub recipients: usize,
    /// Connections whose queue accepted the frame.
    pub delivered: usize,
}

#[derive(Debug, Clone)]
pub struct FanoutRouter {
    registry: Arc<ConnectionRegistry>,
}

impl FanoutRouter {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Delivers to every connection of `user_id`. An offline user is a no-op.
    pub async fn to_user(&self, user_id: &UserId, event: &str, payload: Value) -> DeliveryReport {
        self.deliver(DeliveryTarget::User(user_id.clone()), event, payload).await
    }

    pub async fn to_all(&self, event: &str, payload: Value) -> DeliveryReport {
        self.deliver(DeliveryTarget::All, event, payload).await
    }

    /// Delivers to everyone but `excluded`. Other connections of the same
    /// user still receive it.
    pub async fn to_others(
        &self,
        excluded: ConnectionId,
        event: &str,
        payload: Value,
    ) -> DeliveryReport {
        self.deliver(DeliveryTarget::AllExcept(excluded), event, payload).await
    }

    pub async fn to_connection(
        &self,
        connection_id: ConnectionId,
        event: &str,
        payload: Value,
    ) -> DeliveryReport {
        self.deliver(DeliveryTarget::Connection(connection_id), event, payload).await
    }

    async fn deliver(&self, target: DeliveryTarget, event: &str, payload: Value) -> DeliveryReport {
        let frame = Frame::new(event, stamp(payload));
        let encoded: OutboundFrame = match frame.encode() {
            Ok(encoded) => Arc::from(encoded),
            Err(err) => {
                error!(event, error = %err, "failed to encode outbound frame");
                return DeliveryReport::default();
            }
        };

        let recipients = self.registry.resolve(&target).await;
        let mut report = DeliveryReport { recipients: recipients.len(), delivered: 0 };

        for recipient in recipients {
            let Some(outbound) = recipient.outbound else {
                metrics::record_delivery_drop("no_transport");
                continue;
            };
            match outbound.try_send(Arc::clone(&encoded)) {
                Ok(()) => report.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!(
                        connection_id = %recipient.connection_id,
                        event,
                        "outbound queue full, dropping frame"
                    );
                    metrics::record_delivery_drop("queue_full");
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(
                        connection_id = %recipient.connection_id,
                        event,
                        "connection closed before delivery"
                    );
                    metrics::record_delivery_drop("closed");
                }
            }
        }

        metrics::record_delivery(event, report.delivered as u64);
        debug!(
            ?target,
            event,
            recipients = report.recipients,
            delivered = report.delivered,
            "fan-out complete"
        );
        report
    }
}

/// Adds a server-side `timestamp` to the payload. Non-object payloads are
/// wrapped as `{"data": ..., "timestamp": ...}`.
fn stamp(payload: Value) -> Value {
    let timestamp = Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true));
    let mut object = match payload {
        Value::Object(object) => object,
        Value::Null => Map::new(),
        other => {
            let mut wrapper = Map::new();
            wrapper.insert("data".to_owned(), other);
            wrapper
        }
    };
    object.insert("timestamp".to_owned(), timestamp);
    Value::Object(object)
}
