// One live WebSocket connection: registration, the read/write/heartbeat
// loop, and cleanup on close.

use axum::extract::ws::{Message, WebSocket};
use tasklive_common::types::ConnectionId;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{info, warn};

use super::handler::{handle_text_frame, reject};
use super::protocol::{send_ws_frame, InboundError, INVALID_FRAME};
use crate::error::current_request_id;
use crate::hub::RealtimeHub;
use crate::metrics;
use crate::registry::OutboundFrame;

pub(super) async fn run_session(hub: RealtimeHub, mut socket: WebSocket) {
    let connection_id = ConnectionId::new();
    let request_id = current_request_id().unwrap_or_else(|| "unknown".to_string());
    let limits = hub.limits();

    let (outbound_sender, mut outbound_receiver) =
        mpsc::channel::<OutboundFrame>(limits.outbound_queue_capacity);
    hub.registry().register(connection_id, outbound_sender).await;
    metrics::record_connection_opened();
    hub.refresh_gauges().await;
    info!(%connection_id, request_id = %request_id, "connection opened");

    // Server pings every interval; a peer silent for longer than
    // interval + timeout is dropped. Any inbound frame counts as liveness.
    let mut heartbeat_interval = tokio::time::interval(limits.heartbeat_interval);
    heartbeat_interval.reset();
    let liveness_deadline = limits.heartbeat_interval + limits.heartbeat_timeout;
    let mut last_seen = Instant::now();

    loop {
        tokio::select! {
            _ = heartbeat_interval.tick() => {
                if last_seen.elapsed() > liveness_deadline {
                    warn!(%connection_id, request_id = %request_id, "heartbeat timeout, disconnecting");
                    break;
                }
                if socket.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
            }
            maybe_outbound = outbound_receiver.recv() => {
                match maybe_outbound {
                    Some(frame) => {
                        if send_ws_frame(&mut socket, &frame).await.is_err() {
                            break;
                        }
                    }
                    // Registry dropped the sender: shutdown drain.
                    None => break,
                }
            }
            maybe_message = socket.recv() => {
                let Some(message) = maybe_message else {
                    break;
                };
                last_seen = Instant::now();

                match message {
                    Ok(Message::Text(raw)) => {
                        handle_text_frame(&hub, connection_id, raw.as_str()).await;
                    }
                    Ok(Message::Binary(_)) => {
                        reject(
                            &hub,
                            connection_id,
                            InboundError::new(INVALID_FRAME, "binary frames are not supported"),
                        )
                        .await;
                    }
                    Ok(Message::Ping(payload)) => {
                        if socket.send(Message::Pong(payload)).await.is_err() {
                            break;
                        }
                    }
                    Ok(Message::Pong(_)) => {}
                    Ok(Message::Close(_)) => break,
                    Err(_) => break,
                }
            }
        }
    }

    close_session(&hub, connection_id).await;
    info!(%connection_id, request_id = %request_id, "connection closed");
}

/// Removes the connection and, when it was the user's last, tells everyone
/// else the user went offline.
async fn close_session(hub: &RealtimeHub, connection_id: ConnectionId) {
    hub.leave(connection_id).await;
    metrics::record_connection_closed();
    hub.refresh_gauges().await;
}
