// Dispatch of client frames to the realtime hub.

use serde_json::{json, Map, Value};
use tasklive_common::protocol::events;
use tasklive_common::protocol::ws::{ClientMessage, NotificationSend, TypingNotice};
use tasklive_common::types::ConnectionId;
use tracing::{debug, info, warn};

use super::protocol::InboundError;
use crate::hub::RealtimeHub;
use crate::metrics;
use crate::validation::check_ws_frame_size;

/// Handles one inbound text frame. Failures are answered with an `error`
/// frame on the same connection and never close it.
pub async fn handle_text_frame(hub: &RealtimeHub, connection_id: ConnectionId, raw: &str) {
    let result = match check_ws_frame_size(raw) {
        Ok(()) => match ClientMessage::decode(raw) {
            Ok(message) => {
                let event = message.event_name();
                let outcome = handle_client_message(hub, connection_id, message).await;
                metrics::record_ws_frame(event, outcome.is_err());
                outcome
            }
            Err(error) => {
                metrics::record_ws_frame(error.event().unwrap_or("unknown"), true);
                Err(InboundError::from(error))
            }
        },
        Err(message) => {
            metrics::record_ws_frame("unknown", true);
            Err(InboundError::new(super::protocol::FRAME_TOO_LARGE, message))
        }
    };

    if let Err(error) = result {
        reject(hub, connection_id, error).await;
    }
}

/// Answers a frame the relay could not act on.
pub async fn reject(hub: &RealtimeHub, connection_id: ConnectionId, error: InboundError) {
    warn!(%connection_id, code = error.code, message = %error.message, "rejected client frame");
    hub.router().to_connection(connection_id, events::ERROR, error.payload()).await;
}

pub async fn handle_client_message(
    hub: &RealtimeHub,
    connection_id: ConnectionId,
    message: ClientMessage,
) -> Result<(), InboundError> {
    match message {
        ClientMessage::Join(request) => {
            let (user_id, display_name) = request.validate()?;
            info!(%connection_id, logical_user_id = %user_id, %display_name, "connection joined");
            hub.join(connection_id, user_id, display_name).await;
            hub.refresh_gauges().await;
        }
        ClientMessage::Typing(notice) => {
            relay_typing(hub, connection_id, events::USER_TYPING, notice).await;
        }
        ClientMessage::StoppedTyping(notice) => {
            relay_typing(hub, connection_id, events::USER_STOPPED_TYPING, notice).await;
        }
        ClientMessage::Task { kind, payload } => {
            debug!(%connection_id, event = kind.event_name(), "relaying client task event");
            hub.router().to_others(connection_id, kind.event_name(), payload).await;
        }
        ClientMessage::SendNotification(send) => {
            relay_notification(hub, send).await;
        }
    }
    Ok(())
}

/// Typing indicators carry the joined identity when there is one, so a
/// client cannot type on behalf of another user.
async fn relay_typing(
    hub: &RealtimeHub,
    connection_id: ConnectionId,
    event: &str,
    notice: TypingNotice,
) {
    let payload = match hub.registry().identity_of(connection_id).await {
        Some(identity) => json!({
            "logicalUserId": identity.user_id,
            "displayName": identity.display_name,
        }),
        None => serde_json::to_value(&notice).unwrap_or_else(|_| Value::Object(Map::new())),
    };
    hub.router().to_others(connection_id, event, payload).await;
}

async fn relay_notification(hub: &RealtimeHub, send: NotificationSend) {
    let NotificationSend { user_id, mut fields } = send;
    match user_id {
        Some(user_id) => {
            fields.insert("userId".to_owned(), json!(user_id));
            hub.router()
                .to_user(&user_id, events::NOTIFICATION_RECEIVED, Value::Object(fields))
                .await;
        }
        None => {
            hub.router().to_all(events::NOTIFICATION_RECEIVED, Value::Object(fields)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tasklive_common::types::UserId;
    use tokio::sync::mpsc;

    use super::*;
    use crate::registry::OutboundFrame;
    use crate::ws::protocol::{FRAME_TOO_LARGE, INVALID_FRAME, JOIN_INVALID, UNSUPPORTED_EVENT};

    struct Client {
        id: ConnectionId,
        rx: mpsc::Receiver<OutboundFrame>,
    }

    impl Client {
        async fn connect(hub: &RealtimeHub) -> Self {
            let id = ConnectionId::new();
            let (tx, rx) = mpsc::channel(32);
            hub.registry().register(id, tx).await;
            Self { id, rx }
        }

        async fn send(&self, hub: &RealtimeHub, frame: Value) {
            handle_text_frame(hub, self.id, &frame.to_string()).await;
        }

        fn frames(&mut self) -> Vec<Value> {
            let mut frames = Vec::new();
            while let Ok(frame) = self.rx.try_recv() {
                frames.push(serde_json::from_str(&frame).expect("frame should be json"));
            }
            frames
        }

        fn events(&mut self) -> Vec<String> {
            self.frames()
                .into_iter()
                .filter_map(|frame| frame["event"].as_str().map(ToOwned::to_owned))
                .collect()
        }
    }

    fn join(user_id: &str, name: &str) -> Value {
        json!({ "event": "user:join", "data": { "logicalUserId": user_id, "displayName": name } })
    }

    #[tokio::test]
    async fn join_then_typing_is_relayed_with_joined_identity() {
        let hub = RealtimeHub::default();
        let mut ada = Client::connect(&hub).await;
        let mut bob = Client::connect(&hub).await;

        ada.send(&hub, join("a", "Ada")).await;
        assert_eq!(ada.events(), vec!["users:online"]);
        assert_eq!(bob.events(), vec!["user:online"]);

        ada.send(&hub, json!({ "event": "user:typing", "data": { "logicalUserId": "mallory" } }))
            .await;
        let frames = bob.frames();
        assert_eq!(frames[0]["event"], "user:typing");
        assert_eq!(frames[0]["data"]["logicalUserId"], "a");
        assert_eq!(frames[0]["data"]["displayName"], "Ada");
        assert!(ada.frames().is_empty());
    }

    #[tokio::test]
    async fn invalid_join_leaves_connection_anonymous() {
        let hub = RealtimeHub::default();
        let mut client = Client::connect(&hub).await;
        let mut observer = Client::connect(&hub).await;

        client.send(&hub, json!({ "event": "user:join", "data": { "logicalUserId": "a" } })).await;

        let frames = client.frames();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0]["event"], "error");
        assert_eq!(frames[0]["data"]["code"], JOIN_INVALID);
        assert!(observer.frames().is_empty());
        assert_eq!(hub.online_count().await, 0);
        assert_eq!(hub.registry().identity_of(client.id).await, None);
    }

    #[tokio::test]
    async fn malformed_and_unknown_frames_get_error_replies() {
        let hub = RealtimeHub::default();
        let mut client = Client::connect(&hub).await;

        handle_text_frame(&hub, client.id, "{{nope").await;
        client.send(&hub, json!({ "event": "doc:open", "data": {} })).await;
        handle_text_frame(&hub, client.id, &"x".repeat(crate::validation::MAX_WS_FRAME_BYTES + 1))
            .await;

        let codes: Vec<Value> =
            client.frames().into_iter().map(|frame| frame["data"]["code"].clone()).collect();
        assert_eq!(codes, vec![json!(INVALID_FRAME), json!(UNSUPPORTED_EVENT), json!(FRAME_TOO_LARGE)]);
    }

    #[tokio::test]
    async fn client_task_echo_skips_the_sender() {
        let hub = RealtimeHub::default();
        let mut sender = Client::connect(&hub).await;
        let mut other = Client::connect(&hub).await;

        sender.send(&hub, json!({ "event": "task:toggled", "data": { "taskId": 3 } })).await;

        assert!(sender.frames().is_empty());
        let frames = other.frames();
        assert_eq!(frames[0]["event"], "task:toggled");
        assert_eq!(frames[0]["data"]["taskId"], 3);
    }

    #[tokio::test]
    async fn targeted_notification_reaches_only_that_user() {
        let hub = RealtimeHub::default();
        let mut ada = Client::connect(&hub).await;
        let mut bob = Client::connect(&hub).await;
        ada.send(&hub, join("a", "Ada")).await;
        bob.send(&hub, join("b", "Bob")).await;
        ada.frames();
        bob.frames();

        ada.send(
            &hub,
            json!({ "event": "notification:send", "data": { "userId": "b", "title": "Hi" } }),
        )
        .await;

        assert!(ada.frames().is_empty());
        let frames = bob.frames();
        assert_eq!(frames[0]["event"], "notification:received");
        assert_eq!(frames[0]["data"]["title"], "Hi");
        assert_eq!(frames[0]["data"]["userId"], "b");
    }

    #[tokio::test]
    async fn untargeted_notification_reaches_everyone() {
        let hub = RealtimeHub::default();
        let mut ada = Client::connect(&hub).await;
        let mut anon = Client::connect(&hub).await;

        ada.send(&hub, json!({ "event": "notification:send", "data": { "title": "All hands" } }))
            .await;

        assert_eq!(ada.events(), vec!["notification:received"]);
        assert_eq!(anon.events(), vec!["notification:received"]);
    }

    #[tokio::test]
    async fn rejoin_as_other_user_announces_offline_for_previous() {
        let hub = RealtimeHub::default();
        let mut switcher = Client::connect(&hub).await;
        let mut observer = Client::connect(&hub).await;
        switcher.send(&hub, join("a", "Ada")).await;
        switcher.frames();
        observer.frames();

        switcher.send(&hub, join("b", "Bob")).await;

        let frames = observer.frames();
        assert_eq!(frames[0]["event"], "user:offline");
        assert_eq!(frames[0]["data"]["logicalUserId"], "a");
        assert_eq!(frames[1]["event"], "user:online");
        assert_eq!(frames[1]["data"]["logicalUserId"], "b");
        assert_eq!(
            hub.registry().identity_of(switcher.id).await.map(|identity| identity.user_id),
            Some(UserId::new("b").expect("valid user id"))
        );
    }
}
