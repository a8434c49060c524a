use chrono::Utc;
use serde_json::{json, Value};
use tasklive_common::protocol::events::{self, TaskEventKind};
use tasklive_common::protocol::ws::{ClientMessage, ErrorFrame, Frame, JoinRequest};
use tasklive_common::types::{
    ConnectionId, Notification, NotificationCategory, OnlineRoster, PresenceChange,
    PresenceSnapshot, UserId, UserPresence,
};

fn user(id: &str) -> UserId {
    UserId::new(id).expect("test user id should be valid")
}

#[test]
fn event_vocabulary_matches_published_names() {
    let expected = [
        (events::USER_JOIN, "user:join"),
        (events::USERS_ONLINE, "users:online"),
        (events::USER_ONLINE, "user:online"),
        (events::USER_OFFLINE, "user:offline"),
        (events::USER_TYPING, "user:typing"),
        (events::USER_STOPPED_TYPING, "user:stopped-typing"),
        (events::TASK_CREATED, "task:created"),
        (events::TASK_UPDATED, "task:updated"),
        (events::TASK_DELETED, "task:deleted"),
        (events::TASK_TOGGLED, "task:toggled"),
        (events::NOTIFICATION_CREATED, "notification:created"),
        (events::NOTIFICATION_RECEIVED, "notification:received"),
        (events::NOTIFICATION_SEND, "notification:send"),
        (events::ERROR, "error"),
    ];

    for (constant, published) in expected {
        assert_eq!(constant, published);
    }
}

#[test]
fn payload_shapes_match_wire_contract() {
    let presence = UserPresence {
        logical_user_id: user("u1"),
        display_name: "Ada".to_string(),
        connection_ids: vec![ConnectionId::new()],
        first_joined_at: Utc::now(),
    };

    let samples: [(Value, &[&str]); 5] = [
        (
            serde_json::to_value(PresenceChange {
                logical_user_id: user("u1"),
                display_name: "Ada".to_string(),
                online_count: 1,
            })
            .expect("presence change should serialize"),
            &["logicalUserId", "displayName", "onlineCount"][..],
        ),
        (
            serde_json::to_value(OnlineRoster { users: vec![presence.clone()], count: 1 })
                .expect("roster should serialize"),
            &["users", "count"][..],
        ),
        (
            serde_json::to_value(PresenceSnapshot { online_count: 1, users: vec![presence] })
                .expect("snapshot should serialize"),
            &["onlineCount", "users"][..],
        ),
        (
            serde_json::to_value(Notification {
                id: "notif_1".to_string(),
                user_id: user("u1"),
                category: NotificationCategory::System,
                title: "Welcome".to_string(),
                message: "hello".to_string(),
                read: false,
                created_at: Utc::now(),
                data: Some(json!({ "taskId": 1 })),
            })
            .expect("notification should serialize"),
            &["id", "userId", "type", "title", "message", "read", "createdAt", "data"][..],
        ),
        (
            serde_json::to_value(ErrorFrame {
                code: "JOIN_INVALID".to_string(),
                message: "join requires a display name".to_string(),
                retryable: false,
            })
            .expect("error frame should serialize"),
            &["code", "message", "retryable"][..],
        ),
    ];

    for (value, keys) in samples {
        for key in keys {
            assert!(value.get(key).is_some(), "payload {value} must include `{key}`");
        }
    }
}

#[test]
fn frames_round_trip_through_the_envelope() {
    let join = JoinRequest::new(user("42"), "Grace");
    let frame = Frame::new(events::USER_JOIN, serde_json::to_value(&join).expect("join serializes"));
    let encoded = frame.encode().expect("frame should encode");

    let decoded = ClientMessage::decode(&encoded).expect("frame should decode");
    assert_eq!(decoded, ClientMessage::Join(join));
    assert_eq!(decoded.event_name(), "user:join");
}

#[test]
fn every_task_event_is_accepted_from_clients() {
    for kind in TaskEventKind::ALL {
        let raw = json!({ "event": kind.event_name(), "data": { "taskId": 1 } }).to_string();
        let decoded = ClientMessage::decode(&raw).expect("task event should decode");
        assert_eq!(decoded.event_name(), kind.event_name());
    }
}
