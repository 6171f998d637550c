#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
//! Wire-format tests against frames as the room service emits them.

use room_chat_client::protocol::{
    events, ChatMessage, ClientEvent, Envelope, JoinRoomPayload, MessageKind, SendMessagePayload,
    ServerEvent, TypingPayload,
};
use serde_json::{json, Value};

fn decode(frame: &str) -> Option<ServerEvent> {
    let envelope: Envelope = serde_json::from_str(frame).unwrap();
    ServerEvent::from_parts(&envelope.event, envelope.data).unwrap()
}

// ── Inbound ─────────────────────────────────────────────────────────

#[test]
fn room_joined_frame() {
    let frame = r#"{
        "event": "room_joined",
        "data": {
            "room": "general",
            "username": "alice",
            "messages": [
                {
                    "id": "7f1c6a2e-9f47-4f7e-a3e5-0c1d2b3a4f5e",
                    "username": "bob",
                    "message": "anyone here?",
                    "timestamp": "2025-03-14T09:26:53.589793",
                    "room": "general"
                }
            ]
        }
    }"#;
    let Some(ServerEvent::RoomJoined(payload)) = decode(frame) else {
        panic!("expected room_joined");
    };
    assert_eq!(payload.room, "general");
    assert_eq!(payload.username.as_deref(), Some("alice"));
    let m = &payload.messages[0];
    assert_eq!(m.author, "bob");
    assert_eq!(m.body, "anyone here?");
    assert_eq!(m.sent_at, "2025-03-14T09:26:53.589793");
    assert_eq!(m.kind, MessageKind::Chat);
}

#[test]
fn new_message_frame() {
    let frame = r#"{"event":"new_message","data":{"id":"m1","username":"bob","message":"hi","timestamp":"2025-03-14T09:27:00","room":"general"}}"#;
    assert_eq!(
        decode(frame),
        Some(ServerEvent::NewMessage(ChatMessage {
            room: Some("general".into()),
            ..ChatMessage::new("m1", "bob", "hi", "2025-03-14T09:27:00")
        }))
    );
}

#[test]
fn presence_frames_carry_optional_text() {
    let joined = r#"{"event":"user_joined","data":{"username":"carol","message":"carol joined"}}"#;
    let left = r#"{"event":"user_left","data":{"username":"carol"}}"#;
    let Some(ServerEvent::UserJoined(p)) = decode(joined) else {
        panic!("expected user_joined");
    };
    assert_eq!(p.username, "carol");
    assert_eq!(p.message.as_deref(), Some("carol joined"));
    let Some(ServerEvent::UserLeft(p)) = decode(left) else {
        panic!("expected user_left");
    };
    assert!(p.message.is_none());
}

#[test]
fn error_and_connected_frames() {
    let error = r#"{"event":"error","data":{"message":"You must join a room first"}}"#;
    assert!(matches!(decode(error), Some(ServerEvent::Error(p)) if p.message == "You must join a room first"));

    assert_eq!(
        decode(r#"{"event":"connected","data":{"message":"Connected"}}"#),
        Some(ServerEvent::Connected)
    );
    assert_eq!(decode(r#"{"event":"connected"}"#), Some(ServerEvent::Connected));
}

#[test]
fn unknown_event_decodes_to_none() {
    assert_eq!(decode(r#"{"event":"room_renamed","data":{"to":"x"}}"#), None);
}

#[test]
fn extra_fields_are_tolerated() {
    let frame = r#"{"event":"new_message","data":{"id":"m1","username":"bob","message":"hi","timestamp":"t","edited":false}}"#;
    assert!(matches!(decode(frame), Some(ServerEvent::NewMessage(_))));
}

#[test]
fn every_server_event_name_is_decodable() {
    for name in events::SERVER_EVENTS {
        let sample = match *name {
            events::CONNECTED => Value::Null,
            events::ROOM_JOINED => json!({"room": "r"}),
            events::NEW_MESSAGE => {
                json!({"id": "1", "username": "u", "message": "m", "timestamp": "t"})
            }
            events::USER_JOINED | events::USER_LEFT => json!({"username": "u"}),
            events::ERROR => json!({"message": "e"}),
            other => panic!("no sample for {other}"),
        };
        let event = ServerEvent::from_parts(name, sample).unwrap().unwrap();
        assert_eq!(event.name(), *name);
    }
}

// ── Outbound ────────────────────────────────────────────────────────

#[test]
fn client_events_match_server_expectations() {
    let cases = [
        (
            ClientEvent::JoinRoom(JoinRoomPayload {
                username: "alice".into(),
                room: "general".into(),
            }),
            json!({"event": "join_room", "data": {"username": "alice", "room": "general"}}),
        ),
        (
            ClientEvent::SendMessage(SendMessagePayload {
                message: "hello".into(),
            }),
            json!({"event": "send_message", "data": {"message": "hello"}}),
        ),
        (
            ClientEvent::Typing(TypingPayload { typing: true }),
            json!({"event": "typing", "data": {"typing": true}}),
        ),
    ];
    for (event, expected) in cases {
        assert_eq!(serde_json::to_value(&event).unwrap(), expected);
        assert_eq!(event.name(), expected["event"]);
    }
}

#[test]
fn user_message_omits_kind_on_the_wire() {
    let value = serde_json::to_value(ChatMessage::new("m1", "bob", "hi", "t")).unwrap();
    assert_eq!(
        value,
        json!({"id": "m1", "username": "bob", "message": "hi", "timestamp": "t"})
    );

    let notice = ChatMessage {
        kind: MessageKind::SystemNotice,
        ..ChatMessage::new("welcome-0", "System", "Welcome to general", "t")
    };
    assert_eq!(serde_json::to_value(&notice).unwrap()["kind"], "system-notice");
}
