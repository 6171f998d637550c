#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
//! Session state machine: transitions, gating, typing and reconnection.
//! The session is driven by hand here; no runtime or transport involved.

mod common;

use std::time::Duration;

use common::{message, room_joined, server_error, user_joined};
use room_chat_client::protocol::{ClientEvent, ServerEvent};
use room_chat_client::session::{Output, ViolationReason, MAX_MESSAGE_CHARS};
use room_chat_client::{
    ChatError, ChatEvent, ConnectionState, Identity, Session, SessionConfig, SessionFault,
};
use serde_json::json;
use tokio::time::Instant;
use tokio_test::{assert_err, assert_ok};

fn alice() -> Identity {
    Identity::new("alice", "general").unwrap()
}

fn drain(session: &mut Session) -> (Vec<ClientEvent>, Vec<ChatEvent>) {
    let mut sent = Vec::new();
    let mut emitted = Vec::new();
    for output in session.drain_outputs() {
        match output {
            Output::Send(frame) => sent.push(frame),
            Output::Emit(event) => emitted.push(event),
        }
    }
    (sent, emitted)
}

fn connecting(config: SessionConfig) -> Session {
    let mut session = Session::new(config);
    assert_ok!(session.join_room(alice()));
    session
}

fn joined(config: SessionConfig) -> Session {
    let mut session = connecting(config);
    session.on_connected();
    session.handle_event(room_joined("general", vec![message("m1", "bob", "hi")]));
    drain(&mut session);
    session
}

// ── Lifecycle ───────────────────────────────────────────────────────

#[test]
fn join_flow_reaches_joined() {
    let mut session = Session::new(SessionConfig::default());
    assert_eq!(session.state(), ConnectionState::Idle);

    assert_ok!(session.join_room(alice()));
    assert_eq!(session.state(), ConnectionState::Connecting);
    assert!(session.room().unwrap().is_empty());

    session.on_connected();
    assert_eq!(session.state(), ConnectionState::Connected);
    let (sent, emitted) = drain(&mut session);
    assert_eq!(emitted, vec![ChatEvent::Connected]);
    assert_eq!(sent.len(), 1);
    assert_eq!(
        serde_json::to_value(&sent[0]).unwrap(),
        json!({"event": "join_room", "data": {"username": "alice", "room": "general"}})
    );

    session.handle_event(room_joined("general", vec![message("m1", "bob", "hi")]));
    assert_eq!(session.state(), ConnectionState::Joined);
    let (sent, emitted) = drain(&mut session);
    assert!(sent.is_empty());
    match &emitted[..] {
        [ChatEvent::RoomJoined {
            room,
            entries,
            presence,
        }] => {
            assert_eq!(room, "general");
            assert_eq!(entries.len(), 2);
            assert_eq!(*presence, 1);
        }
        other => panic!("unexpected events: {other:?}"),
    }
}

#[test]
fn join_room_is_single_use() {
    let mut session = connecting(SessionConfig::default());
    assert!(matches!(
        session.join_room(alice()),
        Err(ChatError::AlreadyJoined)
    ));

    session.leave();
    assert!(matches!(
        session.join_room(alice()),
        Err(ChatError::SessionClosed)
    ));
}

#[test]
fn connect_failure_closes_with_fault() {
    let mut session = connecting(SessionConfig::default());
    session.on_connect_failed("timed out after 5s");
    assert!(session.is_closed());
    assert_eq!(
        session.fault(),
        Some(&SessionFault::Connection("timed out after 5s".into()))
    );
}

#[test]
fn server_error_closes_joined_session() {
    let mut session = joined(SessionConfig::default());
    let before = session.room().cloned();

    session.handle_event(server_error("Room is full"));
    assert!(session.is_closed());
    assert_eq!(
        session.fault(),
        Some(&SessionFault::Server("Room is full".into()))
    );
    assert_eq!(session.room().cloned(), before);
    let (_, emitted) = drain(&mut session);
    assert_eq!(
        emitted,
        vec![ChatEvent::ServerError {
            message: "Room is full".into()
        }]
    );
    assert!(matches!(
        session.send_message("still here?"),
        Err(ChatError::Server { message }) if message == "Room is full"
    ));
    assert!(matches!(
        session.join_room(alice()),
        Err(ChatError::Server { .. })
    ));
}

#[test]
fn server_error_before_room_joined_closes() {
    let mut session = connecting(SessionConfig::default());
    session.on_connected();
    session.handle_event(server_error("Username and room are required"));
    assert!(session.is_closed());
    assert!(matches!(session.fault(), Some(SessionFault::Server(_))));
}

#[test]
fn leave_is_idempotent() {
    let mut session = joined(SessionConfig::default());
    session.leave();
    session.leave();
    assert!(session.is_closed());
    assert!(session.fault().is_none());
    let (sent, _) = drain(&mut session);
    assert!(sent.is_empty());
}

// ── Gating ──────────────────────────────────────────────────────────

#[test]
fn stray_message_while_connecting_is_recorded() {
    let mut session = connecting(SessionConfig::default());
    let before = session.room().cloned();

    session.handle_event(ServerEvent::NewMessage(message("m1", "bob", "early")));

    assert_eq!(session.room().cloned(), before);
    assert_eq!(session.diagnostics().len(), 1);
    let violation = &session.diagnostics()[0];
    assert_eq!(violation.state, ConnectionState::Connecting);
    assert_eq!(violation.event, "new_message");
    assert_eq!(violation.reason, ViolationReason::UnexpectedInState);
    let (_, emitted) = drain(&mut session);
    assert!(matches!(
        emitted.as_slice(),
        [ChatEvent::ProtocolViolation(_)]
    ));
}

#[test]
fn presence_before_room_joined_is_a_violation() {
    let mut session = connecting(SessionConfig::default());
    session.on_connected();
    session.handle_event(user_joined("bob"));
    assert_eq!(session.room().unwrap().presence_count(), 1);
    assert_eq!(session.diagnostics()[0].state, ConnectionState::Connected);
}

#[test]
fn connected_ack_is_accepted_anywhere() {
    let mut session = connecting(SessionConfig::default());
    session.handle_frame("connected", json!({"message": "Connected to chat server"}));
    assert!(session.diagnostics().is_empty());
    assert_eq!(session.state(), ConnectionState::Connecting);
}

#[test]
fn blank_messages_fail_locally() {
    let mut session = joined(SessionConfig::default());
    assert!(matches!(
        session.send_message(""),
        Err(ChatError::EmptyMessage)
    ));
    assert!(matches!(
        session.send_message("   "),
        Err(ChatError::EmptyMessage)
    ));
    let (sent, emitted) = drain(&mut session);
    assert!(sent.is_empty());
    assert!(emitted.is_empty());
}

#[test]
fn send_is_trimmed_and_gated() {
    let mut session = connecting(SessionConfig::default());
    assert!(matches!(
        session.send_message("early"),
        Err(ChatError::NotJoined)
    ));

    let mut session = joined(SessionConfig::default());
    assert_ok!(session.send_message("  hello  "));
    let (sent, _) = drain(&mut session);
    assert_eq!(
        serde_json::to_value(&sent[0]).unwrap(),
        json!({"event": "send_message", "data": {"message": "hello"}})
    );

    let too_long = "x".repeat(MAX_MESSAGE_CHARS + 1);
    let err = assert_err!(session.send_message(&too_long));
    assert!(err.is_recoverable());
}

// ── Typing ──────────────────────────────────────────────────────────

#[test]
fn typing_expires_after_idle() {
    let mut session = joined(SessionConfig::default());
    let t0 = Instant::now();

    session.on_input("h", t0);
    session.on_input("he", t0 + Duration::from_millis(500));
    assert!(session.room().unwrap().self_typing());
    let (sent, emitted) = drain(&mut session);
    assert!(sent.is_empty(), "typing is local-only by default");
    assert_eq!(emitted, vec![ChatEvent::TypingChanged(true)]);

    session.poll_timers(t0 + Duration::from_millis(1200));
    assert!(session.room().unwrap().self_typing());

    session.poll_timers(t0 + Duration::from_millis(1500));
    assert!(!session.room().unwrap().self_typing());
    assert!(session.typing_deadline().is_none());
    let (_, emitted) = drain(&mut session);
    assert_eq!(emitted, vec![ChatEvent::TypingChanged(false)]);
}

#[test]
fn sending_stops_typing() {
    let mut session = joined(SessionConfig::default());
    session.on_input("hello", Instant::now());
    assert_ok!(session.send_message("hello"));
    assert!(!session.room().unwrap().self_typing());
    assert!(session.typing_deadline().is_none());
}

#[test]
fn broadcast_typing_sends_frames() {
    let config = SessionConfig {
        broadcast_typing: true,
        ..SessionConfig::default()
    };
    let mut session = joined(config);
    let t0 = Instant::now();
    session.on_input("h", t0);
    session.poll_timers(t0 + Duration::from_secs(2));

    let (sent, _) = drain(&mut session);
    let frames: Vec<_> = sent
        .iter()
        .map(|f| serde_json::to_value(f).unwrap())
        .collect();
    assert_eq!(
        frames,
        vec![
            json!({"event": "typing", "data": {"typing": true}}),
            json!({"event": "typing", "data": {"typing": false}}),
        ]
    );
}

#[test]
fn input_before_join_is_ignored() {
    let mut session = connecting(SessionConfig::default());
    session.on_input("hello", Instant::now());
    assert!(session.typing_deadline().is_none());
    assert_eq!(drain(&mut session).1.len(), 0);
}

// ── Reconnection ────────────────────────────────────────────────────

#[test]
fn reconnect_rejoins_and_replaces_log() {
    let mut session = joined(SessionConfig::default());
    session.handle_event(user_joined("bob"));
    session.on_input("typing", Instant::now());
    drain(&mut session);

    session.on_transport_lost("connection reset", true);
    assert_eq!(session.state(), ConnectionState::Connecting);
    assert!(!session.room().unwrap().self_typing());
    let (_, emitted) = drain(&mut session);
    assert!(emitted.contains(&ChatEvent::Reconnecting {
        reason: "connection reset".into()
    }));
    assert!(matches!(
        session.send_message("while down"),
        Err(ChatError::NotJoined)
    ));

    session.on_connected();
    let (sent, _) = drain(&mut session);
    assert!(matches!(sent.as_slice(), [ClientEvent::JoinRoom(_)]));

    session.handle_event(room_joined("general", vec![]));
    let room = session.room().unwrap();
    assert_eq!(room.len(), 1);
    assert_eq!(room.presence_count(), 1);
}

#[test]
fn loss_without_reconnect_closes() {
    let mut session = joined(SessionConfig::default());
    session.on_transport_lost("connection closed by server", false);
    assert!(session.is_closed());
    assert_eq!(
        session.fault(),
        Some(&SessionFault::Connection(
            "connection closed by server".into()
        ))
    );
}
