#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
//! Reducer behavior: snapshot replacement, presence arithmetic, display keys.

mod common;

use std::collections::HashSet;

use common::{message, T0};
use room_chat_client::protocol::MessageKind;
use room_chat_client::room::{reduce, RoomEvent, RoomOptions, RoomState, NOTICE_AUTHOR};

fn fresh() -> RoomState {
    RoomState::new("general", RoomOptions::default())
}

fn joined(messages: Vec<room_chat_client::ChatMessage>) -> RoomEvent {
    RoomEvent::Joined {
        room: "general".into(),
        messages,
    }
}

fn bob_joined() -> RoomEvent {
    RoomEvent::UserJoined {
        username: "bob".into(),
    }
}

fn bob_left() -> RoomEvent {
    RoomEvent::UserLeft {
        username: "bob".into(),
    }
}

fn fold(state: RoomState, events: &[RoomEvent]) -> RoomState {
    events.iter().fold(state, |s, e| reduce(s, e, T0))
}

// ── Scenarios ───────────────────────────────────────────────────────

#[test]
fn empty_snapshot_yields_only_welcome() {
    let state = reduce(fresh(), &joined(vec![]), T0);
    assert_eq!(state.len(), 1);
    assert_eq!(state.presence_count(), 1);

    let welcome = &state.entries()[0].message;
    assert_eq!(welcome.kind, MessageKind::SystemNotice);
    assert_eq!(welcome.author, NOTICE_AUTHOR);
    assert_eq!(welcome.body, "Welcome to general");
    assert_eq!(welcome.sent_at, T0);
}

#[test]
fn user_joined_appends_notice_and_counts() {
    let state = fold(fresh(), &[joined(vec![]), bob_joined()]);
    assert_eq!(state.len(), 2);
    assert_eq!(state.presence_count(), 2);
    let notice = &state.last().unwrap().message;
    assert_eq!(notice.body, "bob joined the conversation");
    assert!(notice.is_notice());
}

#[test]
fn presence_floors_at_one() {
    let state = fold(fresh(), &[joined(vec![]), bob_joined(), bob_left(), bob_left()]);
    assert_eq!(state.presence_count(), 1);
    // Both leaves still produce a notice.
    assert_eq!(state.len(), 4);
    assert_eq!(
        state.last().unwrap().message.body,
        "bob left the conversation"
    );
}

// ── Properties ──────────────────────────────────────────────────────

#[test]
fn replay_is_deterministic() {
    let events = vec![
        joined(vec![message("m1", "alice", "hi")]),
        bob_joined(),
        RoomEvent::Message(message("m2", "bob", "hey")),
        RoomEvent::SelfTyping(true),
        bob_left(),
        RoomEvent::Other,
    ];
    assert_eq!(fold(fresh(), &events), fold(fresh(), &events));
}

#[test]
fn display_keys_are_unique_across_history() {
    let mut state = fresh();
    let mut seen = HashSet::new();
    for round in 0..3 {
        state = fold(
            state,
            &[
                joined(vec![message("m1", "alice", "hi"), message("m2", "bob", "yo")]),
                bob_joined(),
                RoomEvent::Message(message("m1", "alice", "hi")),
                bob_left(),
            ],
        );
        for entry in state.entries() {
            assert!(
                seen.insert(entry.key),
                "key {} reused in round {round}",
                entry.key
            );
        }
    }
}

#[test]
fn second_snapshot_replaces_everything() {
    let state = fold(
        fresh(),
        &[
            joined(vec![message("m1", "alice", "old")]),
            bob_joined(),
            RoomEvent::Message(message("m2", "bob", "older")),
        ],
    );
    assert_eq!(state.presence_count(), 2);

    let state = reduce(state, &joined(vec![message("m9", "carol", "new")]), T0);
    let ids: Vec<_> = state.messages().map(|m| m.id.clone()).collect();
    assert_eq!(ids.len(), 2);
    assert!(ids[0].starts_with("welcome-"));
    assert_eq!(ids[1], "m9");
    assert_eq!(state.presence_count(), 1);
}

#[test]
fn snapshot_order_is_preserved() {
    let snapshot = vec![
        message("c", "x", "3"),
        message("a", "x", "1"),
        message("b", "x", "2"),
    ];
    let state = reduce(fresh(), &joined(snapshot), T0);
    let ids: Vec<_> = state.messages().skip(1).map(|m| m.id.as_str()).collect();
    assert_eq!(ids, vec!["c", "a", "b"]);
}

#[test]
fn duplicate_message_is_appended_twice_by_default() {
    let m = message("m1", "alice", "hi");
    let state = fold(
        fresh(),
        &[
            joined(vec![]),
            RoomEvent::Message(m.clone()),
            RoomEvent::Message(m),
        ],
    );
    assert_eq!(state.len(), 3);
    let entries = state.entries();
    assert_eq!(entries[1].message, entries[2].message);
    assert_ne!(entries[1].key, entries[2].key);
}

#[test]
fn messages_may_arrive_before_join() {
    // The reducer itself is total; gating on session state happens elsewhere.
    let state = reduce(
        fresh(),
        &RoomEvent::Message(message("m1", "alice", "early")),
        T0,
    );
    assert_eq!(state.len(), 1);
}

#[test]
fn error_and_other_are_no_ops() {
    let state = fold(fresh(), &[joined(vec![]), bob_joined()]);
    let after = fold(
        state.clone(),
        &[
            RoomEvent::Error {
                message: "Username and room are required".into(),
            },
            RoomEvent::Other,
        ],
    );
    assert_eq!(state, after);
}

// ── Opt-in semantics ────────────────────────────────────────────────

#[test]
fn dedupe_and_idempotent_presence_together() {
    let options = RoomOptions {
        dedupe_messages: true,
        idempotent_presence: true,
    };
    let m = message("m1", "alice", "hi");
    let state = fold(
        RoomState::new("general", options),
        &[
            joined(vec![]),
            RoomEvent::Message(m.clone()),
            RoomEvent::Message(m),
            bob_joined(),
            bob_joined(),
            bob_left(),
            bob_left(),
        ],
    );
    // welcome, m1, bob joined, bob left
    assert_eq!(state.len(), 4);
    assert_eq!(state.presence_count(), 1);
    assert_eq!(state.options(), options);
}

#[test]
fn idempotent_presence_still_reports_earlier_members_leaving() {
    let options = RoomOptions {
        idempotent_presence: true,
        ..RoomOptions::default()
    };
    let carol_left = RoomEvent::UserLeft {
        username: "carol".into(),
    };
    let state = fold(
        RoomState::new("general", options),
        &[joined(vec![]), bob_joined(), carol_left.clone(), carol_left],
    );
    // welcome, bob joined, carol left
    assert_eq!(state.len(), 3);
    assert_eq!(state.presence_count(), 1);
    assert_eq!(
        state.entries()[2].message.body,
        "carol left the conversation"
    );
}
