//! Room state and the pure reducer that folds inbound events into it.
//!
//! [`reduce`] is total: every [`RoomEvent`] maps to a defined transformation
//! and nothing in here can fail. The only source of "fresh" values is the
//! display-key counter stored inside [`RoomState`] itself, so replaying the
//! same events over the same starting state always yields the same result.
//!
//! # Example
//!
//! ```
//! use room_chat_client::room::{reduce, RoomEvent, RoomOptions, RoomState};
//!
//! let state = RoomState::new("general", RoomOptions::default());
//! let state = reduce(
//!     state,
//!     &RoomEvent::Joined { room: "general".into(), messages: vec![] },
//!     "2025-01-01T00:00:00Z",
//! );
//! let state = reduce(
//!     state,
//!     &RoomEvent::UserJoined { username: "bob".into() },
//!     "2025-01-01T00:00:01Z",
//! );
//! assert_eq!(state.len(), 2);
//! assert_eq!(state.presence_count(), 2);
//! ```

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::protocol::{ChatMessage, MessageKind, ServerEvent};

/// Author shown on client-synthesized notices.
pub const NOTICE_AUTHOR: &str = "System";

/// Opt-in behaviors that differ from what the room service's reference
/// clients do. Both default to off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RoomOptions {
    /// Skip `new_message` events whose id is already in the log.
    pub dedupe_messages: bool,
    /// Count presence from a keyed set of usernames, so a duplicate
    /// `user_joined`/`user_left` changes nothing.
    pub idempotent_presence: bool,
}

/// Client-assigned key, unique across every entry a [`RoomState`] has ever held.
pub type DisplayKey = u64;

/// One line of the room log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// Unique display key. Two deliveries of the same message get different keys.
    pub key: DisplayKey,
    /// The message itself.
    pub message: ChatMessage,
}

/// Input of the reducer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomEvent {
    /// Join acknowledged with a snapshot of existing messages.
    Joined {
        room: String,
        messages: Vec<ChatMessage>,
    },
    /// One broadcast message.
    Message(ChatMessage),
    /// Another user entered.
    UserJoined { username: String },
    /// A user left.
    UserLeft { username: String },
    /// Server error. Handled by the session; leaves the room untouched.
    Error { message: String },
    /// The local user started or stopped typing.
    SelfTyping(bool),
    /// Anything else. No effect.
    Other,
}

impl From<ServerEvent> for RoomEvent {
    fn from(event: ServerEvent) -> Self {
        match event {
            ServerEvent::RoomJoined(p) => Self::Joined {
                room: p.room,
                messages: p.messages,
            },
            ServerEvent::NewMessage(m) => Self::Message(m),
            ServerEvent::UserJoined(p) => Self::UserJoined {
                username: p.username,
            },
            ServerEvent::UserLeft(p) => Self::UserLeft {
                username: p.username,
            },
            ServerEvent::Error(p) => Self::Error { message: p.message },
            ServerEvent::Connected => Self::Other,
        }
    }
}

/// The client's current belief about one room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomState {
    room_id: String,
    entries: Vec<LogEntry>,
    presence: u32,
    self_typing: bool,
    /// Last presence change seen per user: `true` joined, `false` left.
    seen: BTreeMap<String, bool>,
    next_key: DisplayKey,
    options: RoomOptions,
}

impl RoomState {
    /// Empty state for `room_id` with only the local user present.
    pub fn new(room_id: impl Into<String>, options: RoomOptions) -> Self {
        Self {
            room_id: room_id.into(),
            entries: Vec::new(),
            presence: 1,
            self_typing: false,
            seen: BTreeMap::new(),
            next_key: 0,
            options,
        }
    }

    /// Room name as last acknowledged by the server.
    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    /// Log entries in display order.
    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    /// Messages in display order.
    pub fn messages(&self) -> impl Iterator<Item = &ChatMessage> + '_ {
        self.entries.iter().map(|e| &e.message)
    }

    /// Number of log entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the log is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Approximate number of occupants, never below 1.
    pub fn presence_count(&self) -> u32 {
        self.presence
    }

    /// Whether the local user is currently typing.
    pub fn self_typing(&self) -> bool {
        self.self_typing
    }

    /// Options this state was created with.
    pub fn options(&self) -> RoomOptions {
        self.options
    }

    /// Most recent entry.
    pub fn last(&self) -> Option<&LogEntry> {
        self.entries.last()
    }

    fn alloc_key(&mut self) -> DisplayKey {
        let key = self.next_key;
        self.next_key += 1;
        key
    }

    fn notice(&mut self, prefix: &str, body: String, stamp: &str) -> LogEntry {
        let key = self.alloc_key();
        LogEntry {
            key,
            message: ChatMessage {
                id: format!("{prefix}-{key}"),
                author: NOTICE_AUTHOR.to_string(),
                body,
                sent_at: stamp.to_string(),
                room: Some(self.room_id.clone()),
                kind: MessageKind::SystemNotice,
            },
        }
    }

    fn push(&mut self, message: ChatMessage) {
        let key = self.alloc_key();
        self.entries.push(LogEntry { key, message });
    }

    /// Record a presence change. Returns `false` if it repeats the last one
    /// seen for `username`. Users present before the local join have no entry,
    /// so their first leave still counts.
    fn mark(&mut self, username: &str, present: bool) -> bool {
        self.seen.insert(username.to_string(), present) != Some(present)
    }

    fn contains_id(&self, id: &str) -> bool {
        self.entries.iter().any(|e| e.message.id == id)
    }
}

/// Fold one event into `state`.
///
/// `stamp` is the receive time used as `sent_at` on synthesized notices.
///
/// - `Joined` replaces the whole log with the snapshot (in the order given),
///   prepends a welcome notice and resets presence to 1. It is the only
///   transition that discards entries.
/// - `Message` appends unconditionally, duplicates included, unless
///   [`RoomOptions::dedupe_messages`] is set.
/// - `UserJoined` / `UserLeft` append a notice and move the presence counter,
///   which never drops below 1.
/// - `Error` and `Other` leave the state untouched.
pub fn reduce(mut state: RoomState, event: &RoomEvent, stamp: &str) -> RoomState {
    match event {
        RoomEvent::Joined { room, messages } => {
            state.room_id.clone_from(room);
            state.entries.clear();
            state.seen.clear();
            state.presence = 1;
            state.self_typing = false;

            let welcome = state.notice("welcome", format!("Welcome to {room}"), stamp);
            state.entries.push(welcome);

            let mut seen = HashSet::new();
            for message in messages {
                if state.options.dedupe_messages && !seen.insert(message.id.as_str()) {
                    continue;
                }
                state.push(message.clone());
            }
        }
        RoomEvent::Message(message) => {
            if state.options.dedupe_messages && state.contains_id(&message.id) {
                return state;
            }
            state.push(message.clone());
        }
        RoomEvent::UserJoined { username } => {
            if state.options.idempotent_presence && !state.mark(username, true) {
                return state;
            }
            state.presence = state.presence.saturating_add(1);
            let entry = state.notice("join", format!("{username} joined the conversation"), stamp);
            state.entries.push(entry);
        }
        RoomEvent::UserLeft { username } => {
            if state.options.idempotent_presence && !state.mark(username, false) {
                return state;
            }
            state.presence = state.presence.saturating_sub(1).max(1);
            let entry = state.notice("leave", format!("{username} left the conversation"), stamp);
            state.entries.push(entry);
        }
        RoomEvent::SelfTyping(typing) => {
            state.self_typing = *typing;
        }
        RoomEvent::Error { .. } | RoomEvent::Other => {}
    }
    state
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    const T: &str = "2025-01-01T00:00:00Z";

    fn msg(id: &str) -> ChatMessage {
        ChatMessage::new(id, "alice", "hello", T)
    }

    fn joined(messages: Vec<ChatMessage>) -> RoomEvent {
        RoomEvent::Joined {
            room: "general".into(),
            messages,
        }
    }

    #[test]
    fn welcome_is_prepended_to_snapshot() {
        let state = reduce(
            RoomState::new("general", RoomOptions::default()),
            &joined(vec![msg("a"), msg("b")]),
            T,
        );
        let ids: Vec<_> = state.messages().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["welcome-0", "a", "b"]);
        assert!(state.entries()[0].message.is_notice());
        assert_eq!(state.entries()[0].message.body, "Welcome to general");
    }

    #[test]
    fn notice_keys_never_repeat_across_rejoins() {
        let state = RoomState::new("general", RoomOptions::default());
        let state = reduce(state, &joined(vec![]), T);
        let first = state.entries()[0].key;
        let state = reduce(state, &joined(vec![]), T);
        assert_ne!(state.entries()[0].key, first);
        assert_eq!(state.entries()[0].message.id, "welcome-1");
    }

    #[test]
    fn error_does_not_touch_state() {
        let state = reduce(
            RoomState::new("general", RoomOptions::default()),
            &joined(vec![msg("a")]),
            T,
        );
        let before = state.clone();
        let after = reduce(
            state,
            &RoomEvent::Error {
                message: "boom".into(),
            },
            T,
        );
        assert_eq!(before, after);
    }

    #[test]
    fn self_typing_flag_follows_event() {
        let state = RoomState::new("general", RoomOptions::default());
        let state = reduce(state, &RoomEvent::SelfTyping(true), T);
        assert!(state.self_typing());
        let state = reduce(state, &RoomEvent::SelfTyping(false), T);
        assert!(!state.self_typing());
    }

    #[test]
    fn dedupe_option_drops_repeated_ids() {
        let options = RoomOptions {
            dedupe_messages: true,
            ..RoomOptions::default()
        };
        let state = reduce(
            RoomState::new("general", options),
            &joined(vec![msg("a"), msg("a")]),
            T,
        );
        assert_eq!(state.len(), 2);
        let state = reduce(state, &RoomEvent::Message(msg("a")), T);
        let state = reduce(state, &RoomEvent::Message(msg("b")), T);
        assert_eq!(state.len(), 3);
    }

    #[test]
    fn idempotent_presence_ignores_repeats() {
        let options = RoomOptions {
            idempotent_presence: true,
            ..RoomOptions::default()
        };
        let bob = || RoomEvent::UserJoined {
            username: "bob".into(),
        };
        let state = reduce(RoomState::new("general", options), &joined(vec![]), T);
        let state = reduce(state, &bob(), T);
        let state = reduce(state, &bob(), T);
        assert_eq!(state.presence_count(), 2);
        assert_eq!(state.len(), 2);

        let left = RoomEvent::UserLeft {
            username: "bob".into(),
        };
        let state = reduce(state, &left, T);
        let state = reduce(state, &left, T);
        assert_eq!(state.presence_count(), 1);
        assert_eq!(state.len(), 3);
    }

    #[test]
    fn idempotent_presence_counts_users_present_before_us() {
        let options = RoomOptions {
            idempotent_presence: true,
            ..RoomOptions::default()
        };
        let carol_left = RoomEvent::UserLeft {
            username: "carol".into(),
        };
        let state = reduce(RoomState::new("general", options), &joined(vec![]), T);
        let bob = RoomEvent::UserJoined {
            username: "bob".into(),
        };
        let state = reduce(state, &bob, T);
        let state = reduce(state, &carol_left, T);
        assert_eq!(state.presence_count(), 1);
        assert_eq!(state.len(), 3);
        assert_eq!(
            state.entries()[2].message.body,
            "carol left the conversation"
        );

        let state = reduce(state, &carol_left, T);
        assert_eq!(state.len(), 3);
    }
}
