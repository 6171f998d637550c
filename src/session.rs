//! Session controller: the connection lifecycle state machine.
//!
//! [`Session`] performs no I/O. The driver feeds it transport lifecycle
//! notifications, inbound frames, local intents and the current time; the
//! session updates its [`RoomState`] and queues [`Output`]s (frames to send,
//! events to publish) which the driver drains after every step.
//!
//! ```text
//! Idle ──join_room──▶ Connecting ──on_connected──▶ Connected ──room_joined──▶ Joined
//!                        │  ▲                          │                         │
//!                        │  └────── transport lost (reconnecting) ◀─────────────┘
//!                        ▼
//!                      Closed ◀── connect failure / server error / leave (from any state)
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{ChatError, Result};
use crate::event::ChatEvent;
use crate::protocol::{
    ClientEvent, JoinRoomPayload, SendMessagePayload, ServerEvent, TypingPayload,
};
use crate::room::{reduce, RoomEvent, RoomOptions, RoomState};
use crate::typing::{TypingDebounce, TypingSignal, DEFAULT_TYPING_IDLE};

/// Longest accepted message body, in characters.
pub const MAX_MESSAGE_CHARS: usize = 500;

// ── Configuration ───────────────────────────────────────────────────

/// Behavior knobs for a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Idle period after the last keystroke before typing stops.
    pub typing_idle: Duration,
    /// Opt-in room semantics.
    pub room_options: RoomOptions,
    /// Also send `typing` frames to the server.
    pub broadcast_typing: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            typing_idle: DEFAULT_TYPING_IDLE,
            room_options: RoomOptions::default(),
            broadcast_typing: false,
        }
    }
}

// ── Identity ────────────────────────────────────────────────────────

/// Who joins which room. Fixed for the lifetime of a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity {
    username: String,
    room: String,
}

impl Identity {
    /// Build an identity from user input. Both fields are trimmed.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::InvalidIdentity`] if either field is blank.
    pub fn new(username: impl AsRef<str>, room: impl AsRef<str>) -> Result<Self> {
        let username = username.as_ref().trim();
        let room = room.as_ref().trim();
        if username.is_empty() || room.is_empty() {
            return Err(ChatError::InvalidIdentity);
        }
        Ok(Self {
            username: username.to_string(),
            room: room.to_string(),
        })
    }

    /// Display name of the local user.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Room to join.
    pub fn room(&self) -> &str {
        &self.room
    }
}

// ── State & diagnostics ─────────────────────────────────────────────

/// Lifecycle state of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Created, no join requested yet.
    Idle,
    /// Waiting for the transport (initial connect or reconnect).
    Connecting,
    /// Transport up, join sent, waiting for `room_joined`.
    Connected,
    /// In the room.
    Joined,
    /// Terminal.
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Joined => "joined",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Why a session closed on its own.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionFault {
    /// Transport unreachable, timed out, or lost without recovery.
    #[error("connection error: {0}")]
    Connection(String),
    /// The server sent an `error` event.
    #[error("server error: {0}")]
    Server(String),
}

/// What was wrong with a dropped inbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViolationReason {
    /// The event is valid but not in the current state.
    UnexpectedInState,
    /// The payload did not match the event's schema.
    MalformedPayload(String),
}

/// Diagnostic for an inbound event the session refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolViolation {
    /// Session state when the event arrived.
    pub state: ConnectionState,
    /// Wire name of the event.
    pub event: String,
    /// Why it was dropped.
    pub reason: ViolationReason,
}

/// Work queued by the session for its driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
    /// Write this frame to the transport.
    Send(ClientEvent),
    /// Publish this event to the application.
    Emit(ChatEvent),
}

// ── Session ─────────────────────────────────────────────────────────

/// One client's bounded-lifetime participation in a single room.
#[derive(Debug)]
pub struct Session {
    id: Uuid,
    config: SessionConfig,
    state: ConnectionState,
    identity: Option<Identity>,
    pending_join: bool,
    room: Option<RoomState>,
    typing: TypingDebounce,
    fault: Option<SessionFault>,
    diagnostics: Vec<ProtocolViolation>,
    outputs: VecDeque<Output>,
}

impl Session {
    /// Create an idle session.
    pub fn new(config: SessionConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            config,
            state: ConnectionState::Idle,
            identity: None,
            pending_join: false,
            room: None,
            typing: TypingDebounce::new(config.typing_idle),
            fault: None,
            diagnostics: Vec::new(),
            outputs: VecDeque::new(),
        }
    }

    // ── Accessors ───────────────────────────────────────────────────

    /// Random id used to correlate log lines.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Identity recorded by [`join_room`](Self::join_room).
    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    /// The room log, once a join has been requested.
    pub fn room(&self) -> Option<&RoomState> {
        self.room.as_ref()
    }

    /// Whether a `join_room` frame is outstanding.
    pub fn pending_join(&self) -> bool {
        self.pending_join
    }

    /// Why the session closed, if it closed on its own.
    pub fn fault(&self) -> Option<&SessionFault> {
        self.fault.as_ref()
    }

    /// Every inbound event dropped so far.
    pub fn diagnostics(&self) -> &[ProtocolViolation] {
        &self.diagnostics
    }

    /// Returns `true` once the session reached [`ConnectionState::Closed`].
    pub fn is_closed(&self) -> bool {
        self.state == ConnectionState::Closed
    }

    /// Pending typing expiry, if any.
    pub fn typing_deadline(&self) -> Option<Instant> {
        self.typing.deadline()
    }

    /// Take all queued outputs, oldest first.
    pub fn drain_outputs(&mut self) -> impl Iterator<Item = Output> + '_ {
        self.outputs.drain(..)
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    /// Record `identity` and start connecting. `Idle → Connecting`.
    ///
    /// # Errors
    ///
    /// [`ChatError::AlreadyJoined`] if a join was already requested,
    /// [`ChatError::SessionClosed`] if the session is closed
    /// ([`ChatError::Server`] if a server error closed it).
    pub fn join_room(&mut self, identity: Identity) -> Result<()> {
        match self.state {
            ConnectionState::Idle => {}
            ConnectionState::Closed => return Err(self.closed_error()),
            _ => return Err(ChatError::AlreadyJoined),
        }
        info!(
            session_id = %self.id,
            username = identity.username(),
            room = identity.room(),
            "joining room"
        );
        self.room = Some(RoomState::new(identity.room(), self.config.room_options));
        self.identity = Some(identity);
        self.state = ConnectionState::Connecting;
        Ok(())
    }

    /// The transport connected (initially or after a reconnect).
    /// `Connecting → Connected`, and the join is sent once.
    pub fn on_connected(&mut self) {
        if self.state != ConnectionState::Connecting {
            warn!(session_id = %self.id, state = %self.state, "connect notification ignored");
            return;
        }
        self.state = ConnectionState::Connected;
        self.emit(ChatEvent::Connected);

        let Some(identity) = &self.identity else {
            return;
        };
        if self.pending_join {
            return;
        }
        let join = ClientEvent::JoinRoom(JoinRoomPayload {
            username: identity.username.clone(),
            room: identity.room.clone(),
        });
        self.pending_join = true;
        self.outputs.push_back(Output::Send(join));
        debug!(session_id = %self.id, "join_room queued");
    }

    /// The transport could not be established. `Connecting → Closed`.
    pub fn on_connect_failed(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        warn!(session_id = %self.id, %reason, "connect failed");
        self.close(Some(SessionFault::Connection(reason)));
    }

    /// The live transport dropped.
    ///
    /// With `reconnecting` the session falls back to `Connecting` and will
    /// re-join on the next [`on_connected`](Self::on_connected); without it the
    /// session closes.
    pub fn on_transport_lost(&mut self, reason: impl Into<String>, reconnecting: bool) {
        let reason = reason.into();
        match self.state {
            ConnectionState::Idle | ConnectionState::Closed => return,
            ConnectionState::Connecting | ConnectionState::Connected | ConnectionState::Joined => {}
        }
        if !reconnecting {
            warn!(session_id = %self.id, %reason, "transport lost");
            self.close(Some(SessionFault::Connection(reason)));
            return;
        }
        info!(session_id = %self.id, %reason, "transport lost, awaiting reconnect");
        self.stop_typing(false);
        self.state = ConnectionState::Connecting;
        self.pending_join = false;
        self.emit(ChatEvent::Reconnecting { reason });
    }

    /// Explicit leave. Any state `→ Closed`; queued frames are discarded.
    pub fn leave(&mut self) {
        if self.is_closed() {
            return;
        }
        info!(session_id = %self.id, "leaving room");
        self.close(None);
    }

    // ── Inbound ─────────────────────────────────────────────────────

    /// Entry point for a raw inbound frame.
    pub fn handle_frame(&mut self, event: &str, data: Value) {
        match ServerEvent::from_parts(event, data) {
            Ok(Some(parsed)) => self.handle_event(parsed),
            Ok(None) => debug!(session_id = %self.id, event, "ignoring unknown event"),
            Err(e) => self.violation(event, ViolationReason::MalformedPayload(e.to_string())),
        }
    }

    /// Dispatch a decoded server event according to the current state.
    pub fn handle_event(&mut self, event: ServerEvent) {
        let state = self.state;
        let awaiting_or_joined = matches!(
            state,
            ConnectionState::Connected | ConnectionState::Joined
        );
        match event {
            ServerEvent::Connected => {
                debug!(session_id = %self.id, "server acknowledged connection");
            }
            ServerEvent::RoomJoined(_) if awaiting_or_joined => {
                self.state = ConnectionState::Joined;
                self.pending_join = false;
                self.apply(event);
            }
            ServerEvent::Error(payload) if awaiting_or_joined => {
                let message = payload.message;
                warn!(session_id = %self.id, %message, "server error");
                self.emit(ChatEvent::ServerError {
                    message: message.clone(),
                });
                self.close(Some(SessionFault::Server(message)));
            }
            _ if state == ConnectionState::Joined => self.apply(event),
            _ => {
                debug!(session_id = %self.id, %state, event = event.name(), "event outside joined state");
                self.violation(event.name(), ViolationReason::UnexpectedInState);
            }
        }
    }

    // ── Outbound intents ────────────────────────────────────────────

    /// Queue a chat message.
    ///
    /// The text is trimmed; nothing reaches the wire if it is rejected.
    ///
    /// # Errors
    ///
    /// - [`ChatError::EmptyMessage`] for empty or whitespace-only text
    /// - [`ChatError::MessageTooLong`] above [`MAX_MESSAGE_CHARS`]
    /// - [`ChatError::NotJoined`] before the room acknowledged the join
    /// - [`ChatError::Server`] after a server error closed the session
    /// - [`ChatError::SessionClosed`] after any other close
    pub fn send_message(&mut self, text: &str) -> Result<()> {
        let body = text.trim();
        if body.is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        let len = body.chars().count();
        if len > MAX_MESSAGE_CHARS {
            return Err(ChatError::MessageTooLong {
                len,
                max: MAX_MESSAGE_CHARS,
            });
        }
        match self.state {
            ConnectionState::Joined => {}
            ConnectionState::Closed => return Err(self.closed_error()),
            _ => return Err(ChatError::NotJoined),
        }
        self.outputs
            .push_back(Output::Send(ClientEvent::SendMessage(SendMessagePayload {
                message: body.to_string(),
            })));
        self.stop_typing(true);
        Ok(())
    }

    /// A keystroke left `input` in the composer.
    pub fn on_input(&mut self, input: &str, now: Instant) {
        if self.state != ConnectionState::Joined {
            return;
        }
        if let Some(TypingSignal::Started) = self.typing.on_input(input, now) {
            self.set_typing(true, true);
        }
    }

    /// Expire timers that are due at `now`.
    pub fn poll_timers(&mut self, now: Instant) {
        if let Some(TypingSignal::Stopped) = self.typing.poll(now) {
            self.set_typing(false, true);
        }
    }

    // ── Internals ───────────────────────────────────────────────────

    fn emit(&mut self, event: ChatEvent) {
        self.outputs.push_back(Output::Emit(event));
    }

    fn violation(&mut self, event: &str, reason: ViolationReason) {
        let violation = ProtocolViolation {
            state: self.state,
            event: event.to_string(),
            reason,
        };
        warn!(session_id = %self.id, ?violation, "protocol violation, event dropped");
        self.diagnostics.push(violation.clone());
        self.emit(ChatEvent::ProtocolViolation(violation));
    }

    fn close(&mut self, fault: Option<SessionFault>) {
        self.stop_typing(false);
        self.state = ConnectionState::Closed;
        self.pending_join = false;
        self.fault = fault;
        self.outputs.retain(|o| matches!(o, Output::Emit(_)));
    }

    fn closed_error(&self) -> ChatError {
        match &self.fault {
            Some(SessionFault::Server(message)) => ChatError::Server {
                message: message.clone(),
            },
            _ => ChatError::SessionClosed,
        }
    }

    fn stop_typing(&mut self, to_wire: bool) {
        if let Some(TypingSignal::Stopped) = self.typing.stop() {
            self.set_typing(false, to_wire);
        }
    }

    fn set_typing(&mut self, typing: bool, to_wire: bool) {
        self.reduce_room(&RoomEvent::SelfTyping(typing));
        self.emit(ChatEvent::TypingChanged(typing));
        if to_wire && self.config.broadcast_typing && self.state == ConnectionState::Joined {
            self.outputs
                .push_back(Output::Send(ClientEvent::Typing(TypingPayload { typing })));
        }
    }

    fn reduce_room(&mut self, event: &RoomEvent) {
        if let Some(room) = self.room.take() {
            let stamp = chrono::Utc::now().to_rfc3339();
            self.room = Some(reduce(room, event, &stamp));
        }
    }

    /// Run the reducer and publish what changed.
    fn apply(&mut self, event: ServerEvent) {
        let before = self.room.as_ref().map_or(0, RoomState::len);
        let event = RoomEvent::from(event);
        self.reduce_room(&event);
        let Some(room) = &self.room else {
            return;
        };
        let appended = room.len() > before;

        let out = match event {
            RoomEvent::Joined { room: name, .. } => Some(ChatEvent::RoomJoined {
                room: name,
                entries: room.entries().to_vec(),
                presence: room.presence_count(),
            }),
            RoomEvent::Message(_) if appended => room.last().cloned().map(ChatEvent::MessageAppended),
            RoomEvent::UserJoined { username } if appended => {
                room.last().cloned().map(|notice| ChatEvent::UserJoined {
                    username,
                    presence: room.presence_count(),
                    notice,
                })
            }
            RoomEvent::UserLeft { username } if appended => {
                room.last().cloned().map(|notice| ChatEvent::UserLeft {
                    username,
                    presence: room.presence_count(),
                    notice,
                })
            }
            _ => None,
        };
        if let Some(out) = out {
            self.emit(out);
        }
    }
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
    use serde_json::json;

    fn joined_session() -> Session {
        let mut session = Session::new(SessionConfig::default());
        session
            .join_room(Identity::new("alice", "general").unwrap())
            .unwrap();
        session.on_connected();
        session.handle_frame("room_joined", json!({"room": "general", "messages": []}));
        session.drain_outputs().for_each(drop);
        session
    }

    #[test]
    fn identity_rejects_blank_fields() {
        assert!(matches!(
            Identity::new("  ", "general"),
            Err(ChatError::InvalidIdentity)
        ));
        assert!(matches!(
            Identity::new("alice", ""),
            Err(ChatError::InvalidIdentity)
        ));
        let id = Identity::new(" alice ", " general ").unwrap();
        assert_eq!(id.username(), "alice");
        assert_eq!(id.room(), "general");
    }

    #[test]
    fn on_connected_outside_connecting_is_ignored() {
        let mut session = Session::new(SessionConfig::default());
        session.on_connected();
        assert_eq!(session.state(), ConnectionState::Idle);
        assert_eq!(session.drain_outputs().count(), 0);
    }

    #[test]
    fn room_joined_clears_pending_join() {
        let mut session = Session::new(SessionConfig::default());
        session
            .join_room(Identity::new("alice", "general").unwrap())
            .unwrap();
        session.on_connected();
        assert!(session.pending_join());
        session.handle_frame("room_joined", json!({"room": "general"}));
        assert!(!session.pending_join());
        assert_eq!(session.state(), ConnectionState::Joined);
    }

    #[test]
    fn malformed_payload_is_recorded() {
        let mut session = joined_session();
        session.handle_frame("new_message", json!({"id": 1}));
        assert_eq!(session.diagnostics().len(), 1);
        assert!(matches!(
            session.diagnostics()[0].reason,
            ViolationReason::MalformedPayload(_)
        ));
        assert_eq!(session.room().unwrap().len(), 1);
    }

    #[test]
    fn unknown_event_is_silently_ignored() {
        let mut session = joined_session();
        session.handle_frame("reaction_added", json!({}));
        assert!(session.diagnostics().is_empty());
        assert_eq!(session.drain_outputs().count(), 0);
    }

    #[test]
    fn leave_discards_queued_frames() {
        let mut session = joined_session();
        session.send_message("hi").unwrap();
        session.leave();
        assert!(session
            .drain_outputs()
            .all(|o| matches!(o, Output::Emit(_))));
        assert!(session.fault().is_none());
        assert!(matches!(
            session.send_message("again"),
            Err(ChatError::SessionClosed)
        ));
    }

    #[test]
    fn message_limit_counts_characters() {
        let mut session = joined_session();
        let at_limit = "é".repeat(MAX_MESSAGE_CHARS);
        assert!(session.send_message(&at_limit).is_ok());
        let over = "é".repeat(MAX_MESSAGE_CHARS + 1);
        assert!(matches!(
            session.send_message(&over),
            Err(ChatError::MessageTooLong { len: 501, max: 500 })
        ));
    }
}
