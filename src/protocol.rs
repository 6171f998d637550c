//! Wire-compatible protocol types for the room chat protocol.
//!
//! Every frame is a JSON text message of the form
//! `{"event": "<name>", "data": <payload>}`. Server events are modelled by
//! [`ServerEvent`], client intents by [`ClientEvent`]. Both enums serialize to
//! exactly that envelope, so a server (or a test) can produce frames with
//! `serde_json::to_string(&ServerEvent::…)`.
//!
//! Field names follow what the room service emits (`username`, `message`,
//! `timestamp`) and are mapped onto descriptive Rust names.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Wire event names.
pub mod events {
    /// Client → server: request to join a room.
    pub const JOIN_ROOM: &str = "join_room";
    /// Client → server: text to broadcast.
    pub const SEND_MESSAGE: &str = "send_message";
    /// Client → server: local typing state (opt-in).
    pub const TYPING: &str = "typing";
    /// Server → client: informational connection acknowledgment.
    pub const CONNECTED: &str = "connected";
    /// Server → client: join acknowledged with a message snapshot.
    pub const ROOM_JOINED: &str = "room_joined";
    /// Server → client: one broadcast message.
    pub const NEW_MESSAGE: &str = "new_message";
    /// Server → client: presence notice for an arriving user.
    pub const USER_JOINED: &str = "user_joined";
    /// Server → client: presence notice for a departing user.
    pub const USER_LEFT: &str = "user_left";
    /// Server → client: terminal or advisory error.
    pub const ERROR: &str = "error";

    /// Every server → client event this crate understands.
    pub const SERVER_EVENTS: &[&str] = &[
        CONNECTED,
        ROOM_JOINED,
        NEW_MESSAGE,
        USER_JOINED,
        USER_LEFT,
        ERROR,
    ];
}

// ── Envelope ────────────────────────────────────────────────────────

/// A decoded inbound frame, before its payload is interpreted.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Envelope {
    /// Event name.
    pub event: String,
    /// Raw payload. Missing payloads decode as `null`.
    #[serde(default)]
    pub data: Value,
}

/// Borrowed outbound frame.
#[derive(Debug, Serialize)]
pub(crate) struct OutgoingEnvelope<'a> {
    pub event: &'a str,
    pub data: &'a Value,
}

// ── Enums ───────────────────────────────────────────────────────────

/// Whether a message was written by a user or synthesized by the client.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "kebab-case")]
pub enum MessageKind {
    /// A user-authored chat message.
    #[default]
    Chat,
    /// A client-synthesized lifecycle notice (welcome, join, leave).
    SystemNotice,
}

impl MessageKind {
    fn is_chat(&self) -> bool {
        matches!(self, Self::Chat)
    }
}

// ── Structs ─────────────────────────────────────────────────────────

/// One chat message, as stamped by the sender of record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Unique per room.
    pub id: String,
    /// Display name of the author.
    #[serde(rename = "username")]
    pub author: String,
    /// Message text.
    #[serde(rename = "message")]
    pub body: String,
    /// ISO 8601 timestamp assigned by the server.
    #[serde(rename = "timestamp")]
    pub sent_at: String,
    /// Room the message was posted in, when the server includes it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
    /// Absent on the wire for user messages.
    #[serde(default, skip_serializing_if = "MessageKind::is_chat")]
    pub kind: MessageKind,
}

impl ChatMessage {
    /// Create a user-authored chat message.
    pub fn new(
        id: impl Into<String>,
        author: impl Into<String>,
        body: impl Into<String>,
        sent_at: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            author: author.into(),
            body: body.into(),
            sent_at: sent_at.into(),
            room: None,
            kind: MessageKind::Chat,
        }
    }

    /// Returns `true` for client-synthesized notices.
    pub fn is_notice(&self) -> bool {
        self.kind == MessageKind::SystemNotice
    }
}

/// Payload of `join_room`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinRoomPayload {
    pub username: String,
    pub room: String,
}

/// Payload of `send_message`. The server stamps author, time and id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendMessagePayload {
    pub message: String,
}

/// Payload of the opt-in `typing` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypingPayload {
    pub typing: bool,
}

/// Payload of `room_joined`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomJoinedPayload {
    pub room: String,
    /// Echo of the joining username.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Existing messages, oldest first.
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

/// Payload of `user_joined` and `user_left`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresencePayload {
    pub username: String,
    /// Server-rendered notice text, unused by the client.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Payload of `error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub message: String,
}

// ── Events ──────────────────────────────────────────────────────────

/// Events sent from client to server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Request to join a room. Retries are not guaranteed safe.
    JoinRoom(JoinRoomPayload),
    /// Text to broadcast to the room.
    SendMessage(SendMessagePayload),
    /// Local typing state changed.
    Typing(TypingPayload),
}

impl ClientEvent {
    /// Wire name of this event.
    pub fn name(&self) -> &'static str {
        match self {
            Self::JoinRoom(_) => events::JOIN_ROOM,
            Self::SendMessage(_) => events::SEND_MESSAGE,
            Self::Typing(_) => events::TYPING,
        }
    }

    /// Serialize the payload alone (without the envelope).
    pub fn payload(&self) -> Result<Value, serde_json::Error> {
        match self {
            Self::JoinRoom(p) => serde_json::to_value(p),
            Self::SendMessage(p) => serde_json::to_value(p),
            Self::Typing(p) => serde_json::to_value(p),
        }
    }
}

/// Events sent from server to client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Informational acknowledgment sent right after the socket opens.
    Connected,
    /// Join acknowledged, carrying the room's message snapshot.
    RoomJoined(RoomJoinedPayload),
    /// One message broadcast to every occupant.
    NewMessage(ChatMessage),
    /// Another user entered the room.
    UserJoined(PresencePayload),
    /// A user left the room.
    UserLeft(PresencePayload),
    /// The server rejected something.
    Error(ErrorPayload),
}

impl ServerEvent {
    /// Interpret a raw payload for a named event.
    ///
    /// Returns `Ok(None)` for event names this crate does not know, so newer
    /// servers can add events without breaking older clients.
    pub fn from_parts(event: &str, data: Value) -> Result<Option<Self>, serde_json::Error> {
        let parsed = match event {
            events::CONNECTED => Self::Connected,
            events::ROOM_JOINED => Self::RoomJoined(serde_json::from_value(data)?),
            events::NEW_MESSAGE => Self::NewMessage(serde_json::from_value(data)?),
            events::USER_JOINED => Self::UserJoined(serde_json::from_value(data)?),
            events::USER_LEFT => Self::UserLeft(serde_json::from_value(data)?),
            events::ERROR => Self::Error(serde_json::from_value(data)?),
            _ => return Ok(None),
        };
        Ok(Some(parsed))
    }

    /// Wire name of this event.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connected => events::CONNECTED,
            Self::RoomJoined(_) => events::ROOM_JOINED,
            Self::NewMessage(_) => events::NEW_MESSAGE,
            Self::UserJoined(_) => events::USER_JOINED,
            Self::UserLeft(_) => events::USER_LEFT,
            Self::Error(_) => events::ERROR,
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

    #[test]
    fn client_event_uses_event_data_envelope() {
        let ev = ClientEvent::JoinRoom(JoinRoomPayload {
            username: "alice".into(),
            room: "general".into(),
        });
        let value = serde_json::to_value(&ev).unwrap();
        assert_eq!(
            value,
            json!({"event": "join_room", "data": {"username": "alice", "room": "general"}})
        );
        assert_eq!(ev.name(), "join_room");
        assert_eq!(ev.payload().unwrap(), value["data"]);
    }

    #[test]
    fn server_message_uses_original_field_names() {
        let raw = json!({
            "id": "m1",
            "username": "bob",
            "message": "hi",
            "timestamp": "2025-01-01T10:00:00",
            "room": "general"
        });
        let msg: ChatMessage = serde_json::from_value(raw).unwrap();
        assert_eq!(msg.author, "bob");
        assert_eq!(msg.body, "hi");
        assert_eq!(msg.kind, MessageKind::Chat);
        assert_eq!(msg.room.as_deref(), Some("general"));
    }

    #[test]
    fn from_parts_ignores_unknown_events() {
        let parsed = ServerEvent::from_parts("reaction_added", json!({"x": 1})).unwrap();
        assert!(parsed.is_none());
    }

    #[test]
    fn from_parts_accepts_connected_with_any_payload() {
        let parsed = ServerEvent::from_parts("connected", json!({"message": "hello"})).unwrap();
        assert_eq!(parsed, Some(ServerEvent::Connected));
    }

    #[test]
    fn from_parts_rejects_malformed_payload() {
        assert!(ServerEvent::from_parts("user_joined", json!({"name": "x"})).is_err());
        assert!(ServerEvent::from_parts("new_message", Value::Null).is_err());
    }

    #[test]
    fn room_joined_tolerates_missing_messages() {
        let parsed = ServerEvent::from_parts("room_joined", json!({"room": "r"}))
            .unwrap()
            .unwrap();
        if let ServerEvent::RoomJoined(p) = parsed {
            assert!(p.messages.is_empty());
        } else {
            panic!("expected RoomJoined");
        }
    }
}
