//! High-level events delivered to the application.

use crate::room::LogEntry;
use crate::session::{ProtocolViolation, SessionFault};

/// Events emitted by [`ChatClient`](crate::ChatClient) on its event channel.
///
/// Events arrive in the order the session processed them. The last event on
/// the channel is always [`Disconnected`](ChatEvent::Disconnected).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// The transport is connected and the join request is on its way.
    Connected,
    /// The room acknowledged the join. `entries` is the full replacement log
    /// (welcome notice first, then the snapshot).
    RoomJoined {
        room: String,
        entries: Vec<LogEntry>,
        presence: u32,
    },
    /// A message was appended to the log.
    MessageAppended(LogEntry),
    /// Another user joined; `notice` is the synthesized log entry.
    UserJoined {
        username: String,
        presence: u32,
        notice: LogEntry,
    },
    /// A user left; `notice` is the synthesized log entry.
    UserLeft {
        username: String,
        presence: u32,
        notice: LogEntry,
    },
    /// The local typing indicator changed.
    TypingChanged(bool),
    /// The server sent an `error` event. The session closes right after.
    ServerError { message: String },
    /// An event arrived in a state that cannot accept it and was dropped.
    ProtocolViolation(ProtocolViolation),
    /// The connection dropped and the adapter is reconnecting. Sends fail
    /// with `NotJoined` until the room is joined again.
    Reconnecting { reason: String },
    /// The session is over. `fault` is `None` after an explicit leave or
    /// shutdown.
    Disconnected { fault: Option<SessionFault> },
}
