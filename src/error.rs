//! Error types for the room chat client.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur when using the room chat client.
///
/// Protocol violations (events arriving in the wrong session state) are not
/// errors: they are recorded as [`ProtocolViolation`](crate::session::ProtocolViolation)
/// diagnostics and never returned across the API boundary.
#[derive(Debug, Error)]
pub enum ChatError {
    /// The transport could not be established, or was lost for good.
    #[error("connection error: {0}")]
    Connection(String),

    /// The transport did not acknowledge the connection in time.
    #[error("connection timed out after {0:?}")]
    ConnectTimeout(Duration),

    /// `connect` was called on an adapter that already connected once.
    #[error("transport already connected")]
    AlreadyConnected,

    /// A message was sent before the room join completed.
    #[error("not joined to a room")]
    NotJoined,

    /// A join was requested on a session that already started one.
    #[error("session already joined or joining a room")]
    AlreadyJoined,

    /// The message text was empty or whitespace-only.
    #[error("message is empty")]
    EmptyMessage,

    /// The message text exceeds the per-message character limit.
    #[error("message is {len} characters, limit is {max}")]
    MessageTooLong {
        /// Length of the rejected message in characters.
        len: usize,
        /// Maximum accepted length in characters.
        max: usize,
    },

    /// Username or room name was empty after trimming.
    #[error("username and room are required")]
    InvalidIdentity,

    /// The server sent an `error` event.
    #[error("server error: {message}")]
    Server {
        /// Human-readable error message from the server.
        message: String,
    },

    /// The session has been closed and cannot be used again.
    #[error("session closed")]
    SessionClosed,

    /// Failed to send a frame through the transport.
    #[error("transport send error: {0}")]
    TransportSend(String),

    /// Failed to receive a frame from the transport.
    #[error("transport receive error: {0}")]
    TransportReceive(String),

    /// The transport connection was closed.
    #[error("transport connection closed")]
    TransportClosed,

    /// Failed to serialize or deserialize a wire frame.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ChatError {
    /// Returns `true` if the caller may retry the same operation later on the
    /// same session.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::NotJoined | Self::EmptyMessage | Self::MessageTooLong { .. }
        )
    }
}

/// A specialized [`Result`] type for room chat client operations.
pub type Result<T> = std::result::Result<T, ChatError>;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn local_misuse_is_recoverable() {
        assert!(ChatError::NotJoined.is_recoverable());
        assert!(ChatError::EmptyMessage.is_recoverable());
        assert!(ChatError::MessageTooLong { len: 501, max: 500 }.is_recoverable());
    }

    #[test]
    fn connection_failures_are_fatal() {
        assert!(!ChatError::Connection("refused".into()).is_recoverable());
        assert!(!ChatError::ConnectTimeout(Duration::from_secs(5)).is_recoverable());
        assert!(!ChatError::SessionClosed.is_recoverable());
    }

    #[test]
    fn display_includes_limits() {
        let err = ChatError::MessageTooLong { len: 600, max: 500 };
        assert_eq!(err.to_string(), "message is 600 characters, limit is 500");
    }
}
