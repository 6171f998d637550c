//! Transport abstraction for the room chat protocol.
//!
//! The [`Transport`] trait defines a bidirectional text message channel between
//! the client and the room service. Every frame is one JSON text message, so
//! implementations handle message framing internally (WebSocket frames,
//! length-prefixed TCP, in-process channels, ...).
//!
//! Connection setup is NOT part of [`Transport`]. Endpoints differ between
//! backends, and the client has to be able to open a fresh connection after a
//! drop, so setup lives behind the separate [`Connector`] trait.
//!
//! # Implementing a Custom Transport
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use room_chat_client::error::ChatError;
//! use room_chat_client::transport::{Connector, Transport};
//!
//! struct MyTransport { /* ... */ }
//!
//! #[async_trait]
//! impl Transport for MyTransport {
//!     async fn send(&mut self, message: String) -> Result<(), ChatError> {
//!         // Write one JSON frame
//!         unimplemented!()
//!     }
//!
//!     async fn recv(&mut self) -> Option<Result<String, ChatError>> {
//!         // Return None when the connection is closed cleanly
//!         unimplemented!()
//!     }
//!
//!     async fn close(&mut self) -> Result<(), ChatError> {
//!         unimplemented!()
//!     }
//! }
//!
//! struct MyConnector;
//!
//! #[async_trait]
//! impl Connector for MyConnector {
//!     async fn connect(&mut self, endpoint: &str) -> Result<Box<dyn Transport>, ChatError> {
//!         Ok(Box::new(MyTransport {}))
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::error::ChatError;

/// A bidirectional text message transport.
///
/// Each call to [`send`](Transport::send) transmits one complete JSON frame and
/// each call to [`recv`](Transport::recv) returns one.
///
/// # Cancel Safety
///
/// [`recv`](Transport::recv) **MUST** be cancel-safe because the client drives
/// it inside `tokio::select!`. If `recv` is cancelled before completion, calling
/// it again must not lose data. Channel-based implementations are naturally
/// cancel-safe.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Send a JSON text frame.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::TransportSend`] if the frame could not be written.
    async fn send(&mut self, message: String) -> Result<(), ChatError>;

    /// Receive the next JSON text frame.
    ///
    /// Returns:
    /// - `Some(Ok(text))`: a complete frame was received
    /// - `Some(Err(e))`: a transport error occurred
    /// - `None`: the connection was closed cleanly by the peer
    async fn recv(&mut self) -> Option<Result<String, ChatError>>;

    /// Close the connection gracefully.
    ///
    /// Implementations should release resources even if the close handshake
    /// fails, and closing twice must be harmless.
    async fn close(&mut self) -> Result<(), ChatError>;
}

/// Opens connected [`Transport`]s for an endpoint.
///
/// The adapter calls [`connect`](Connector::connect) once for the initial
/// connection and again for every reconnection attempt, so implementations
/// must be able to produce more than one transport.
#[async_trait]
pub trait Connector: Send + 'static {
    /// Open a new connection to `endpoint`.
    ///
    /// Timeouts are applied by the caller.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint is unreachable or rejects the
    /// connection.
    async fn connect(&mut self, endpoint: &str) -> Result<Box<dyn Transport>, ChatError>;
}
