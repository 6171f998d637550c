//! # Room Chat Client
//!
//! Client-side synchronization core for room-scoped real-time chat.
//!
//! A client joins one named room under a display name, receives a snapshot of
//! the room's recent messages, then follows the live stream of messages and
//! presence changes. The crate keeps a consistent local [`RoomState`] (message
//! log, presence count, typing flag) and exposes it through a typed event
//! channel.
//!
//! ## Layers
//!
//! - [`room`]: pure reducer from inbound events to [`RoomState`]
//! - [`session`]: I/O-free connection lifecycle state machine
//! - [`adapter`]: one logical connection, named-event dispatch, reconnection
//! - [`client`]: async handle plus background session loop
//! - [`transport`] / [`transports`]: pluggable byte pipes (WebSocket built in)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! # #[cfg(feature = "transport-websocket")]
//! # async fn example() -> room_chat_client::Result<()> {
//! use room_chat_client::{ChatClient, ChatConfig, ChatEvent, WebSocketConnector};
//!
//! let (client, mut events) = ChatClient::start(
//!     WebSocketConnector::new(),
//!     ChatConfig::new("ws://localhost:3000/chat"),
//! );
//! client.join_room("alice", "general").await?;
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         ChatEvent::RoomJoined { .. } => client.send_message("hi all").await?,
//!         ChatEvent::MessageAppended(entry) => {
//!             println!("{}: {}", entry.message.author, entry.message.body);
//!         }
//!         ChatEvent::Disconnected { .. } => break,
//!         _ => {}
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod client;
pub mod error;
pub mod event;
pub mod protocol;
pub mod reconnect;
pub mod room;
pub mod session;
pub mod transport;
pub mod transports;
pub mod typing;

// Re-export primary types for ergonomic imports.
pub use adapter::{DispatchMode, LinkEvent, TransportAdapter};
pub use client::{ChatClient, ChatConfig, SessionSnapshot};
pub use error::{ChatError, Result};
pub use event::ChatEvent;
pub use protocol::{ChatMessage, ClientEvent, ServerEvent};
pub use reconnect::{ExponentialBackoff, FixedSchedule, NoReconnect, ReconnectPolicy};
pub use room::{reduce, RoomEvent, RoomOptions, RoomState};
pub use session::{ConnectionState, Identity, Session, SessionConfig, SessionFault};
pub use transport::{Connector, Transport};

#[cfg(feature = "transport-websocket")]
pub use transports::{WebSocketConnector, WebSocketTransport};
