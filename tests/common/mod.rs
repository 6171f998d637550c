#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing,
    dead_code
)]
//! Shared test utilities for room chat integration tests.
//!
//! [`mock_connector`] returns a [`MockConnector`] plus a receiver of
//! [`ServerLink`]s: every successful connect hands the test the server side of
//! a fresh in-memory connection, so a test can play the room service.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use room_chat_client::protocol::{
    ChatMessage, ErrorPayload, PresencePayload, RoomJoinedPayload, ServerEvent,
};
use room_chat_client::{ChatError, ChatEvent, Connector, Transport};
use serde_json::Value;
use tokio::sync::mpsc;

pub const T0: &str = "2025-01-01T10:00:00";

type Incoming = Option<Result<String, ChatError>>;

// ── Transport ───────────────────────────────────────────────────────

/// Client half of an in-memory connection.
pub struct ChannelTransport {
    incoming: mpsc::UnboundedReceiver<Incoming>,
    outgoing: mpsc::UnboundedSender<String>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn send(&mut self, message: String) -> Result<(), ChatError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ChatError::TransportClosed);
        }
        self.outgoing
            .send(message)
            .map_err(|e| ChatError::TransportSend(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, ChatError>> {
        // A dropped server side reads as a clean close.
        self.incoming.recv().await.flatten()
    }

    async fn close(&mut self) -> Result<(), ChatError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

/// Server half of an in-memory connection.
pub struct ServerLink {
    to_client: mpsc::UnboundedSender<Incoming>,
    from_client: mpsc::UnboundedReceiver<String>,
    closed: Arc<AtomicBool>,
}

impl ServerLink {
    /// Deliver one server event.
    pub fn push(&self, event: &ServerEvent) {
        self.push_raw(serde_json::to_string(event).unwrap());
    }

    /// Deliver an arbitrary text frame.
    pub fn push_raw(&self, text: impl Into<String>) {
        let _ = self.to_client.send(Some(Ok(text.into())));
    }

    /// Close the connection from the server side.
    pub fn hang_up(&self) {
        let _ = self.to_client.send(None);
    }

    /// Next frame the client sent, decoded as JSON.
    pub async fn next_frame(&mut self) -> Value {
        let text = tokio::time::timeout(Duration::from_secs(5), self.from_client.recv())
            .await
            .expect("timed out waiting for a client frame")
            .expect("client side dropped");
        serde_json::from_str(&text).unwrap()
    }

    /// Every frame the client sent so far, without waiting.
    pub fn drain_frames(&mut self) -> Vec<Value> {
        let mut frames = Vec::new();
        while let Ok(text) = self.from_client.try_recv() {
            frames.push(serde_json::from_str(&text).unwrap());
        }
        frames
    }

    /// Whether the client closed this connection.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

// ── Connector ───────────────────────────────────────────────────────

/// Connector handing out [`ChannelTransport`]s.
pub struct MockConnector {
    links: mpsc::UnboundedSender<ServerLink>,
    /// Number of upcoming connects to refuse.
    pub refuse: Arc<AtomicUsize>,
    /// Total connect calls.
    pub attempts: Arc<AtomicUsize>,
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&mut self, endpoint: &str) -> Result<Box<dyn Transport>, ChatError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let refused = self
            .refuse
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(ChatError::Connection(format!("{endpoint}: refused")));
        }

        let (to_client, incoming) = mpsc::unbounded_channel();
        let (outgoing, from_client) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));
        let _ = self.links.send(ServerLink {
            to_client,
            from_client,
            closed: Arc::clone(&closed),
        });
        Ok(Box::new(ChannelTransport {
            incoming,
            outgoing,
            closed,
        }))
    }
}

/// A connector plus the stream of server-side links it opens.
pub fn mock_connector() -> (MockConnector, mpsc::UnboundedReceiver<ServerLink>) {
    let (links, rx) = mpsc::unbounded_channel();
    let connector = MockConnector {
        links,
        refuse: Arc::new(AtomicUsize::new(0)),
        attempts: Arc::new(AtomicUsize::new(0)),
    };
    (connector, rx)
}

/// Connector that never completes a connection.
pub struct HangingConnector;

#[async_trait]
impl Connector for HangingConnector {
    async fn connect(&mut self, _endpoint: &str) -> Result<Box<dyn Transport>, ChatError> {
        std::future::pending().await
    }
}

// ── Builders ────────────────────────────────────────────────────────

pub fn message(id: &str, author: &str, body: &str) -> ChatMessage {
    ChatMessage::new(id, author, body, T0)
}

pub fn room_joined(room: &str, messages: Vec<ChatMessage>) -> ServerEvent {
    ServerEvent::RoomJoined(RoomJoinedPayload {
        room: room.to_string(),
        username: None,
        messages,
    })
}

pub fn user_joined(username: &str) -> ServerEvent {
    ServerEvent::UserJoined(PresencePayload {
        username: username.to_string(),
        message: None,
    })
}

pub fn user_left(username: &str) -> ServerEvent {
    ServerEvent::UserLeft(PresencePayload {
        username: username.to_string(),
        message: None,
    })
}

pub fn server_error(message: &str) -> ServerEvent {
    ServerEvent::Error(ErrorPayload {
        message: message.to_string(),
    })
}

// ── Event helpers ───────────────────────────────────────────────────

/// Next event from the client, failing the test after five seconds.
pub async fn next_event(events: &mut mpsc::Receiver<ChatEvent>) -> ChatEvent {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("event channel closed")
}

/// Skip events until one matches `pred`.
pub async fn wait_for<F>(events: &mut mpsc::Receiver<ChatEvent>, mut pred: F) -> ChatEvent
where
    F: FnMut(&ChatEvent) -> bool,
{
    loop {
        let event = next_event(events).await;
        if pred(&event) {
            return event;
        }
    }
}
