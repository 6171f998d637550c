//! # Loopback Room Example
//!
//! Runs a complete session against an in-process stand-in for the room
//! service, so no server is needed:
//!
//! 1. A [`Connector`] hands out channel-backed transports
//! 2. A spawned task plays the server (join ack, echo of sent messages)
//! 3. The client joins, types, sends, and leaves
//!
//! ## Running
//!
//! ```sh
//! RUST_LOG=debug cargo run --example loopback_room
//! ```

use async_trait::async_trait;
use room_chat_client::protocol::{
    events, ChatMessage, Envelope, PresencePayload, RoomJoinedPayload, ServerEvent,
};
use room_chat_client::{ChatClient, ChatConfig, ChatError, ChatEvent, Connector, Transport};
use tokio::sync::mpsc;

/// Client half of the loopback link.
struct LoopbackTransport {
    to_server: mpsc::UnboundedSender<String>,
    from_server: mpsc::UnboundedReceiver<String>,
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn send(&mut self, message: String) -> Result<(), ChatError> {
        self.to_server
            .send(message)
            .map_err(|e| ChatError::TransportSend(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, ChatError>> {
        self.from_server.recv().await.map(Ok)
    }

    async fn close(&mut self) -> Result<(), ChatError> {
        Ok(())
    }
}

struct LoopbackConnector;

#[async_trait]
impl Connector for LoopbackConnector {
    async fn connect(&mut self, endpoint: &str) -> Result<Box<dyn Transport>, ChatError> {
        tracing::info!("loopback server listening on {endpoint}");
        let (to_server, inbox) = mpsc::unbounded_channel();
        let (outbox, from_server) = mpsc::unbounded_channel();
        tokio::spawn(serve(inbox, outbox));
        Ok(Box::new(LoopbackTransport {
            to_server,
            from_server,
        }))
    }
}

/// A tiny room service: acknowledges the join and broadcasts every message.
async fn serve(mut inbox: mpsc::UnboundedReceiver<String>, outbox: mpsc::UnboundedSender<String>) {
    let mut room = String::new();
    let mut username = String::new();
    let reply = |event: &ServerEvent| match serde_json::to_string(event) {
        Ok(frame) => {
            let _ = outbox.send(frame);
        }
        Err(e) => tracing::error!("loopback server could not encode frame: {e}"),
    };

    while let Some(frame) = inbox.recv().await {
        let Ok(envelope) = serde_json::from_str::<Envelope>(&frame) else {
            continue;
        };
        let data = &envelope.data;
        match envelope.event.as_str() {
            events::JOIN_ROOM => {
                room = data["room"].as_str().unwrap_or_default().to_string();
                username = data["username"].as_str().unwrap_or_default().to_string();
                let history = ChatMessage {
                    room: Some(room.clone()),
                    ..ChatMessage::new(
                        uuid::Uuid::new_v4().to_string(),
                        "bob",
                        "you made it!",
                        chrono::Utc::now().to_rfc3339(),
                    )
                };
                reply(&ServerEvent::RoomJoined(RoomJoinedPayload {
                    room: room.clone(),
                    username: Some(username.clone()),
                    messages: vec![history],
                }));
                reply(&ServerEvent::UserJoined(PresencePayload {
                    username: "carol".into(),
                    message: None,
                }));
            }
            events::SEND_MESSAGE => {
                let text = data["message"].as_str().unwrap_or_default();
                reply(&ServerEvent::NewMessage(ChatMessage {
                    room: Some(room.clone()),
                    ..ChatMessage::new(
                        uuid::Uuid::new_v4().to_string(),
                        username.clone(),
                        text,
                        chrono::Utc::now().to_rfc3339(),
                    )
                }));
            }
            other => tracing::debug!("loopback server ignoring {other}"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let (client, mut events) = ChatClient::start(LoopbackConnector, ChatConfig::new("loopback://chat"));
    client.join_room("alice", "general").await?;

    while let Some(event) = events.recv().await {
        match event {
            ChatEvent::RoomJoined { room, entries, .. } => {
                tracing::info!("joined {room}");
                for entry in &entries {
                    tracing::info!("  [{}] {}: {}", entry.key, entry.message.author, entry.message.body);
                }
                client.input_changed("hel")?;
                client.send_message("hello from the loopback demo").await?;
            }
            ChatEvent::MessageAppended(entry) => {
                tracing::info!("{}: {}", entry.message.author, entry.message.body);
                client.leave();
            }
            ChatEvent::UserJoined { notice, presence, .. } => {
                tracing::info!("{} ({presence} present)", notice.message.body);
            }
            ChatEvent::TypingChanged(typing) => tracing::info!("typing: {typing}"),
            ChatEvent::Disconnected { fault } => {
                tracing::info!("session closed, fault: {fault:?}");
                break;
            }
            other => tracing::debug!("{other:?}"),
        }
    }

    Ok(())
}
