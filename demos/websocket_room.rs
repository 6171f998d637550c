//! # WebSocket Room Example
//!
//! Joins a room on a live server and relays lines from stdin as messages.
//!
//! ## Running
//!
//! ```sh
//! CHAT_URL=ws://localhost:3000/chat CHAT_USER=alice CHAT_ROOM=general \
//!     cargo run --example websocket_room
//! ```

use room_chat_client::{ChatClient, ChatConfig, ChatEvent, ExponentialBackoff, WebSocketConnector};
use tokio::io::{AsyncBufReadExt, BufReader};

const DEFAULT_URL: &str = "ws://localhost:3000/chat";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let url = std::env::var("CHAT_URL").unwrap_or_else(|_| DEFAULT_URL.to_string());
    let user = std::env::var("CHAT_USER").unwrap_or_else(|_| "rustacean".to_string());
    let room = std::env::var("CHAT_ROOM").unwrap_or_else(|_| "general".to_string());

    let config = ChatConfig::new(url)
        .with_reconnect_policy(ExponentialBackoff::default().with_max_attempts(10));
    let (mut client, mut events) = ChatClient::start(WebSocketConnector::new(), config);
    client.join_room(&user, &room).await?;

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                match event {
                    ChatEvent::RoomJoined { room, entries, presence } => {
                        tracing::info!("joined {room} ({presence} present)");
                        for entry in entries {
                            println!("{}: {}", entry.message.author, entry.message.body);
                        }
                    }
                    ChatEvent::MessageAppended(entry) => {
                        println!("{}: {}", entry.message.author, entry.message.body);
                    }
                    ChatEvent::UserJoined { notice, presence, .. }
                    | ChatEvent::UserLeft { notice, presence, .. } => {
                        println!("* {} ({presence} present)", notice.message.body);
                    }
                    ChatEvent::ServerError { message } => tracing::error!("server: {message}"),
                    ChatEvent::Reconnecting { reason } => tracing::warn!("reconnecting: {reason}"),
                    ChatEvent::Disconnected { fault } => {
                        tracing::info!("disconnected: {fault:?}");
                        break;
                    }
                    _ => {}
                }
            }

            line = stdin.next_line() => {
                match line? {
                    Some(line) => {
                        if let Err(e) = client.send_message(line).await {
                            tracing::warn!("not sent: {e}");
                        }
                    }
                    None => client.leave(),
                }
            }

            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Ctrl+C received, leaving");
                client.shutdown().await;
                break;
            }
        }
    }

    Ok(())
}
