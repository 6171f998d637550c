//! Async chat client.
//!
//! [`ChatClient`] is a thin handle that talks to a background session loop
//! over an unbounded MPSC channel. The loop owns the [`Session`] state machine
//! and the [`TransportAdapter`]; it is the only place where either is
//! mutated, so handlers and timers never race. Events are published on a
//! bounded channel returned from [`ChatClient::start`].
//!
//! # Example
//!
//! ```rust,ignore
//! let config = ChatConfig::new("ws://localhost:3000/chat");
//! let (client, mut events) = ChatClient::start(WebSocketConnector::new(), config);
//!
//! client.join_room("alice", "general").await?;
//! client.send_message("hello").await?;
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         ChatEvent::MessageAppended(entry) => println!("{}", entry.message.body),
//!         ChatEvent::Disconnected { .. } => break,
//!         _ => {}
//!     }
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::adapter::{LinkEvent, TransportAdapter, DEFAULT_CONNECT_TIMEOUT};
use crate::error::{ChatError, Result};
use crate::event::ChatEvent;
use crate::protocol::events;
use crate::reconnect::{ExponentialBackoff, ReconnectPolicy};
use crate::room::{RoomOptions, RoomState};
use crate::session::{
    ConnectionState, Identity, Output, ProtocolViolation, Session, SessionConfig, SessionFault,
};
use crate::transport::Connector;
use crate::typing::DEFAULT_TYPING_IDLE;

/// Default capacity of the bounded event channel.
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Default timeout for the graceful shutdown.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

// ── Configuration ───────────────────────────────────────────────────

/// Configuration for a [`ChatClient`].
///
/// The only required field is the endpoint; all others have defaults.
///
/// ```
/// use room_chat_client::client::ChatConfig;
/// use room_chat_client::reconnect::NoReconnect;
/// use std::time::Duration;
///
/// let config = ChatConfig::new("ws://localhost:3000/chat")
///     .with_connect_timeout(Duration::from_secs(2))
///     .with_reconnect_policy(NoReconnect)
///     .with_event_channel_capacity(0);
/// assert_eq!(config.event_channel_capacity, 1);
/// ```
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Server endpoint handed to the [`Connector`].
    pub endpoint: String,
    /// Bound on each connection attempt. Defaults to **5 seconds**.
    pub connect_timeout: Duration,
    /// Idle period before the local typing indicator clears. Defaults to
    /// **1 second**.
    pub typing_idle: Duration,
    /// Capacity of the bounded event channel.
    ///
    /// When the consumer cannot keep up, events are dropped (with a warning
    /// logged) rather than stalling the session loop. The `Disconnected`
    /// event is always delivered regardless of capacity.
    ///
    /// Defaults to **256**. Values below 1 are clamped to 1.
    pub event_channel_capacity: usize,
    /// Time the session loop gets to close the transport after
    /// [`ChatClient::shutdown`] before it is aborted. Defaults to **1 second**.
    pub shutdown_timeout: Duration,
    /// When and how often to reconnect after the link drops. Defaults to
    /// [`ExponentialBackoff`].
    pub reconnect: Arc<dyn ReconnectPolicy>,
    /// Opt-in room semantics.
    pub room_options: RoomOptions,
    /// Send `typing` frames to the server when the local indicator changes.
    pub broadcast_typing: bool,
}

impl ChatConfig {
    /// Create a configuration for `endpoint` with default values.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            typing_idle: DEFAULT_TYPING_IDLE,
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            reconnect: Arc::new(ExponentialBackoff::default()),
            room_options: RoomOptions::default(),
            broadcast_typing: false,
        }
    }

    /// Set the bound on each connection attempt.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the typing idle period.
    #[must_use]
    pub fn with_typing_idle(mut self, idle: Duration) -> Self {
        self.typing_idle = idle;
        self
    }

    /// Set the capacity of the bounded event channel. Values below 1 are
    /// clamped to 1.
    #[must_use]
    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity.max(1);
        self
    }

    /// Set the graceful shutdown timeout. Zero aborts immediately.
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Replace the reconnect policy.
    #[must_use]
    pub fn with_reconnect_policy(mut self, policy: impl ReconnectPolicy) -> Self {
        self.reconnect = Arc::new(policy);
        self
    }

    /// Set the opt-in room semantics.
    #[must_use]
    pub fn with_room_options(mut self, options: RoomOptions) -> Self {
        self.room_options = options;
        self
    }

    /// Enable or disable `typing` frames.
    #[must_use]
    pub fn with_broadcast_typing(mut self, enabled: bool) -> Self {
        self.broadcast_typing = enabled;
        self
    }

    fn session_config(&self) -> SessionConfig {
        SessionConfig {
            typing_idle: self.typing_idle,
            room_options: self.room_options,
            broadcast_typing: self.broadcast_typing,
        }
    }
}

// ── Snapshot ────────────────────────────────────────────────────────

/// Point-in-time copy of the session, returned by [`ChatClient::snapshot`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    /// Session id, also attached to every log line the session emits.
    pub id: Uuid,
    /// Lifecycle state.
    pub state: ConnectionState,
    /// Identity given to `join_room`, if any.
    pub identity: Option<Identity>,
    /// Room log, presence and typing flag.
    pub room: Option<RoomState>,
    /// Why the session closed, if it closed on an error.
    pub fault: Option<SessionFault>,
    /// Every protocol violation recorded so far.
    pub diagnostics: Vec<ProtocolViolation>,
}

impl SessionSnapshot {
    fn capture(session: &Session) -> Self {
        Self {
            id: session.id(),
            state: session.state(),
            identity: session.identity().cloned(),
            room: session.room().cloned(),
            fault: session.fault().cloned(),
            diagnostics: session.diagnostics().to_vec(),
        }
    }
}

// ── Commands ────────────────────────────────────────────────────────

enum Command {
    Join {
        identity: Identity,
        reply: oneshot::Sender<Result<()>>,
    },
    Send {
        text: String,
        reply: oneshot::Sender<Result<()>>,
    },
    Input(String),
    Leave,
    Snapshot(oneshot::Sender<SessionSnapshot>),
}

// ── Client handle ───────────────────────────────────────────────────

/// Async handle for one chat session.
///
/// Created via [`ChatClient::start`]. Once the session has closed, every
/// method that needs the loop returns [`ChatError::SessionClosed`].
pub struct ChatClient {
    cmd_tx: mpsc::UnboundedSender<Command>,
    session_id: Uuid,
    task: Option<tokio::task::JoinHandle<()>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    shutdown_timeout: Duration,
}

impl ChatClient {
    /// Spawn the session loop and return a handle plus the event receiver.
    ///
    /// Nothing connects until [`join_room`](Self::join_room) is called.
    #[must_use = "the event receiver must be used to receive events"]
    pub fn start(
        connector: impl Connector,
        config: ChatConfig,
    ) -> (Self, mpsc::Receiver<ChatEvent>) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<Command>();
        // Clamp capacity to at least 1 (tokio panics on 0).
        let capacity = config.event_channel_capacity.max(1);
        let (event_tx, event_rx) = mpsc::channel::<ChatEvent>(capacity);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let session = Session::new(config.session_config());
        let session_id = session.id();

        let mut adapter = TransportAdapter::new(connector, Arc::clone(&config.reconnect))
            .with_connect_timeout(config.connect_timeout);
        for &name in events::SERVER_EVENTS {
            adapter.subscribe(name, move |session: &mut Session, data: &Value| {
                session.handle_frame(name, data.clone());
            });
        }

        let task = tokio::spawn(session_loop(
            session,
            adapter,
            config.endpoint,
            cmd_rx,
            event_tx,
            shutdown_rx,
        ));

        let client = Self {
            cmd_tx,
            session_id,
            task: Some(task),
            shutdown_tx: Some(shutdown_tx),
            shutdown_timeout: config.shutdown_timeout,
        };

        (client, event_rx)
    }

    /// The session's id.
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Connect and join `room` as `username`.
    ///
    /// Resolves once the connection attempt finished; the room itself is
    /// confirmed later by [`ChatEvent::RoomJoined`].
    ///
    /// # Errors
    ///
    /// - [`ChatError::InvalidIdentity`] if either field is blank
    /// - [`ChatError::AlreadyJoined`] on a second call
    /// - [`ChatError::Connection`] or [`ChatError::ConnectTimeout`] if the
    ///   transport could not be established; the session is closed
    /// - [`ChatError::SessionClosed`] if the session already ended
    pub async fn join_room(&self, username: impl AsRef<str>, room: impl AsRef<str>) -> Result<()> {
        let identity = Identity::new(username, room)?;
        let (reply, rx) = oneshot::channel();
        self.command(Command::Join { identity, reply })?;
        rx.await.map_err(|_| ChatError::SessionClosed)?
    }

    /// Send a chat message to the room.
    ///
    /// # Errors
    ///
    /// - [`ChatError::EmptyMessage`] or [`ChatError::MessageTooLong`] for an
    ///   unacceptable body (nothing is sent)
    /// - [`ChatError::NotJoined`] before the room is joined
    /// - [`ChatError::SessionClosed`] after the session ended
    pub async fn send_message(&self, text: impl Into<String>) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::Send {
            text: text.into(),
            reply,
        })?;
        rx.await.map_err(|_| ChatError::SessionClosed)?
    }

    /// Report the current contents of the input box. Drives the local typing
    /// indicator.
    ///
    /// # Errors
    ///
    /// [`ChatError::SessionClosed`] after the session ended.
    pub fn input_changed(&self, input: impl Into<String>) -> Result<()> {
        self.command(Command::Input(input.into()))
    }

    /// Leave the room and close the connection. Calling it again is a no-op.
    pub fn leave(&self) {
        if self.command(Command::Leave).is_err() {
            debug!(session_id = %self.session_id, "leave after session end ignored");
        }
    }

    /// Copy of the current session state.
    ///
    /// # Errors
    ///
    /// [`ChatError::SessionClosed`] once the session loop has exited.
    pub async fn snapshot(&self) -> Result<SessionSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::Snapshot(reply))?;
        rx.await.map_err(|_| ChatError::SessionClosed)
    }

    /// Shut down the client, closing the transport and stopping the loop.
    ///
    /// The event receiver yields a final `Disconnected` and then `None`.
    pub async fn shutdown(&mut self) {
        debug!(session_id = %self.session_id, "shutdown requested");

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(self.shutdown_timeout, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => {
                    warn!("session loop terminated with join error: {join_err}");
                }
                Err(_) => {
                    warn!("session loop did not exit within timeout; aborting task");
                    task.abort();
                    if let Err(join_err) = task.await {
                        debug!("session loop aborted: {join_err}");
                    }
                }
            }
        }
    }

    fn command(&self, command: Command) -> Result<()> {
        self.cmd_tx
            .send(command)
            .map_err(|_| ChatError::SessionClosed)
    }
}

impl std::fmt::Debug for ChatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatClient")
            .field("session_id", &self.session_id)
            .field("running", &!self.cmd_tx.is_closed())
            .field("has_task", &self.task.is_some())
            .finish()
    }
}

impl Drop for ChatClient {
    fn drop(&mut self) {
        // No executor to drive a graceful close from `Drop`; abort instead.
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ── Session loop ────────────────────────────────────────────────────

/// Background loop multiplexing commands, link events and the typing timer.
///
/// Exits when the session closes (leave, server error, connection failure),
/// on shutdown, or when every client handle is gone.
async fn session_loop(
    mut session: Session,
    mut adapter: TransportAdapter<Session>,
    endpoint: String,
    mut cmd_rx: mpsc::UnboundedReceiver<Command>,
    event_tx: mpsc::Sender<ChatEvent>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    let session_id = session.id();
    debug!(%session_id, "session loop started");

    loop {
        let deadline = session.typing_deadline();

        tokio::select! {
            cmd = cmd_rx.recv() => match cmd {
                Some(Command::Join { identity, reply }) => {
                    let result = join(
                        &mut session,
                        &mut adapter,
                        &endpoint,
                        identity,
                        &mut cmd_rx,
                        &mut shutdown_rx,
                    )
                    .await;
                    let _ = reply.send(result);
                }
                Some(Command::Send { text, reply }) => {
                    let _ = reply.send(session.send_message(&text));
                }
                Some(Command::Input(input)) => session.on_input(&input, Instant::now()),
                Some(Command::Leave) => session.leave(),
                Some(Command::Snapshot(reply)) => {
                    let _ = reply.send(SessionSnapshot::capture(&session));
                }
                None => {
                    debug!(%session_id, "command channel closed, shutting down session loop");
                    session.leave();
                }
            },

            _ = &mut shutdown_rx => {
                debug!(%session_id, "shutdown signal received");
                session.leave();
            }

            link = adapter.recv(), if adapter.is_active() => match link {
                LinkEvent::Frame { event, data } => {
                    adapter.dispatch(&mut session, &event, &data);
                }
                LinkEvent::Disconnected { reason, reconnecting } => {
                    session.on_transport_lost(reason, reconnecting);
                }
                LinkEvent::Reconnected => session.on_connected(),
                LinkEvent::GaveUp { reason } => session.on_connect_failed(reason),
            },

            _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                session.poll_timers(Instant::now());
            }
        }

        flush(&mut session, &mut adapter, &event_tx).await;

        if session.is_closed() {
            break;
        }
    }

    adapter.disconnect().await;
    let fault = session.fault().cloned();
    info!(%session_id, ?fault, "session closed");
    if event_tx.send(ChatEvent::Disconnected { fault }).await.is_err() {
        debug!("event channel closed, receiver dropped");
    }
    debug!(%session_id, "session loop exited");
}

/// Record the identity, connect, and report the outcome to the session.
///
/// The connect races against shutdown and [`Command::Leave`]; either one
/// abandons the attempt and closes the session. Other commands are answered
/// while the attempt is pending.
async fn join(
    session: &mut Session,
    adapter: &mut TransportAdapter<Session>,
    endpoint: &str,
    identity: Identity,
    cmd_rx: &mut mpsc::UnboundedReceiver<Command>,
    shutdown_rx: &mut oneshot::Receiver<()>,
) -> Result<()> {
    session.join_room(identity)?;

    let connect = adapter.connect(endpoint);
    tokio::pin!(connect);
    let outcome = loop {
        tokio::select! {
            result = &mut connect => break Some(result),
            _ = &mut *shutdown_rx => {
                debug!(session_id = %session.id(), "shutdown during connect");
                break None;
            }
            cmd = cmd_rx.recv() => match cmd {
                Some(Command::Leave) | None => break None,
                Some(Command::Join { reply, .. }) => {
                    let _ = reply.send(Err(ChatError::AlreadyJoined));
                }
                Some(Command::Send { text, reply }) => {
                    let _ = reply.send(session.send_message(&text));
                }
                Some(Command::Input(input)) => session.on_input(&input, Instant::now()),
                Some(Command::Snapshot(reply)) => {
                    let _ = reply.send(SessionSnapshot::capture(session));
                }
            },
        }
    };

    match outcome {
        Some(Ok(())) => {
            session.on_connected();
            Ok(())
        }
        Some(Err(e)) => {
            session.on_connect_failed(e.to_string());
            Err(e)
        }
        None => {
            session.leave();
            Err(ChatError::SessionClosed)
        }
    }
}

/// Drain the session's outputs: frames to the adapter, events to the channel.
async fn flush(
    session: &mut Session,
    adapter: &mut TransportAdapter<Session>,
    event_tx: &mpsc::Sender<ChatEvent>,
) {
    let outputs: Vec<Output> = session.drain_outputs().collect();
    for output in outputs {
        match output {
            Output::Send(event) => match event.payload() {
                Ok(payload) => {
                    if !adapter.send(event.name(), &payload).await {
                        debug!(event = event.name(), "frame not delivered");
                    }
                }
                Err(e) => error!(event = event.name(), "failed to serialize payload: {e}"),
            },
            Output::Emit(event) => emit_event(event_tx, event),
        }
    }
}

/// Publish an event. If the channel is full, log a warning and drop the event
/// rather than stall the session loop.
fn emit_event(event_tx: &mpsc::Sender<ChatEvent>, event: ChatEvent) {
    match event_tx.try_send(event) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(dropped)) => {
            warn!(
                "event channel full, dropping event: {:?}",
                std::mem::discriminant(&dropped)
            );
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            debug!("event channel closed, receiver dropped");
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::reconnect::NoReconnect;
    use crate::transport::Transport;
    use async_trait::async_trait;

    /// Connector whose transports never yield anything.
    struct SilentConnector;

    struct SilentTransport;

    #[async_trait]
    impl Transport for SilentTransport {
        async fn send(&mut self, _message: String) -> std::result::Result<(), ChatError> {
            Ok(())
        }

        async fn recv(&mut self) -> Option<std::result::Result<String, ChatError>> {
            std::future::pending().await
        }

        async fn close(&mut self) -> std::result::Result<(), ChatError> {
            Ok(())
        }
    }

    #[async_trait]
    impl Connector for SilentConnector {
        async fn connect(
            &mut self,
            _endpoint: &str,
        ) -> std::result::Result<Box<dyn crate::transport::Transport>, ChatError> {
            Ok(Box::new(SilentTransport))
        }
    }

    #[test]
    fn config_defaults() {
        let config = ChatConfig::new("ws://chat");
        assert_eq!(config.endpoint, "ws://chat");
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert_eq!(config.typing_idle, Duration::from_secs(1));
        assert_eq!(config.event_channel_capacity, 256);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(1));
        assert!(!config.broadcast_typing);
        assert_eq!(config.room_options, RoomOptions::default());
    }

    #[test]
    fn event_channel_capacity_is_clamped_to_one() {
        let config = ChatConfig::new("ws://chat").with_event_channel_capacity(0);
        assert_eq!(config.event_channel_capacity, 1);
    }

    #[tokio::test]
    async fn snapshot_before_join_is_idle() {
        let (client, _events) = ChatClient::start(SilentConnector, ChatConfig::new("ws://chat"));
        let snapshot = client.snapshot().await.unwrap();
        assert_eq!(snapshot.state, ConnectionState::Idle);
        assert_eq!(snapshot.id, client.session_id());
        assert!(snapshot.room.is_none());
    }

    #[tokio::test]
    async fn connected_is_first_event() {
        let config = ChatConfig::new("ws://chat").with_reconnect_policy(NoReconnect);
        let (client, mut events) = ChatClient::start(SilentConnector, config);
        client.join_room("alice", "general").await.unwrap();
        assert_eq!(events.recv().await, Some(ChatEvent::Connected));
    }

    #[tokio::test]
    async fn double_shutdown_does_not_panic() {
        let (mut client, mut events) =
            ChatClient::start(SilentConnector, ChatConfig::new("ws://chat"));
        client.shutdown().await;
        client.shutdown().await;
        assert_eq!(
            events.recv().await,
            Some(ChatEvent::Disconnected { fault: None })
        );
        assert!(events.recv().await.is_none());
    }

    #[tokio::test]
    async fn commands_after_shutdown_report_closed() {
        let (mut client, _events) =
            ChatClient::start(SilentConnector, ChatConfig::new("ws://chat"));
        client.shutdown().await;
        assert!(matches!(
            client.send_message("hi").await,
            Err(ChatError::SessionClosed)
        ));
        assert!(matches!(
            client.join_room("alice", "general").await,
            Err(ChatError::SessionClosed)
        ));
        client.leave();
    }

    #[tokio::test]
    async fn debug_impl_for_client() {
        let (client, _events) = ChatClient::start(SilentConnector, ChatConfig::new("ws://chat"));
        let debug = format!("{client:?}");
        assert!(debug.contains("ChatClient"));
        assert!(debug.contains("session_id"));
    }
}
