//! Transport adapter: one logical connection plus named-event dispatch.
//!
//! [`TransportAdapter`] owns at most one [`Transport`] at a time. It frames
//! outbound payloads as `{"event", "data"}` envelopes, decodes inbound frames,
//! and hides reconnection behind [`recv`](TransportAdapter::recv): when the
//! link drops it reports [`LinkEvent::Disconnected`] once, then keeps opening
//! new transports on the schedule of its [`ReconnectPolicy`] until one sticks
//! ([`LinkEvent::Reconnected`]) or the policy gives up ([`LinkEvent::GaveUp`]).
//!
//! The adapter never interprets payloads. Handlers registered with
//! [`subscribe`](TransportAdapter::subscribe) receive the raw JSON `data`
//! together with a caller-supplied context, so a driver can route frames into
//! state it owns without shared mutability.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::error::{ChatError, Result};
use crate::protocol::{Envelope, OutgoingEnvelope};
use crate::reconnect::ReconnectPolicy;
use crate::transport::{Connector, Transport};

/// Default bound on establishing a connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

// ── Handler registry ────────────────────────────────────────────────

/// How [`HandlerRegistry::subscribe`] treats an event that already has handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispatchMode {
    /// Keep every handler and run them in registration order.
    #[default]
    Ordered,
    /// A new subscription replaces the previous handler for that event.
    ReplaceOnSubscribe,
}

/// A frame handler. Receives the driver's context and the raw payload.
pub type Handler<C> = Box<dyn FnMut(&mut C, &Value) + Send>;

/// Event-name → handlers table.
pub struct HandlerRegistry<C> {
    mode: DispatchMode,
    handlers: HashMap<String, Vec<Handler<C>>>,
}

impl<C> HandlerRegistry<C> {
    /// Create an empty registry.
    pub fn new(mode: DispatchMode) -> Self {
        Self {
            mode,
            handlers: HashMap::new(),
        }
    }

    /// Register `handler` for `event`.
    pub fn subscribe<F>(&mut self, event: impl Into<String>, handler: F)
    where
        F: FnMut(&mut C, &Value) + Send + 'static,
    {
        let slot = self.handlers.entry(event.into()).or_default();
        if self.mode == DispatchMode::ReplaceOnSubscribe {
            slot.clear();
        }
        slot.push(Box::new(handler));
    }

    /// Run every handler for `event`. Returns how many ran.
    pub fn dispatch(&mut self, ctx: &mut C, event: &str, data: &Value) -> usize {
        let Some(handlers) = self.handlers.get_mut(event) else {
            return 0;
        };
        for handler in handlers.iter_mut() {
            handler(ctx, data);
        }
        handlers.len()
    }

    /// Number of handlers registered for `event`.
    pub fn handler_count(&self, event: &str) -> usize {
        self.handlers.get(event).map_or(0, Vec::len)
    }

    /// Returns `true` if no handler is registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.values().all(Vec::is_empty)
    }

    /// Drop every registration.
    pub fn clear(&mut self) {
        self.handlers.clear();
    }
}

impl<C> fmt::Debug for HandlerRegistry<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut events: Vec<_> = self.handlers.keys().collect();
        events.sort();
        f.debug_struct("HandlerRegistry")
            .field("mode", &self.mode)
            .field("events", &events)
            .finish()
    }
}

// ── Link ────────────────────────────────────────────────────────────

/// Something that happened on the link, as reported by [`TransportAdapter::recv`].
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    /// One decoded inbound frame.
    Frame {
        /// Event name.
        event: String,
        /// Raw payload.
        data: Value,
    },
    /// The live connection dropped. With `reconnecting` the adapter will try
    /// again; otherwise the link is closed for good.
    Disconnected { reason: String, reconnecting: bool },
    /// A reconnection attempt succeeded.
    Reconnected,
    /// The reconnect policy gave up.
    GaveUp { reason: String },
}

enum Link {
    Idle,
    Open(Box<dyn Transport>),
    Reconnecting { attempt: u32, resume_at: Instant },
    Closed,
}

impl Link {
    fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Open(_) => "open",
            Self::Reconnecting { .. } => "reconnecting",
            Self::Closed => "closed",
        }
    }
}

// ── Adapter ─────────────────────────────────────────────────────────

/// Owns one logical connection and routes its frames to handlers.
///
/// `C` is the context type handlers receive in [`dispatch`](Self::dispatch).
pub struct TransportAdapter<C> {
    connector: Box<dyn Connector>,
    policy: Arc<dyn ReconnectPolicy>,
    connect_timeout: Duration,
    endpoint: Option<String>,
    link: Link,
    pending: Option<LinkEvent>,
    handlers: HandlerRegistry<C>,
}

impl<C> TransportAdapter<C> {
    /// Create a disconnected adapter.
    pub fn new(connector: impl Connector, policy: Arc<dyn ReconnectPolicy>) -> Self {
        Self {
            connector: Box::new(connector),
            policy,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            endpoint: None,
            link: Link::Idle,
            pending: None,
            handlers: HandlerRegistry::new(DispatchMode::default()),
        }
    }

    /// Set the bound applied to every connection attempt.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the dispatch mode. Existing registrations are dropped.
    #[must_use]
    pub fn with_dispatch_mode(mut self, mode: DispatchMode) -> Self {
        self.handlers = HandlerRegistry::new(mode);
        self
    }

    /// Returns `true` while a transport is open.
    pub fn is_open(&self) -> bool {
        matches!(self.link, Link::Open(_))
    }

    /// Returns `true` while [`recv`](Self::recv) can yield anything.
    pub fn is_active(&self) -> bool {
        self.pending.is_some() || matches!(self.link, Link::Open(_) | Link::Reconnecting { .. })
    }

    /// Establish the connection.
    ///
    /// # Errors
    ///
    /// - [`ChatError::ConnectTimeout`] if no connection within the timeout
    /// - [`ChatError::Connection`] if the connector failed
    /// - [`ChatError::AlreadyConnected`] if called a second time
    /// - [`ChatError::TransportClosed`] after [`disconnect`](Self::disconnect)
    ///   or a failed attempt
    pub async fn connect(&mut self, endpoint: &str) -> Result<()> {
        match self.link {
            Link::Idle => {}
            Link::Closed => return Err(ChatError::TransportClosed),
            Link::Open(_) | Link::Reconnecting { .. } => return Err(ChatError::AlreadyConnected),
        }
        debug!(endpoint, timeout = ?self.connect_timeout, "connecting");
        match open(self.connector.as_mut(), endpoint, self.connect_timeout).await {
            Ok(transport) => {
                info!(endpoint, "connected");
                self.endpoint = Some(endpoint.to_string());
                self.link = Link::Open(transport);
                Ok(())
            }
            Err(e) => {
                warn!(endpoint, error = %e, "connect failed");
                self.link = Link::Closed;
                Err(e)
            }
        }
    }

    /// Best-effort send of one event.
    ///
    /// Returns `false` if there is no open connection or the write failed. A
    /// failed write drops the link; the next [`recv`](Self::recv) reports it.
    pub async fn send(&mut self, event: &str, data: &Value) -> bool {
        let Link::Open(transport) = &mut self.link else {
            debug!(event, link = self.link.name(), "no open connection, frame dropped");
            return false;
        };
        let frame = match serde_json::to_string(&OutgoingEnvelope { event, data }) {
            Ok(frame) => frame,
            Err(e) => {
                error!(event, "failed to serialize frame: {e}");
                return false;
            }
        };
        let outcome = transport.send(frame).await;
        match outcome {
            Ok(()) => true,
            Err(e) => {
                warn!(event, "transport send error: {e}");
                if let Err(close_err) = transport.close().await {
                    debug!("close after send error failed: {close_err}");
                }
                let lost = self.lose(format!("transport send error: {e}"));
                self.pending = Some(lost);
                false
            }
        }
    }

    /// Register a handler. See [`HandlerRegistry::subscribe`].
    pub fn subscribe<F>(&mut self, event: impl Into<String>, handler: F)
    where
        F: FnMut(&mut C, &Value) + Send + 'static,
    {
        self.handlers.subscribe(event, handler);
    }

    /// Run the handlers for one frame. Returns how many ran.
    pub fn dispatch(&mut self, ctx: &mut C, event: &str, data: &Value) -> usize {
        let ran = self.handlers.dispatch(ctx, event, data);
        if ran == 0 {
            debug!(event, "no handler for event");
        }
        ran
    }

    /// Registered handlers.
    pub fn handlers(&self) -> &HandlerRegistry<C> {
        &self.handlers
    }

    /// Wait for the next link event.
    ///
    /// Never resolves while the adapter is idle or closed; check
    /// [`is_active`](Self::is_active) first.
    ///
    /// # Cancel Safety
    ///
    /// Cancel-safe. A cancelled reconnection attempt is retried on the next
    /// call without counting against the policy.
    pub async fn recv(&mut self) -> LinkEvent {
        if let Some(event) = self.pending.take() {
            return event;
        }
        loop {
            match &mut self.link {
                Link::Idle | Link::Closed => return std::future::pending().await,
                Link::Open(transport) => {
                    let incoming = transport.recv().await;
                    match incoming {
                        Some(Ok(text)) => match serde_json::from_str::<Envelope>(&text) {
                            Ok(envelope) => {
                                return LinkEvent::Frame {
                                    event: envelope.event,
                                    data: envelope.data,
                                };
                            }
                            Err(e) => warn!("failed to decode frame: {e}; raw: {text}"),
                        },
                        Some(Err(e)) => {
                            error!("transport receive error: {e}");
                            return self.lose(format!("transport receive error: {e}"));
                        }
                        None => {
                            debug!("transport closed by server");
                            return self.lose("connection closed by server".to_string());
                        }
                    }
                }
                Link::Reconnecting { attempt, resume_at } => {
                    let (attempt, resume_at) = (*attempt, *resume_at);
                    tokio::time::sleep_until(resume_at).await;
                    let endpoint = self.endpoint.clone().unwrap_or_default();
                    debug!(attempt, endpoint, "reconnecting");
                    match open(self.connector.as_mut(), &endpoint, self.connect_timeout).await {
                        Ok(transport) => {
                            info!(attempt, endpoint, "reconnected");
                            self.link = Link::Open(transport);
                            return LinkEvent::Reconnected;
                        }
                        Err(e) => {
                            let next = attempt.saturating_add(1);
                            match self.resume_at(next) {
                                Some(resume_at) => {
                                    debug!(attempt, "reconnect failed: {e}");
                                    self.link = Link::Reconnecting {
                                        attempt: next,
                                        resume_at,
                                    };
                                }
                                None => {
                                    warn!(attempt, "giving up reconnecting: {e}");
                                    self.link = Link::Closed;
                                    return LinkEvent::GaveUp {
                                        reason: e.to_string(),
                                    };
                                }
                            }
                        }
                    }
                }
            }
        }
    }

    /// Close the connection and clear every handler. Safe to call repeatedly.
    pub async fn disconnect(&mut self) {
        self.handlers.clear();
        self.pending = None;
        if let Link::Open(mut transport) = std::mem::replace(&mut self.link, Link::Closed) {
            if let Err(e) = transport.close().await {
                debug!("transport close failed: {e}");
            }
            debug!("transport disconnected");
        }
    }

    fn lose(&mut self, reason: String) -> LinkEvent {
        match self.resume_at(1) {
            Some(resume_at) => {
                self.link = Link::Reconnecting {
                    attempt: 1,
                    resume_at,
                };
                LinkEvent::Disconnected {
                    reason,
                    reconnecting: true,
                }
            }
            None => {
                self.link = Link::Closed;
                LinkEvent::Disconnected {
                    reason,
                    reconnecting: false,
                }
            }
        }
    }

    /// When to make reconnection `attempt`. A delay too large to represent
    /// as an [`Instant`] counts as the policy giving up.
    fn resume_at(&self, attempt: u32) -> Option<Instant> {
        let delay = self.policy.next_delay(attempt)?;
        let resume_at = Instant::now().checked_add(delay);
        if resume_at.is_none() {
            warn!(attempt, ?delay, "reconnect delay out of range");
        }
        resume_at
    }
}

impl<C> fmt::Debug for TransportAdapter<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportAdapter")
            .field("endpoint", &self.endpoint)
            .field("link", &self.link.name())
            .field("policy", &self.policy)
            .field("connect_timeout", &self.connect_timeout)
            .field("handlers", &self.handlers)
            .finish()
    }
}

/// Open one transport within `timeout`, folding connector errors into
/// [`ChatError::Connection`].
async fn open(
    connector: &mut dyn Connector,
    endpoint: &str,
    timeout: Duration,
) -> Result<Box<dyn Transport>> {
    match tokio::time::timeout(timeout, connector.connect(endpoint)).await {
        Err(_) => Err(ChatError::ConnectTimeout(timeout)),
        Ok(Ok(transport)) => Ok(transport),
        Ok(Err(e @ (ChatError::Connection(_) | ChatError::ConnectTimeout(_)))) => Err(e),
        Ok(Err(e)) => Err(ChatError::Connection(e.to_string())),
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
    use crate::reconnect::{FixedSchedule, NoReconnect};
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    // ── Mocks ───────────────────────────────────────────────────────

    type Script = Vec<Option<std::result::Result<String, ChatError>>>;

    struct ScriptedTransport {
        incoming: VecDeque<Option<std::result::Result<String, ChatError>>>,
        sent: Arc<StdMutex<Vec<String>>>,
        fail_sends: bool,
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(&mut self, message: String) -> std::result::Result<(), ChatError> {
            if self.fail_sends {
                return Err(ChatError::TransportSend("broken pipe".into()));
            }
            self.sent.lock().unwrap().push(message);
            Ok(())
        }

        async fn recv(&mut self) -> Option<std::result::Result<String, ChatError>> {
            match self.incoming.pop_front() {
                Some(item) => item,
                None => std::future::pending().await,
            }
        }

        async fn close(&mut self) -> std::result::Result<(), ChatError> {
            Ok(())
        }
    }

    /// Hands out one scripted transport per connect; `None` entries fail.
    struct ScriptedConnector {
        scripts: VecDeque<Option<Script>>,
        sent: Arc<StdMutex<Vec<String>>>,
        attempts: Arc<AtomicUsize>,
        fail_sends: bool,
    }

    impl ScriptedConnector {
        fn new(scripts: Vec<Option<Script>>) -> Self {
            Self {
                scripts: scripts.into(),
                sent: Arc::new(StdMutex::new(Vec::new())),
                attempts: Arc::new(AtomicUsize::new(0)),
                fail_sends: false,
            }
        }
    }

    #[async_trait]
    impl Connector for ScriptedConnector {
        async fn connect(
            &mut self,
            _endpoint: &str,
        ) -> std::result::Result<Box<dyn Transport>, ChatError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            match self.scripts.pop_front() {
                Some(Some(script)) => Ok(Box::new(ScriptedTransport {
                    incoming: script.into(),
                    sent: Arc::clone(&self.sent),
                    fail_sends: self.fail_sends,
                })),
                _ => Err(ChatError::Io(std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    "refused",
                ))),
            }
        }
    }

    struct HangingConnector;

    #[async_trait]
    impl Connector for HangingConnector {
        async fn connect(
            &mut self,
            _endpoint: &str,
        ) -> std::result::Result<Box<dyn Transport>, ChatError> {
            std::future::pending().await
        }
    }

    fn frame(event: &str, data: Value) -> Option<std::result::Result<String, ChatError>> {
        Some(Ok(json!({"event": event, "data": data}).to_string()))
    }

    fn schedule(ms: &[u64]) -> Arc<dyn ReconnectPolicy> {
        Arc::new(FixedSchedule::new(
            ms.iter().map(|m| Duration::from_millis(*m)).collect::<Vec<_>>(),
        ))
    }

    // ── Registry ────────────────────────────────────────────────────

    #[test]
    fn ordered_mode_runs_every_handler_in_order() {
        let mut registry: HandlerRegistry<Vec<&'static str>> =
            HandlerRegistry::new(DispatchMode::Ordered);
        registry.subscribe("new_message", |log: &mut Vec<&'static str>, _: &Value| {
            log.push("first");
        });
        registry.subscribe("new_message", |log: &mut Vec<&'static str>, _: &Value| {
            log.push("second");
        });

        let mut log = Vec::new();
        assert_eq!(registry.dispatch(&mut log, "new_message", &Value::Null), 2);
        assert_eq!(log, vec!["first", "second"]);
    }

    #[test]
    fn replace_mode_keeps_only_latest_handler() {
        let mut registry: HandlerRegistry<Vec<&'static str>> =
            HandlerRegistry::new(DispatchMode::ReplaceOnSubscribe);
        registry.subscribe("user_left", |log: &mut Vec<&'static str>, _: &Value| {
            log.push("old");
        });
        registry.subscribe("user_left", |log: &mut Vec<&'static str>, _: &Value| {
            log.push("new");
        });

        let mut log = Vec::new();
        assert_eq!(registry.dispatch(&mut log, "user_left", &Value::Null), 1);
        assert_eq!(log, vec!["new"]);
        assert_eq!(registry.handler_count("user_left"), 1);
    }

    #[test]
    fn dispatch_without_handler_is_noop() {
        let mut registry: HandlerRegistry<u32> = HandlerRegistry::new(DispatchMode::Ordered);
        let mut ctx = 0;
        assert_eq!(registry.dispatch(&mut ctx, "error", &json!({})), 0);
        assert!(registry.is_empty());
    }

    // ── Connect ─────────────────────────────────────────────────────

    #[tokio::test]
    async fn second_connect_is_rejected() {
        let connector = ScriptedConnector::new(vec![Some(vec![]), Some(vec![])]);
        let mut adapter: TransportAdapter<()> =
            TransportAdapter::new(connector, Arc::new(NoReconnect));
        adapter.connect("ws://room").await.unwrap();
        assert!(matches!(
            adapter.connect("ws://room").await,
            Err(ChatError::AlreadyConnected)
        ));
    }

    #[tokio::test]
    async fn connector_error_becomes_connection_error() {
        let connector = ScriptedConnector::new(vec![None]);
        let mut adapter: TransportAdapter<()> =
            TransportAdapter::new(connector, Arc::new(NoReconnect));
        let err = adapter.connect("ws://room").await.unwrap_err();
        assert!(matches!(err, ChatError::Connection(_)));
        assert!(matches!(
            adapter.connect("ws://room").await,
            Err(ChatError::TransportClosed)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn connect_times_out() {
        let mut adapter: TransportAdapter<()> =
            TransportAdapter::new(HangingConnector, Arc::new(NoReconnect));
        let err = adapter.connect("ws://room").await.unwrap_err();
        assert!(matches!(err, ChatError::ConnectTimeout(d) if d == DEFAULT_CONNECT_TIMEOUT));
    }

    // ── Send / recv ─────────────────────────────────────────────────

    #[tokio::test]
    async fn send_without_connection_is_silent() {
        let connector = ScriptedConnector::new(vec![]);
        let mut adapter: TransportAdapter<()> =
            TransportAdapter::new(connector, Arc::new(NoReconnect));
        assert!(!adapter.send("send_message", &json!({"message": "hi"})).await);
    }

    #[tokio::test]
    async fn send_writes_envelope() {
        let connector = ScriptedConnector::new(vec![Some(vec![])]);
        let sent = Arc::clone(&connector.sent);
        let mut adapter: TransportAdapter<()> =
            TransportAdapter::new(connector, Arc::new(NoReconnect));
        adapter.connect("ws://room").await.unwrap();

        assert!(adapter.send("send_message", &json!({"message": "hi"})).await);
        let frames = sent.lock().unwrap();
        let value: Value = serde_json::from_str(&frames[0]).unwrap();
        assert_eq!(value, json!({"event": "send_message", "data": {"message": "hi"}}));
    }

    #[tokio::test]
    async fn recv_skips_undecodable_frames() {
        let connector = ScriptedConnector::new(vec![Some(vec![
            Some(Ok("not json".into())),
            frame("user_joined", json!({"username": "bob"})),
        ])]);
        let mut adapter: TransportAdapter<()> =
            TransportAdapter::new(connector, Arc::new(NoReconnect));
        adapter.connect("ws://room").await.unwrap();

        let event = adapter.recv().await;
        assert_eq!(
            event,
            LinkEvent::Frame {
                event: "user_joined".into(),
                data: json!({"username": "bob"}),
            }
        );
    }

    #[tokio::test]
    async fn dispatch_routes_into_context() {
        let connector = ScriptedConnector::new(vec![]);
        let mut adapter: TransportAdapter<Vec<String>> =
            TransportAdapter::new(connector, Arc::new(NoReconnect));
        adapter.subscribe("user_joined", |names: &mut Vec<String>, data: &Value| {
            names.push(data["username"].as_str().unwrap_or_default().to_string());
        });

        let mut names = Vec::new();
        adapter.dispatch(&mut names, "user_joined", &json!({"username": "bob"}));
        adapter.dispatch(&mut names, "user_left", &json!({"username": "bob"}));
        assert_eq!(names, vec!["bob".to_string()]);
    }

    // ── Loss & reconnection ─────────────────────────────────────────

    #[tokio::test]
    async fn close_without_policy_is_final() {
        let connector = ScriptedConnector::new(vec![Some(vec![None])]);
        let mut adapter: TransportAdapter<()> =
            TransportAdapter::new(connector, Arc::new(NoReconnect));
        adapter.connect("ws://room").await.unwrap();

        let event = adapter.recv().await;
        assert!(matches!(
            event,
            LinkEvent::Disconnected {
                reconnecting: false,
                ..
            }
        ));
        assert!(!adapter.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn reconnects_on_schedule() {
        let connector = ScriptedConnector::new(vec![
            Some(vec![None]),
            None,
            Some(vec![frame("user_left", json!({"username": "bob"}))]),
        ]);
        let attempts = Arc::clone(&connector.attempts);
        let mut adapter: TransportAdapter<()> =
            TransportAdapter::new(connector, schedule(&[10, 20, 40]));
        adapter.connect("ws://room").await.unwrap();

        assert!(matches!(
            adapter.recv().await,
            LinkEvent::Disconnected {
                reconnecting: true,
                ..
            }
        ));
        assert_eq!(adapter.recv().await, LinkEvent::Reconnected);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert!(matches!(adapter.recv().await, LinkEvent::Frame { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_when_schedule_runs_out() {
        let connector = ScriptedConnector::new(vec![Some(vec![None]), None, None]);
        let mut adapter: TransportAdapter<()> =
            TransportAdapter::new(connector, schedule(&[10, 10]));
        adapter.connect("ws://room").await.unwrap();

        let _ = adapter.recv().await;
        assert!(matches!(adapter.recv().await, LinkEvent::GaveUp { .. }));
        assert!(!adapter.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn unrepresentable_delay_gives_up() {
        let connector = ScriptedConnector::new(vec![Some(vec![None])]);
        let mut adapter: TransportAdapter<()> = TransportAdapter::new(
            connector,
            Arc::new(FixedSchedule::new(vec![Duration::MAX])),
        );
        adapter.connect("ws://room").await.unwrap();

        assert!(matches!(
            adapter.recv().await,
            LinkEvent::Disconnected {
                reconnecting: false,
                ..
            }
        ));
        assert!(!adapter.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn unrepresentable_delay_mid_reconnect_gives_up() {
        let connector = ScriptedConnector::new(vec![Some(vec![None]), None]);
        let mut adapter: TransportAdapter<()> = TransportAdapter::new(
            connector,
            Arc::new(FixedSchedule::new(vec![
                Duration::from_millis(10),
                Duration::MAX,
            ])),
        );
        adapter.connect("ws://room").await.unwrap();

        let _ = adapter.recv().await;
        assert!(matches!(adapter.recv().await, LinkEvent::GaveUp { .. }));
        assert!(!adapter.is_active());
    }

    #[tokio::test]
    async fn failed_send_is_reported_by_recv() {
        let mut connector = ScriptedConnector::new(vec![Some(vec![])]);
        connector.fail_sends = true;
        let mut adapter: TransportAdapter<()> =
            TransportAdapter::new(connector, Arc::new(NoReconnect));
        adapter.connect("ws://room").await.unwrap();

        assert!(!adapter.send("send_message", &json!({"message": "x"})).await);
        assert!(adapter.is_active());
        assert!(matches!(
            adapter.recv().await,
            LinkEvent::Disconnected {
                reconnecting: false,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn disconnect_is_idempotent_and_clears_handlers() {
        let connector = ScriptedConnector::new(vec![Some(vec![])]);
        let mut adapter: TransportAdapter<()> =
            TransportAdapter::new(connector, Arc::new(NoReconnect));
        adapter.subscribe("error", |_: &mut (), _: &Value| {});
        adapter.connect("ws://room").await.unwrap();

        adapter.disconnect().await;
        adapter.disconnect().await;
        assert!(adapter.handlers().is_empty());
        assert!(!adapter.is_open());
        assert!(!adapter.send("send_message", &json!({})).await);
    }
}
