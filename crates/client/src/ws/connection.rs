//! Channel client: one logical realtime channel over a [`Connector`].
//!
//! The client owns the connection state machine
//! (`disconnected → connecting → connected`, with `error` on failure), the
//! per-event handler lists, a bounded outbox for messages written while
//! offline, and the reader task that dispatches inbound frames in order.

use std::collections::{HashMap, VecDeque};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use futures_channel::mpsc::{UnboundedReceiver, UnboundedSender};
use futures_util::StreamExt;
use ledgerplay_shared::{InboundFrame, OutboundFrame, ProtocolError};
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::transport::{Connector, Link};
use crate::sync::lock;

pub const DEFAULT_OUTBOX_CAPACITY: usize = 64;

/// Connection state for a channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Error { reason: String },
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    pub fn is_connecting(&self) -> bool {
        matches!(self, ConnectionState::Connecting)
    }

    pub fn label(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Error { .. } => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    #[error("connection to {path} failed: {reason}")]
    Connection { path: String, reason: String },
    #[error("channel {0} is not connected")]
    NotConnected(String),
    #[error("outbox for {path} is full ({capacity} pending)")]
    OutboxFull { path: String, capacity: usize },
    #[error("could not encode frame: {0}")]
    Encode(String),
}

/// Failure reported by an event handler. Never escapes dispatch.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("{0}")]
    Failed(String),
}

pub type HandlerResult = Result<(), HandlerError>;

type EventHandler = Arc<dyn Fn(&InboundFrame) -> HandlerResult + Send + Sync>;
type LinkHook = Arc<dyn Fn() + Send + Sync>;

/// What `send_or_queue` did with a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    Queued,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelStats {
    pub connect_attempts: u64,
    pub frames_sent: u64,
    pub frames_received: u64,
    pub handler_failures: u64,
    pub queued: usize,
}

struct ActiveLink {
    sender: UnboundedSender<String>,
    reader: JoinHandle<()>,
    generation: u64,
}

struct ChannelInner {
    path: String,
    connector: Arc<dyn Connector>,
    state: watch::Sender<ConnectionState>,
    handlers: Mutex<HashMap<String, Vec<EventHandler>>>,
    link_lost: Mutex<Vec<LinkHook>>,
    // Lock order: `link` before `outbox`.
    link: Mutex<Option<ActiveLink>>,
    outbox: Mutex<VecDeque<String>>,
    outbox_capacity: usize,
    connect_gate: tokio::sync::Mutex<()>,
    connect_epoch: AtomicU64,
    last_outcome: Mutex<Option<Result<(), ChannelError>>>,
    generation: AtomicU64,
    connect_attempts: AtomicU64,
    frames_sent: AtomicU64,
    frames_received: AtomicU64,
    handler_failures: AtomicU64,
}

/// Cheaply cloneable handle to one realtime channel.
#[derive(Clone)]
pub struct ChannelClient {
    inner: Arc<ChannelInner>,
}

impl ChannelClient {
    pub fn new(path: impl Into<String>, connector: Arc<dyn Connector>) -> Self {
        Self::with_outbox_capacity(path, connector, DEFAULT_OUTBOX_CAPACITY)
    }

    pub fn with_outbox_capacity(
        path: impl Into<String>,
        connector: Arc<dyn Connector>,
        outbox_capacity: usize,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            inner: Arc::new(ChannelInner {
                path: path.into(),
                connector,
                state,
                handlers: Mutex::new(HashMap::new()),
                link_lost: Mutex::new(Vec::new()),
                link: Mutex::new(None),
                outbox: Mutex::new(VecDeque::new()),
                outbox_capacity,
                connect_gate: tokio::sync::Mutex::new(()),
                connect_epoch: AtomicU64::new(0),
                last_outcome: Mutex::new(None),
                generation: AtomicU64::new(0),
                connect_attempts: AtomicU64::new(0),
                frames_sent: AtomicU64::new(0),
                frames_received: AtomicU64::new(0),
                handler_failures: AtomicU64::new(0),
            }),
        }
    }

    pub fn path(&self) -> &str {
        &self.inner.path
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.state.borrow().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.state.borrow().is_connected()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    pub fn stats(&self) -> ChannelStats {
        ChannelStats {
            connect_attempts: self.inner.connect_attempts.load(Ordering::SeqCst),
            frames_sent: self.inner.frames_sent.load(Ordering::SeqCst),
            frames_received: self.inner.frames_received.load(Ordering::SeqCst),
            handler_failures: self.inner.handler_failures.load(Ordering::SeqCst),
            queued: lock(&self.inner.outbox).len(),
        }
    }

    /// Open the link if it is not already open.
    ///
    /// Callers that arrive while an attempt is in flight wait for it and get
    /// its outcome, so concurrent calls produce a single transport attempt.
    pub async fn connect(&self) -> Result<(), ChannelError> {
        if self.is_connected() {
            return Ok(());
        }

        let epoch = self.inner.connect_epoch.load(Ordering::SeqCst);
        let _gate = self.inner.connect_gate.lock().await;
        if self.inner.connect_epoch.load(Ordering::SeqCst) != epoch {
            return lock(&self.inner.last_outcome).clone().unwrap_or(Ok(()));
        }
        if self.is_connected() {
            return Ok(());
        }

        let outcome = self.attempt().await;
        *lock(&self.inner.last_outcome) = Some(outcome.clone());
        self.inner.connect_epoch.fetch_add(1, Ordering::SeqCst);
        outcome
    }

    async fn attempt(&self) -> Result<(), ChannelError> {
        let path = self.inner.path.clone();
        self.inner.state.send_replace(ConnectionState::Connecting);
        self.inner.connect_attempts.fetch_add(1, Ordering::SeqCst);
        let started = self.inner.generation.load(Ordering::SeqCst);
        crate::log_debug!("Connecting channel {}", path);

        match self.inner.connector.open(&path).await {
            Ok(link) => {
                if self.inner.generation.load(Ordering::SeqCst) != started {
                    crate::log_info!("Channel {} was disconnected while connecting", path);
                    return Err(ChannelError::Connection {
                        path,
                        reason: "disconnected during connect".into(),
                    });
                }
                self.install(link);
                crate::log_info!("Channel {} connected", path);
                Ok(())
            }
            Err(e) => {
                crate::log_error!("Channel {} failed to connect: {}", path, e);
                self.inner.state.send_replace(ConnectionState::Error {
                    reason: e.to_string(),
                });
                Err(ChannelError::Connection {
                    path,
                    reason: e.to_string(),
                })
            }
        }
    }

    fn install(&self, link: Link) {
        let Link { outbound, inbound } = link;
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let mut slot = lock(&self.inner.link);
        let pending: Vec<String> = lock(&self.inner.outbox).drain(..).collect();
        if !pending.is_empty() {
            crate::log_info!(
                "Flushing {} queued frame(s) on {}",
                pending.len(),
                self.inner.path
            );
        }
        for json in pending {
            if outbound.unbounded_send(json).is_ok() {
                self.inner.frames_sent.fetch_add(1, Ordering::SeqCst);
            }
        }

        let reader = tokio::spawn(read_loop(Arc::downgrade(&self.inner), inbound, generation));
        *slot = Some(ActiveLink {
            sender: outbound,
            reader,
            generation,
        });
        self.inner.state.send_replace(ConnectionState::Connected);
    }

    /// Register a handler for `event_name`. Handlers run in registration order.
    pub fn on<F>(&self, event_name: &str, handler: F)
    where
        F: Fn(&InboundFrame) -> HandlerResult + Send + Sync + 'static,
    {
        lock(&self.inner.handlers)
            .entry(event_name.to_string())
            .or_default()
            .push(Arc::new(handler));
    }

    /// Run `hook` whenever the remote side closes the link.
    pub fn on_link_lost<F>(&self, hook: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        lock(&self.inner.link_lost).push(Arc::new(hook));
    }

    pub fn handler_count(&self, event_name: &str) -> usize {
        lock(&self.inner.handlers)
            .get(event_name)
            .map_or(0, |handlers| handlers.len())
    }

    /// Transmit now or fail with [`ChannelError::NotConnected`].
    pub fn send(&self, topic: &str, action: &str, payload: Value) -> Result<(), ChannelError> {
        self.send_frame(&OutboundFrame::new(topic, action, payload))
    }

    pub fn send_frame(&self, frame: &OutboundFrame) -> Result<(), ChannelError> {
        let json = encode(frame)?;
        let link = lock(&self.inner.link);
        let delivered = link
            .as_ref()
            .is_some_and(|active| active.sender.unbounded_send(json).is_ok());
        if !delivered {
            return Err(ChannelError::NotConnected(self.inner.path.clone()));
        }
        self.inner.frames_sent.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    /// Transmit now, or hold the frame until the next successful connect.
    pub fn send_or_queue(&self, frame: &OutboundFrame) -> Result<Delivery, ChannelError> {
        let mut json = encode(frame)?;
        let link = lock(&self.inner.link);
        if let Some(active) = link.as_ref() {
            match active.sender.unbounded_send(json) {
                Ok(()) => {
                    self.inner.frames_sent.fetch_add(1, Ordering::SeqCst);
                    return Ok(Delivery::Sent);
                }
                Err(e) => json = e.into_inner(),
            }
        }

        let mut outbox = lock(&self.inner.outbox);
        if outbox.len() >= self.inner.outbox_capacity {
            crate::log_warn!("Outbox for {} is full, rejecting '{}'", self.inner.path, frame.action);
            return Err(ChannelError::OutboxFull {
                path: self.inner.path.clone(),
                capacity: self.inner.outbox_capacity,
            });
        }
        outbox.push_back(json);
        crate::log_debug!("Queued '{}' on {} ({} pending)", frame.action, self.inner.path, outbox.len());
        Ok(Delivery::Queued)
    }

    /// Invoke every handler registered for the frame's event name.
    pub fn dispatch(&self, frame: &InboundFrame) {
        self.inner.dispatch(frame);
    }

    /// Close the link and forget handlers, hooks and queued frames.
    pub fn disconnect(&self) {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(active) = lock(&self.inner.link).take() {
            active.reader.abort();
        }
        lock(&self.inner.handlers).clear();
        lock(&self.inner.link_lost).clear();
        lock(&self.inner.outbox).clear();
        self.inner.state.send_replace(ConnectionState::Disconnected);
        crate::log_info!("Channel {} disconnected", self.inner.path);
    }

    /// Leave the `error` state so the next `connect` starts clean.
    pub fn reset(&self) -> bool {
        self.inner.state.send_if_modified(|state| {
            if matches!(state, ConnectionState::Error { .. }) {
                *state = ConnectionState::Disconnected;
                true
            } else {
                false
            }
        })
    }
}

impl ChannelInner {
    fn dispatch(&self, frame: &InboundFrame) {
        let handlers = lock(&self.handlers)
            .get(&frame.event_name)
            .cloned()
            .unwrap_or_default();
        if handlers.is_empty() {
            crate::log_debug!("No handler for '{}' on {}", frame.event_name, self.path);
            return;
        }

        for handler in handlers {
            let failure = match catch_unwind(AssertUnwindSafe(|| handler(frame))) {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(e.to_string()),
                Err(panic) => Some(panic_message(panic.as_ref())),
            };
            if let Some(reason) = failure {
                self.handler_failures.fetch_add(1, Ordering::SeqCst);
                crate::log_error!(
                    "Handler for '{}' on {} failed: {}",
                    frame.event_name,
                    self.path,
                    reason
                );
            }
        }
    }

    fn link_ended(&self, generation: u64) {
        {
            let mut slot = lock(&self.link);
            if !slot.as_ref().is_some_and(|link| link.generation == generation) {
                return;
            }
            slot.take();
        }
        self.state.send_replace(ConnectionState::Disconnected);
        crate::log_warn!("Channel {} lost its link", self.path);

        let hooks = lock(&self.link_lost).clone();
        for hook in hooks {
            if catch_unwind(AssertUnwindSafe(|| hook())).is_err() {
                crate::log_error!("Link-lost hook on {} panicked", self.path);
            }
        }
    }
}

impl Drop for ChannelInner {
    fn drop(&mut self) {
        if let Some(active) = lock(&self.link).take() {
            active.reader.abort();
        }
    }
}

async fn read_loop(
    inner: Weak<ChannelInner>,
    mut inbound: UnboundedReceiver<String>,
    generation: u64,
) {
    while let Some(raw) = inbound.next().await {
        let Some(channel) = inner.upgrade() else {
            return;
        };
        channel.frames_received.fetch_add(1, Ordering::SeqCst);
        match InboundFrame::parse(&raw) {
            Ok(frame) => channel.dispatch(&frame),
            Err(e) => crate::log_warn!("Dropping malformed frame on {}: {}", channel.path, e),
        }
    }
    if let Some(channel) = inner.upgrade() {
        channel.link_ended(generation);
    }
}

fn encode(frame: &OutboundFrame) -> Result<String, ChannelError> {
    serde_json::to_string(frame).map_err(|e| ChannelError::Encode(e.to_string()))
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("panicked: {message}")
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("panicked: {message}")
    } else {
        "panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::transport::LoopbackConnector;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    const PATH: &str = "/gaming";

    fn channel(gateway: &LoopbackConnector) -> ChannelClient {
        ChannelClient::new(PATH, Arc::new(gateway.clone()))
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_connects_share_one_attempt() {
        let gateway = LoopbackConnector::new().with_open_delay(Duration::from_millis(50));
        let client = channel(&gateway);

        let (a, b) = tokio::join!(client.connect(), client.connect());
        assert!(a.is_ok() && b.is_ok());
        assert_eq!(gateway.attempts(PATH), 1);

        client.connect().await.unwrap();
        assert_eq!(gateway.attempts(PATH), 1);
        assert_eq!(client.stats().connect_attempts, 1);
        assert!(client.state().is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_failure_is_shared_and_retry_makes_new_attempt() {
        let gateway = LoopbackConnector::new().with_open_delay(Duration::from_millis(50));
        gateway.set_available(false);
        let client = channel(&gateway);

        let (a, b) = tokio::join!(client.connect(), client.connect());
        assert!(matches!(a, Err(ChannelError::Connection { .. })));
        assert_eq!(a, b);
        assert_eq!(gateway.attempts(PATH), 1);
        assert_eq!(client.state().label(), "error");

        gateway.set_available(true);
        client.connect().await.unwrap();
        assert_eq!(gateway.attempts(PATH), 2);
    }

    #[tokio::test]
    async fn send_requires_connection() {
        let gateway = LoopbackConnector::new();
        let client = channel(&gateway);
        assert_eq!(
            client.send("gaming", "team_action", json!({})),
            Err(ChannelError::NotConnected(PATH.into()))
        );

        client.connect().await.unwrap();
        client.send("gaming", "team_action", json!({"action_type": "cheer"})).unwrap();
        let sent = gateway.sent(PATH);
        assert_eq!(sent[0].action, "team_action");
        assert_eq!(sent[0].topic, "gaming");
    }

    #[tokio::test]
    async fn queued_frames_flush_in_order_on_connect() {
        let gateway = LoopbackConnector::new();
        let client = ChannelClient::with_outbox_capacity(PATH, Arc::new(gateway.clone()), 2);

        for n in 1..=2 {
            let frame = OutboundFrame::new("gaming", "contribute", json!({ "n": n }));
            assert_eq!(client.send_or_queue(&frame), Ok(Delivery::Queued));
        }
        let overflow = OutboundFrame::new("gaming", "contribute", json!({ "n": 3 }));
        assert!(matches!(
            client.send_or_queue(&overflow),
            Err(ChannelError::OutboxFull { capacity: 2, .. })
        ));
        assert_eq!(client.stats().queued, 2);

        client.connect().await.unwrap();
        let sent = gateway.sent(PATH);
        let order: Vec<_> = sent.iter().map(|f| f.payload["n"].clone()).collect();
        assert_eq!(order, vec![json!(1), json!(2)]);
        assert_eq!(client.stats().queued, 0);

        let live = OutboundFrame::new("gaming", "contribute", json!({ "n": 4 }));
        assert_eq!(client.send_or_queue(&live), Ok(Delivery::Sent));
    }

    #[tokio::test]
    async fn failing_handlers_do_not_stop_later_ones() {
        let gateway = LoopbackConnector::new();
        let client = channel(&gateway);
        let ran = Arc::new(Mutex::new(Vec::new()));

        let log = ran.clone();
        client.on("xp_gained", move |_| {
            log.lock().unwrap().push("first");
            Ok(())
        });
        client.on("xp_gained", |_| panic!("boom"));
        client.on("xp_gained", |_| Err(HandlerError::Failed("rejected".into())));
        let log = ran.clone();
        client.on("xp_gained", move |_| {
            log.lock().unwrap().push("last");
            Ok(())
        });

        client.connect().await.unwrap();
        gateway.emit(PATH, "xp_gained", json!({}));
        gateway.emit(PATH, "xp_gained", json!({}));
        settle().await;

        assert_eq!(*ran.lock().unwrap(), vec!["first", "last", "first", "last"]);
        assert_eq!(client.stats().handler_failures, 4);
        assert!(client.is_connected());
    }

    #[tokio::test]
    async fn inbound_frames_dispatch_in_transport_order() {
        let gateway = LoopbackConnector::new();
        let client = channel(&gateway);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        client.on("streak_update", move |frame| {
            sink.lock().unwrap().push(frame.payload["count"].as_u64().unwrap_or_default());
            Ok(())
        });

        client.connect().await.unwrap();
        gateway.emit_raw(PATH, "not json");
        for count in 1..=5 {
            gateway.emit(PATH, "streak_update", json!({ "count": count }));
        }
        settle().await;

        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3, 4, 5]);
        assert_eq!(client.stats().frames_received, 6);
    }

    #[tokio::test]
    async fn remote_close_fires_link_lost_hooks() {
        let gateway = LoopbackConnector::new();
        let client = channel(&gateway);
        let lost = Arc::new(AtomicUsize::new(0));
        let counter = lost.clone();
        client.on_link_lost(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        client.connect().await.unwrap();
        gateway.drop_link(PATH);
        settle().await;

        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert_eq!(lost.load(Ordering::SeqCst), 1);

        client.connect().await.unwrap();
        assert_eq!(gateway.attempts(PATH), 2);
    }

    #[tokio::test]
    async fn disconnect_forgets_handlers_hooks_and_outbox() {
        let gateway = LoopbackConnector::new();
        let client = channel(&gateway);
        client.on("player_left", |_| Ok(()));
        client.on_link_lost(|| panic!("hook must not run after disconnect"));
        client
            .send_or_queue(&OutboundFrame::new("gaming", "contribute", json!({})))
            .unwrap();

        client.connect().await.unwrap();
        client.send_or_queue(&OutboundFrame::new("gaming", "contribute", json!({}))).unwrap();
        client.disconnect();
        settle().await;

        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert_eq!(client.handler_count("player_left"), 0);
        assert_eq!(client.stats().queued, 0);
        assert!(!gateway.is_linked(PATH));
    }

    #[tokio::test]
    async fn reset_only_leaves_error_state() {
        let gateway = LoopbackConnector::new();
        gateway.set_available(false);
        let client = channel(&gateway);

        assert!(!client.reset());
        assert!(client.connect().await.is_err());
        let mut states = client.watch_state();
        assert!(matches!(*states.borrow_and_update(), ConnectionState::Error { .. }));

        assert!(client.reset());
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }
}
