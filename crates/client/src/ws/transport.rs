//! Transports that open a raw text link for one channel path.
//!
//! A [`Link`] is a pair of unbounded queues of serialized frames. The channel
//! client owns both ends; when the remote side goes away the inbound queue
//! ends, and dropping the outbound sender closes the socket.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures_util::{FutureExt, SinkExt, StreamExt};
use ledgerplay_shared::{InboundFrame, OutboundFrame};
use serde_json::Value;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use crate::client_keys::sign_channel_request;
use crate::identity::{IdentityProvider, SessionIdentity};
use crate::sync::lock;

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("invalid gateway url '{0}'")]
    InvalidUrl(String),
    #[error("connect to {url} failed: {reason}")]
    Connect { url: String, reason: String },
    #[error("gateway unavailable")]
    Unavailable,
}

/// Both directions of an open channel link.
pub struct Link {
    pub outbound: UnboundedSender<String>,
    pub inbound: UnboundedReceiver<String>,
}

#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self, path: &str) -> Result<Link, TransportError>;
}

/// WebSocket transport over `tokio-tungstenite`.
pub struct TungsteniteConnector {
    base_url: String,
    session: Option<Arc<SessionIdentity>>,
}

impl TungsteniteConnector {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            session: None,
        }
    }

    /// Sign each upgrade request with the session's device key.
    pub fn with_session(mut self, session: Arc<SessionIdentity>) -> Self {
        self.session = Some(session);
        self
    }

    fn url_for(&self, path: &str) -> Result<url::Url, TransportError> {
        let raw = format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        let mut url = url::Url::parse(&raw).map_err(|_| TransportError::InvalidUrl(raw.clone()))?;

        if let Some(session) = &self.session {
            if let Some(keys) = session.keys() {
                let user_id = session.current().user_id;
                if let Some(params) = sign_channel_request(url.path(), &keys, user_id) {
                    url.set_query(Some(&params.to_query_string()));
                }
            }
        }
        Ok(url)
    }
}

#[async_trait]
impl Connector for TungsteniteConnector {
    async fn open(&self, path: &str) -> Result<Link, TransportError> {
        let url = self.url_for(path)?;
        let (ws_stream, _response) =
            connect_async(url.as_str())
                .await
                .map_err(|e| TransportError::Connect {
                    url: format!("{}{}", self.base_url, path),
                    reason: e.to_string(),
                })?;
        crate::log_info!("WebSocket connected to {}", path);

        let (mut write, mut read) = ws_stream.split();
        let (out_tx, mut out_rx) = unbounded::<String>();
        let (in_tx, in_rx) = unbounded::<String>();

        let path_for_write = path.to_string();
        tokio::spawn(async move {
            while let Some(json) = out_rx.next().await {
                crate::log_debug!("Sending to {}: {}", path_for_write, json);
                if let Err(e) = write.send(Message::Text(json.into())).await {
                    crate::log_error!("Send to {} failed: {}", path_for_write, e);
                    break;
                }
            }
            let _ = write.close().await;
        });

        let path_for_read = path.to_string();
        tokio::spawn(async move {
            while let Some(msg_result) = read.next().await {
                match msg_result {
                    Ok(Message::Text(text)) => {
                        if in_tx.unbounded_send(text.as_str().to_owned()).is_err() {
                            break;
                        }
                    }
                    Ok(Message::Close(_)) => {
                        crate::log_info!("WebSocket {} received close frame", path_for_read);
                        break;
                    }
                    Ok(Message::Ping(data)) => {
                        // Pong is handled automatically by tungstenite
                        crate::log_debug!("Received ping: {:?}", data);
                    }
                    Ok(_) => {}
                    Err(e) => {
                        crate::log_error!("WebSocket {} read error: {}", path_for_read, e);
                        break;
                    }
                }
            }
        });

        Ok(Link {
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}

struct Remote {
    to_client: UnboundedSender<String>,
    from_client: UnboundedReceiver<String>,
    sent: Vec<OutboundFrame>,
}

#[derive(Default)]
struct LoopbackState {
    unavailable: bool,
    open_delay: Duration,
    attempts: HashMap<String, u32>,
    remotes: HashMap<String, Remote>,
}

/// In-process gateway: the caller plays the server side of every link.
#[derive(Clone, Default)]
pub struct LoopbackConnector {
    state: Arc<Mutex<LoopbackState>>,
}

impl LoopbackConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every `open` by `delay` before it resolves.
    pub fn with_open_delay(self, delay: Duration) -> Self {
        lock(&self.state).open_delay = delay;
        self
    }

    /// While unavailable, `open` fails with [`TransportError::Unavailable`].
    pub fn set_available(&self, available: bool) {
        lock(&self.state).unavailable = !available;
    }

    pub fn attempts(&self, path: &str) -> u32 {
        lock(&self.state).attempts.get(path).copied().unwrap_or(0)
    }

    pub fn total_attempts(&self) -> u32 {
        lock(&self.state).attempts.values().sum()
    }

    pub fn is_linked(&self, path: &str) -> bool {
        lock(&self.state)
            .remotes
            .get(path)
            .is_some_and(|remote| !remote.to_client.is_closed())
    }

    /// Push an inbound event to the client on `path`. Returns `false` if no link is open.
    pub fn emit(&self, path: &str, event_name: &str, payload: Value) -> bool {
        let frame = InboundFrame::new(event_name, payload);
        match serde_json::to_string(&frame) {
            Ok(json) => self.emit_raw(path, json),
            Err(_) => false,
        }
    }

    /// Push an arbitrary text frame, well-formed or not.
    pub fn emit_raw(&self, path: &str, text: impl Into<String>) -> bool {
        lock(&self.state)
            .remotes
            .get(path)
            .is_some_and(|remote| remote.to_client.unbounded_send(text.into()).is_ok())
    }

    /// Every frame the client has written on `path` so far, oldest first.
    pub fn sent(&self, path: &str) -> Vec<OutboundFrame> {
        let mut state = lock(&self.state);
        let Some(remote) = state.remotes.get_mut(path) else {
            return Vec::new();
        };
        while let Some(Some(json)) = remote.from_client.next().now_or_never() {
            match serde_json::from_str(&json) {
                Ok(frame) => remote.sent.push(frame),
                Err(e) => crate::log_warn!("Loopback dropped unparseable frame: {}", e),
            }
        }
        remote.sent.clone()
    }

    /// Simulate the server closing the link.
    pub fn drop_link(&self, path: &str) {
        lock(&self.state).remotes.remove(path);
    }
}

#[async_trait]
impl Connector for LoopbackConnector {
    async fn open(&self, path: &str) -> Result<Link, TransportError> {
        let delay = {
            let mut state = lock(&self.state);
            *state.attempts.entry(path.to_string()).or_insert(0) += 1;
            state.open_delay
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut state = lock(&self.state);
        if state.unavailable {
            return Err(TransportError::Unavailable);
        }
        let (out_tx, out_rx) = unbounded();
        let (in_tx, in_rx) = unbounded();
        state.remotes.insert(
            path.to_string(),
            Remote {
                to_client: in_tx,
                from_client: out_rx,
                sent: Vec::new(),
            },
        );
        Ok(Link {
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}
