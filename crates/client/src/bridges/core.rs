//! Plumbing every bridge shares: subscription guard, typed handler
//! registration and identity-stamped sends.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use ledgerplay_shared::{ChannelCommand, ChannelEvent, ChannelKind, OutboundFrame, UserId};
use serde_json::json;

use super::{BridgeContext, BridgeError};
use crate::api_client::RealtimeApi;
use crate::identity::{Identity, IdentityProvider};
use crate::notify::{NotificationSink, NotifyOptions, Severity};
use crate::ws::{ChannelClient, Delivery, HandlerResult};

/// A notification produced by applying an event, delivered after state locks are released.
#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub severity: Severity,
    pub message: String,
    pub options: NotifyOptions,
}

impl Notice {
    pub fn new(severity: Severity, title: &str, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            options: NotifyOptions::titled(title),
        }
    }

    pub fn deliver(self, sink: &dyn NotificationSink) {
        sink.notify(self.severity, &self.message, self.options);
    }
}

pub struct BridgeCore {
    kind: ChannelKind,
    channel: ChannelClient,
    context: BridgeContext,
    subscribed: AtomicBool,
    messages_sent: AtomicU64,
    events_received: Arc<AtomicU64>,
}

impl BridgeCore {
    pub fn new(kind: ChannelKind, channel: ChannelClient, context: BridgeContext) -> Self {
        Self {
            kind,
            channel,
            context,
            subscribed: AtomicBool::new(false),
            messages_sent: AtomicU64::new(0),
            events_received: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn kind(&self) -> ChannelKind {
        self.kind
    }

    pub fn channel(&self) -> &ChannelClient {
        &self.channel
    }

    pub fn identity(&self) -> Arc<dyn IdentityProvider> {
        self.context.identity.clone()
    }

    pub fn notifier(&self) -> Arc<dyn NotificationSink> {
        self.context.notifier.clone()
    }

    pub fn api(&self) -> &dyn RealtimeApi {
        self.context.api.as_ref()
    }

    pub fn current_identity(&self) -> Identity {
        self.context.identity.current()
    }

    pub fn session_user(&self) -> UserId {
        self.current_identity().user_id
    }

    pub fn notify(&self, notice: Notice) {
        notice.deliver(self.context.notifier.as_ref());
    }

    /// Connect the channel. Failures are logged and returned.
    pub async fn connect(&self) -> Result<(), BridgeError> {
        self.channel.connect().await.map_err(|e| {
            crate::log_warn!("{} bridge could not connect: {}", self.kind.topic(), e);
            BridgeError::from(e)
        })
    }

    /// Returns `true` exactly once per subscription lifetime.
    pub fn begin_subscription(&self) -> bool {
        !self.subscribed.swap(true, Ordering::SeqCst)
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscribed.load(Ordering::SeqCst)
    }

    /// Register `handler` for every event name of `E`, decoding frames first.
    pub fn subscribe_events<E, F>(&self, handler: F)
    where
        E: ChannelEvent,
        F: Fn(E) -> HandlerResult + Send + Sync + 'static,
    {
        let handler = Arc::new(handler);
        for name in E::NAMES {
            let handler = handler.clone();
            let received = self.events_received.clone();
            self.channel.on(name, move |frame| {
                received.fetch_add(1, Ordering::SeqCst);
                let event = frame.decode::<E>()?;
                handler(event)
            });
        }
    }

    fn frame<C: ChannelCommand>(&self, command: &C) -> Result<OutboundFrame, BridgeError> {
        let actor = serde_json::to_value(self.current_identity().actor())
            .map_err(|e| BridgeError::Precondition(e.to_string()))?;
        Ok(OutboundFrame::from_command(self.kind.topic(), command)?
            .with_field("actor", actor)
            .with_field("sent_at", json!(Utc::now())))
    }

    /// Send only if connected.
    pub fn send_now<C: ChannelCommand>(&self, command: &C) -> Result<(), BridgeError> {
        let frame = self.frame(command)?;
        self.channel.send_frame(&frame)?;
        self.messages_sent.fetch_add(1, Ordering::SeqCst);
        crate::log_debug!("{} sent '{}'", self.kind.topic(), command.action());
        Ok(())
    }

    /// Send if connected, otherwise hold in the channel outbox.
    pub fn send_queued<C: ChannelCommand>(&self, command: &C) -> Result<Delivery, BridgeError> {
        let frame = self.frame(command)?;
        let delivery = self.channel.send_or_queue(&frame)?;
        self.messages_sent.fetch_add(1, Ordering::SeqCst);
        Ok(delivery)
    }

    pub fn messages_sent(&self) -> u64 {
        self.messages_sent.load(Ordering::SeqCst)
    }

    pub fn events_received(&self) -> u64 {
        self.events_received.load(Ordering::SeqCst)
    }

    /// Disconnect and allow handlers to be registered again on the next init.
    pub fn teardown(&self) {
        self.channel.disconnect();
        self.subscribed.store(false, Ordering::SeqCst);
    }
}
