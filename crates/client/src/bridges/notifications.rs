//! Notifications bridge: a bounded, newest-first inbox with an unread counter.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use ledgerplay_shared::{
    ChannelKind, NotificationCommand, NotificationEvent, NotificationItem, NotificationPriority,
    NotificationSeverity,
};

use super::core::{BridgeCore, Notice};
use super::{BridgeContext, BridgeError, BridgeMetrics, DomainBridge};
use crate::config::RealtimeConfig;
use crate::history::BoundedHistory;
use crate::notify::NotifyOptions;
use crate::sync::lock;
use crate::ws::{ChannelClient, ConnectionState, Delivery};

#[derive(Debug, Clone)]
pub struct NotificationState {
    pub queue: BoundedHistory<NotificationItem>,
    pub unread: u32,
}

impl NotificationState {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: BoundedHistory::new(capacity),
            unread: 0,
        }
    }

    fn mark_read(&mut self, id: &str) -> bool {
        let Some(item) = self.queue.iter_mut().find(|item| item.id == id) else {
            return false;
        };
        if item.read {
            return false;
        }
        item.read = true;
        self.unread = self.unread.saturating_sub(1);
        true
    }

    fn mark_all_read(&mut self) {
        for item in self.queue.iter_mut() {
            item.read = true;
        }
        self.unread = 0;
    }
}

/// Whether a notification interrupts the user or waits in the inbox.
pub fn is_material(item: &NotificationItem) -> bool {
    item.severity >= NotificationSeverity::Warning || item.priority == NotificationPriority::High
}

pub fn apply(state: &mut NotificationState, event: NotificationEvent) -> Vec<Notice> {
    match event {
        NotificationEvent::Notification(item) => {
            if state.queue.iter().any(|existing| existing.id == item.id) {
                return Vec::new();
            }
            let notice = is_material(&item).then(|| Notice {
                severity: item.severity,
                message: item.message.clone(),
                options: NotifyOptions::titled(item.title.clone())
                    .with_duration(Duration::from_secs(6)),
            });
            if !item.read {
                state.unread += 1;
            }
            state.queue.push(item);
            notice.into_iter().collect()
        }
        NotificationEvent::NotificationRead { id } => {
            state.mark_read(&id);
            Vec::new()
        }
        NotificationEvent::NotificationsCleared { .. } => {
            state.queue.clear();
            state.unread = 0;
            Vec::new()
        }
        NotificationEvent::UnreadCount { count } => {
            state.unread = count;
            Vec::new()
        }
    }
}

pub struct NotificationBridge {
    core: BridgeCore,
    state: Arc<Mutex<NotificationState>>,
}

impl NotificationBridge {
    pub fn new(channel: ChannelClient, context: BridgeContext, config: &RealtimeConfig) -> Self {
        Self {
            core: BridgeCore::new(ChannelKind::Notifications, channel, context),
            state: Arc::new(Mutex::new(NotificationState::new(
                config.notification_history,
            ))),
        }
    }

    pub fn state(&self) -> NotificationState {
        lock(&self.state).clone()
    }

    pub fn unread(&self) -> u32 {
        lock(&self.state).unread
    }

    fn register_handlers(&self) {
        let state = self.state.clone();
        let notifier = self.core.notifier();
        self.core
            .subscribe_events::<NotificationEvent, _>(move |event| {
                let notices = apply(&mut lock(&state), event);
                for notice in notices {
                    notice.deliver(notifier.as_ref());
                }
                Ok(())
            });
    }

    pub fn mark_read(&self, id: &str) -> Result<Delivery, BridgeError> {
        let delivery = self.core.send_queued(&NotificationCommand::MarkRead { id: id.to_string() })?;
        lock(&self.state).mark_read(id);
        Ok(delivery)
    }

    pub fn mark_all_read(&self) -> Result<Delivery, BridgeError> {
        let delivery = self.core.send_queued(&NotificationCommand::MarkAllRead {})?;
        lock(&self.state).mark_all_read();
        Ok(delivery)
    }

    /// Replace the inbox with the REST view.
    pub async fn refresh(&self) -> Result<(), BridgeError> {
        let mut items = self.core.api().notifications().await?;
        items.sort_by(|a, b| a.created_at.cmp(&b.created_at));

        let mut state = lock(&self.state);
        state.queue.clear();
        for item in items {
            state.queue.push(item);
        }
        state.unread = state.queue.iter().filter(|item| !item.read).count() as u32;
        Ok(())
    }
}

#[async_trait]
impl DomainBridge for NotificationBridge {
    fn name(&self) -> &'static str {
        "notifications"
    }

    fn kind(&self) -> ChannelKind {
        self.core.kind()
    }

    async fn init(&self) -> Result<(), BridgeError> {
        self.core.connect().await?;
        if self.core.begin_subscription() {
            self.register_handlers();
        }
        self.core.send_now(&NotificationCommand::Subscribe {})?;
        crate::log_info!("Notifications bridge ready");
        Ok(())
    }

    fn connection_state(&self) -> ConnectionState {
        self.core.channel().state()
    }

    fn metrics(&self) -> BridgeMetrics {
        let state = lock(&self.state);
        BridgeMetrics {
            connected: self.core.channel().is_connected(),
            messages_sent: self.core.messages_sent(),
            events_received: self.core.events_received(),
            active_players: 0,
            queued_notifications: state.queue.len(),
            subscribed_rooms: 0,
            history_len: state.queue.len(),
        }
    }

    fn teardown(&self) {
        self.core.teardown();
    }

    async fn reconcile(&self) -> Result<(), BridgeError> {
        self.refresh().await
    }
}
