//! User-facing notification sinks.
//!
//! Bridges and the orchestrator only ever write to a [`NotificationSink`];
//! rendering the toast is the UI's job.

use std::sync::Mutex;
use std::time::Duration;

use ledgerplay_shared::NotificationSeverity;

pub type Severity = NotificationSeverity;

/// A button offered alongside a notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifyAction {
    pub id: String,
    pub label: String,
}

impl NotifyAction {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
        }
    }
}

/// Presentation hints. `duration: None` means the toast stays until dismissed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NotifyOptions {
    pub title: Option<String>,
    pub duration: Option<Duration>,
    pub actions: Vec<NotifyAction>,
}

impl NotifyOptions {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            duration: Some(Duration::from_secs(4)),
            actions: Vec::new(),
        }
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn persistent(mut self) -> Self {
        self.duration = None;
        self
    }

    pub fn with_action(mut self, action: NotifyAction) -> Self {
        self.actions.push(action);
        self
    }
}

/// Fire-and-forget notification target.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, severity: Severity, message: &str, options: NotifyOptions);
}

/// Writes notifications to the log. Used by the headless binary.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn notify(&self, severity: Severity, message: &str, options: NotifyOptions) {
        let title = options.title.as_deref().unwrap_or("ledgerplay");
        match severity {
            Severity::Error => crate::log_error!("[{}] {}", title, message),
            Severity::Warning => crate::log_warn!("[{}] {}", title, message),
            Severity::Info | Severity::Success => crate::log_info!("[{}] {}", title, message),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Toast {
    pub severity: Severity,
    pub message: String,
    pub options: NotifyOptions,
}

/// In-memory toast queue drained by the UI on each frame.
#[derive(Debug, Default)]
pub struct ToastQueue {
    toasts: Mutex<Vec<Toast>>,
}

impl ToastQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take every pending toast, oldest first.
    pub fn drain(&self) -> Vec<Toast> {
        std::mem::take(&mut *crate::sync::lock(&self.toasts))
    }

    pub fn len(&self) -> usize {
        crate::sync::lock(&self.toasts).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl NotificationSink for ToastQueue {
    fn notify(&self, severity: Severity, message: &str, options: NotifyOptions) {
        crate::sync::lock(&self.toasts).push(Toast {
            severity,
            message: message.to_string(),
            options,
        });
    }
}

/// Format a currency amount for toasts: `150` → `"150.00"`.
pub fn format_amount(amount: f64) -> String {
    format!("{:.2}", amount)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toast_queue_drains_in_order() {
        let queue = ToastQueue::new();
        queue.notify(Severity::Info, "first", NotifyOptions::default());
        queue.notify(
            Severity::Error,
            "second",
            NotifyOptions::titled("Connection").persistent(),
        );

        let toasts = queue.drain();
        assert_eq!(toasts.len(), 2);
        assert_eq!(toasts[0].message, "first");
        assert_eq!(toasts[1].options.duration, None);
        assert!(queue.is_empty());
    }

    #[test]
    fn titled_options_default_to_a_short_duration() {
        let options = NotifyOptions::titled("Challenge")
            .with_action(NotifyAction::new("view", "View"));
        assert_eq!(options.duration, Some(Duration::from_secs(4)));
        assert_eq!(options.actions[0].id, "view");
    }

    #[test]
    fn amounts_use_two_decimals() {
        assert_eq!(format_amount(150.0), "150.00");
        assert_eq!(format_amount(12.5), "12.50");
    }
}
