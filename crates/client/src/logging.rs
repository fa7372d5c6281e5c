//! Logging setup and the crate's logging macros.
//!
//! All macros forward to `tracing` under the `ledgerplay` target so that a
//! single `RUST_LOG=ledgerplay=debug` directive covers every realtime module.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter used when `RUST_LOG` is not set.
pub const DEFAULT_DIRECTIVE: &str = "ledgerplay=info,ledgerplay_client=info";

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over `default_directive`. Calling this twice is
/// harmless: the second registration is ignored.
pub fn init_tracing(default_directive: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

pub fn log_info_impl(msg: &str) {
    tracing::info!(target: "ledgerplay", "{}", msg);
}

pub fn log_error_impl(msg: &str) {
    tracing::error!(target: "ledgerplay", "{}", msg);
}

pub fn log_warn_impl(msg: &str) {
    tracing::warn!(target: "ledgerplay", "{}", msg);
}

pub fn log_debug_impl(msg: &str) {
    tracing::debug!(target: "ledgerplay", "{}", msg);
}

/// Log an info message
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::logging::log_info_impl(&format!($($arg)*))
    };
}

/// Log an error message
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        $crate::logging::log_error_impl(&format!($($arg)*))
    };
}

/// Log a warning message
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        $crate::logging::log_warn_impl(&format!($($arg)*))
    };
}

/// Log a debug message
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        $crate::logging::log_debug_impl(&format!($($arg)*))
    };
}
