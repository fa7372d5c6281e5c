//! Runtime configuration read from `LEDGERPLAY_*` environment variables.

use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("{var} has invalid value '{value}': {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Tunables for channels, bridges and the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub struct RealtimeConfig {
    /// Base URL of the realtime gateway; channel paths are appended.
    pub gateway_url: String,
    /// Base URL of the REST API.
    pub api_url: String,
    pub health_interval: Duration,
    pub restart_grace: Duration,
    pub reconcile_interval: Duration,
    pub auto_reconnect: bool,
    pub outbox_capacity: usize,
    pub gaming_history: usize,
    pub notification_history: usize,
    pub leaderboard_history: usize,
    /// Community contributions at or above this amount raise a toast.
    pub materiality_threshold: f64,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            gateway_url: "ws://localhost:8080/realtime".into(),
            api_url: "http://localhost:8080".into(),
            health_interval: Duration::from_secs(30),
            restart_grace: Duration::from_millis(1000),
            reconcile_interval: Duration::from_secs(300),
            auto_reconnect: true,
            outbox_capacity: 64,
            gaming_history: 100,
            notification_history: 50,
            leaderboard_history: 50,
            materiality_threshold: 100.0,
        }
    }
}

impl RealtimeConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source; unset variables keep defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            gateway_url: lookup("LEDGERPLAY_GATEWAY_URL").unwrap_or(defaults.gateway_url),
            api_url: lookup("LEDGERPLAY_API_URL").unwrap_or(defaults.api_url),
            health_interval: Duration::from_secs(parse_or(
                &lookup,
                "LEDGERPLAY_HEALTH_INTERVAL_SECS",
                defaults.health_interval.as_secs(),
            )?),
            restart_grace: Duration::from_millis(parse_or(
                &lookup,
                "LEDGERPLAY_RESTART_GRACE_MS",
                defaults.restart_grace.as_millis() as u64,
            )?),
            reconcile_interval: Duration::from_secs(parse_or(
                &lookup,
                "LEDGERPLAY_RECONCILE_INTERVAL_SECS",
                defaults.reconcile_interval.as_secs(),
            )?),
            auto_reconnect: parse_or(&lookup, "LEDGERPLAY_AUTO_RECONNECT", defaults.auto_reconnect)?,
            outbox_capacity: parse_or(
                &lookup,
                "LEDGERPLAY_OUTBOX_CAPACITY",
                defaults.outbox_capacity,
            )?,
            gaming_history: parse_or(&lookup, "LEDGERPLAY_GAMING_HISTORY", defaults.gaming_history)?,
            notification_history: parse_or(
                &lookup,
                "LEDGERPLAY_NOTIFICATION_HISTORY",
                defaults.notification_history,
            )?,
            leaderboard_history: parse_or(
                &lookup,
                "LEDGERPLAY_LEADERBOARD_HISTORY",
                defaults.leaderboard_history,
            )?,
            materiality_threshold: parse_or(
                &lookup,
                "LEDGERPLAY_MATERIALITY_THRESHOLD",
                defaults.materiality_threshold,
            )?,
        })
    }
}

fn parse_or<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(var) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            reason: e.to_string(),
            value,
        }),
    }
}
