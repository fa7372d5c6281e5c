//! Ledgerplay realtime client
//!
//! Connectivity core for the gamified budgeting front-end: one WebSocket
//! channel per domain (gaming, notifications, leaderboards), a bridge per
//! channel that turns events into local state and toasts, and an
//! orchestrator that keeps the three healthy.

pub mod logging;

pub mod api_client;
pub mod bridges;
pub mod client_keys;
pub mod config;
pub mod health;
pub mod history;
pub mod identity;
pub mod notify;
pub mod orchestrator;
pub mod scheduler;
pub mod storage;
pub(crate) mod sync;
pub mod ws;

pub use api_client::{ApiClient, RealtimeApi};
pub use bridges::{
    BridgeContext, BridgeError, BridgeMetrics, DomainBridge, GamingBridge, LeaderboardBridge,
    NotificationBridge,
};
pub use client_keys::KeyPair;
pub use config::{ConfigError, RealtimeConfig};
pub use health::{AggregateHealth, HealthSnapshot};
pub use identity::{AuthSession, Identity, IdentityProvider, SessionIdentity, StaticIdentity};
pub use notify::{NotificationSink, ToastQueue, TracingSink};
pub use orchestrator::{
    InitOutcome, Orchestrator, OrchestratorEvent, OrchestratorOptions, OrchestratorState,
};
pub use ws::{ChannelClient, ConnectionState, LoopbackConnector, TungsteniteConnector};
