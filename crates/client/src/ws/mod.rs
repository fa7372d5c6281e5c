//! Realtime channels.
//!
//! This module provides:
//! - [`ChannelClient`]: connection state, handler dispatch and an offline outbox
//!   for one logical channel
//! - [`Connector`] implementations that open the underlying link
//!
//! # Architecture
//!
//! ```text
//!   ┌──────────────┐ ┌──────────────┐ ┌──────────────┐
//!   │ChannelClient │ │ChannelClient │ │ChannelClient │
//!   │ (/gaming)    │ │(/notific...) │ │(/leaderb...) │
//!   └──────────────┘ └──────────────┘ └──────────────┘
//!          │                │                │
//!          └────────────────┼────────────────┘
//!                           ▼
//!              ┌─────────────────────────┐
//!              │  Connector (tungstenite │
//!              │  or in-process loopback)│
//!              └─────────────────────────┘
//! ```
//!
//! Each bridge owns exactly one channel; handlers registered with
//! [`ChannelClient::on`] run on the channel's reader task, one frame at a time.

pub mod connection;
pub mod transport;

pub use connection::{
    ChannelClient, ChannelError, ChannelStats, ConnectionState, Delivery, HandlerError,
    HandlerResult, DEFAULT_OUTBOX_CAPACITY,
};
pub use transport::{Connector, Link, LoopbackConnector, TransportError, TungsteniteConnector};
