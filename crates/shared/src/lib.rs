//! Shared types for the ledgerplay realtime client and its gateway.

pub mod error;
pub mod events;
pub mod models;
pub mod protocol;

pub use error::*;
pub use events::*;
pub use models::*;
pub use protocol::*;
