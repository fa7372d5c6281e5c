//! Domain bridges: typed state and actions on top of one channel each.

use std::sync::Arc;

use async_trait::async_trait;
use ledgerplay_shared::{ApiError, ChannelKind, ProtocolError};

use crate::api_client::RealtimeApi;
use crate::identity::IdentityProvider;
use crate::notify::NotificationSink;
use crate::ws::{ChannelError, ConnectionState};

pub mod core;
pub mod gaming;
pub mod leaderboards;
pub mod notifications;

pub use self::core::{BridgeCore, Notice};
pub use gaming::{GamingActivity, GamingBridge, GamingState};
pub use leaderboards::{LeaderboardBridge, LeaderboardState, RankingChange};
pub use notifications::{NotificationBridge, NotificationState};

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error(transparent)]
    Channel(#[from] ChannelError),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("{0}")]
    Precondition(String),
}

/// Counters a bridge exposes to the orchestrator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BridgeMetrics {
    pub connected: bool,
    pub messages_sent: u64,
    pub events_received: u64,
    pub active_players: usize,
    pub queued_notifications: usize,
    pub subscribed_rooms: usize,
    pub history_len: usize,
}

/// Collaborators shared by every bridge.
#[derive(Clone)]
pub struct BridgeContext {
    pub identity: Arc<dyn IdentityProvider>,
    pub notifier: Arc<dyn NotificationSink>,
    pub api: Arc<dyn RealtimeApi>,
}

#[async_trait]
pub trait DomainBridge: Send + Sync {
    fn name(&self) -> &'static str;

    fn kind(&self) -> ChannelKind;

    /// Connect, subscribe handlers once and hydrate initial state.
    async fn init(&self) -> Result<(), BridgeError>;

    fn connection_state(&self) -> ConnectionState;

    fn is_connected(&self) -> bool {
        self.connection_state().is_connected()
    }

    fn metrics(&self) -> BridgeMetrics;

    /// Disconnect the channel and drop room memberships.
    fn teardown(&self);

    /// Replace optimistic state with the REST view.
    async fn reconcile(&self) -> Result<(), BridgeError>;
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use ledgerplay_shared::{
        ApiError, BoardKey, ChallengeProgress, NotificationItem, PlayerProgress, RankingEntry,
    };

    use super::BridgeContext;
    use crate::api_client::RealtimeApi;
    use crate::identity::StaticIdentity;
    use crate::notify::ToastQueue;

    /// Canned REST responses.
    #[derive(Default)]
    pub struct FakeApi {
        pub challenges: Mutex<Vec<ChallengeProgress>>,
        pub progress: Mutex<PlayerProgress>,
        pub notifications: Mutex<Vec<NotificationItem>>,
        pub boards: Mutex<Vec<(BoardKey, Vec<RankingEntry>)>>,
        pub fail_with: Mutex<Option<ApiError>>,
    }

    impl FakeApi {
        fn check(&self) -> Result<(), ApiError> {
            match self.fail_with.lock().unwrap().clone() {
                Some(err) => Err(err),
                None => Ok(()),
            }
        }
    }

    #[async_trait]
    impl RealtimeApi for FakeApi {
        async fn active_challenges(&self) -> Result<Vec<ChallengeProgress>, ApiError> {
            self.check()?;
            Ok(self.challenges.lock().unwrap().clone())
        }

        async fn player_progress(&self) -> Result<PlayerProgress, ApiError> {
            self.check()?;
            Ok(self.progress.lock().unwrap().clone())
        }

        async fn notifications(&self) -> Result<Vec<NotificationItem>, ApiError> {
            self.check()?;
            Ok(self.notifications.lock().unwrap().clone())
        }

        async fn leaderboard(&self, board: &BoardKey) -> Result<Vec<RankingEntry>, ApiError> {
            self.check()?;
            Ok(self
                .boards
                .lock()
                .unwrap()
                .iter()
                .find(|(key, _)| key == board)
                .map(|(_, entries)| entries.clone())
                .unwrap_or_default())
        }
    }

    pub struct Harness {
        pub context: BridgeContext,
        pub toasts: Arc<ToastQueue>,
        pub api: Arc<FakeApi>,
    }

    pub fn harness(identity: StaticIdentity) -> Harness {
        let toasts = Arc::new(ToastQueue::new());
        let api = Arc::new(FakeApi::default());
        Harness {
            context: BridgeContext {
                identity: Arc::new(identity),
                notifier: toasts.clone(),
                api: api.clone(),
            },
            toasts,
            api,
        }
    }

    pub async fn settle() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
