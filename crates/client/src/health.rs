//! Aggregate connection health across the bridges.

use chrono::{DateTime, Utc};
use ledgerplay_shared::ChannelKind;

use crate::ws::ConnectionState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateHealth {
    Healthy,
    Degraded,
    Critical,
}

impl AggregateHealth {
    /// `Critical` iff nothing is connected (including an empty set),
    /// `Healthy` iff everything is, `Degraded` otherwise.
    pub fn classify(connected: usize, total: usize) -> Self {
        if connected == 0 {
            AggregateHealth::Critical
        } else if connected >= total {
            AggregateHealth::Healthy
        } else {
            AggregateHealth::Degraded
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            AggregateHealth::Healthy => "healthy",
            AggregateHealth::Degraded => "degraded",
            AggregateHealth::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChannelHealth {
    pub kind: ChannelKind,
    pub state: ConnectionState,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HealthSnapshot {
    pub channels: Vec<ChannelHealth>,
    pub aggregate: AggregateHealth,
    pub sampled_at: DateTime<Utc>,
}

impl HealthSnapshot {
    pub fn sample(channels: Vec<ChannelHealth>) -> Self {
        let connected = channels
            .iter()
            .filter(|channel| channel.state.is_connected())
            .count();
        Self {
            aggregate: AggregateHealth::classify(connected, channels.len()),
            channels,
            sampled_at: Utc::now(),
        }
    }

    pub fn connected(&self) -> usize {
        self.channels
            .iter()
            .filter(|channel| channel.state.is_connected())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn three_channel_table() {
        assert_eq!(AggregateHealth::classify(0, 3), AggregateHealth::Critical);
        assert_eq!(AggregateHealth::classify(1, 3), AggregateHealth::Degraded);
        assert_eq!(AggregateHealth::classify(2, 3), AggregateHealth::Degraded);
        assert_eq!(AggregateHealth::classify(3, 3), AggregateHealth::Healthy);
    }

    #[test]
    fn no_bridges_is_critical() {
        assert_eq!(AggregateHealth::classify(0, 0), AggregateHealth::Critical);
        assert_eq!(HealthSnapshot::sample(Vec::new()).aggregate, AggregateHealth::Critical);
    }

    #[test]
    fn snapshot_counts_connected_channels() {
        let snapshot = HealthSnapshot::sample(vec![
            ChannelHealth {
                kind: ChannelKind::Gaming,
                state: ConnectionState::Connected,
            },
            ChannelHealth {
                kind: ChannelKind::Notifications,
                state: ConnectionState::Error {
                    reason: "refused".into(),
                },
            },
        ]);
        assert_eq!(snapshot.connected(), 1);
        assert_eq!(snapshot.aggregate.label(), "degraded");
    }

    proptest! {
        #[test]
        fn classification_matches_definition(total in 0usize..16, connected_seed in 0usize..16) {
            let connected = connected_seed.min(total);
            let health = AggregateHealth::classify(connected, total);
            prop_assert_eq!(health == AggregateHealth::Critical, connected == 0);
            prop_assert_eq!(health == AggregateHealth::Healthy, connected > 0 && connected == total);
        }
    }
}
