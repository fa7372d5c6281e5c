use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Numeric user id as issued by the REST backend.
///
/// `0` is the "no session" sentinel returned by the identity source when
/// nobody is logged in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct UserId(pub u64);

impl UserId {
    pub const ANONYMOUS: UserId = UserId(0);

    pub fn is_anonymous(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity attached to every outbound action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: UserId,
    pub display_name: String,
    pub level: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerPresence {
    pub user_id: UserId,
    pub display_name: String,
    pub level: u32,
    pub joined_at: DateTime<Utc>,
}

/// Cached view of a community challenge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChallengeProgress {
    pub id: String,
    pub title: String,
    pub current_amount: f64,
    pub target_amount: f64,
    #[serde(default)]
    pub participants: u32,
}

impl ChallengeProgress {
    pub fn completion(&self) -> f64 {
        if self.target_amount <= 0.0 {
            return 0.0;
        }
        (self.current_amount / self.target_amount).min(1.0)
    }
}

/// XP, level and streak counters for the signed-in player.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerProgress {
    pub xp_total: u64,
    pub level: u32,
    #[serde(default)]
    pub streaks: HashMap<String, u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NotificationSeverity {
    #[default]
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NotificationPriority {
    Low,
    #[default]
    Normal,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationItem {
    pub id: String,
    #[serde(default)]
    pub user_id: UserId,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub severity: NotificationSeverity,
    #[serde(default)]
    pub priority: NotificationPriority,
    #[serde(default)]
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

/// Identifies one leaderboard, e.g. `xp` / `weekly`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoardKey {
    pub board_type: String,
    pub period: String,
}

impl BoardKey {
    pub fn new(board_type: impl Into<String>, period: impl Into<String>) -> Self {
        Self {
            board_type: board_type.into(),
            period: period.into(),
        }
    }

    /// Room id used on the leaderboards channel.
    pub fn room_id(&self) -> String {
        format!("{}:{}", self.board_type, self.period)
    }
}

impl fmt::Display for BoardKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.board_type, self.period)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingEntry {
    pub user_id: UserId,
    pub display_name: String,
    pub rank: u32,
    pub score: f64,
}

/// A joined sub-topic within a channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Room {
    pub room_id: String,
    pub participants: u32,
    pub last_update: DateTime<Utc>,
}

impl Room {
    pub fn joined(room_id: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            room_id: room_id.into(),
            participants: 0,
            last_update: at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anonymous_sentinel_is_zero() {
        assert!(UserId::ANONYMOUS.is_anonymous());
        assert!(!UserId(7).is_anonymous());
        assert_eq!(UserId::default(), UserId::ANONYMOUS);
    }

    #[test]
    fn board_room_id_joins_type_and_period() {
        let key = BoardKey::new("xp", "weekly");
        assert_eq!(key.room_id(), "xp:weekly");
        assert_eq!(key.to_string(), "xp/weekly");
    }

    #[test]
    fn challenge_completion_is_clamped() {
        let mut challenge = ChallengeProgress {
            id: "c1".into(),
            title: "Save 500".into(),
            current_amount: 250.0,
            target_amount: 500.0,
            participants: 3,
        };
        assert_eq!(challenge.completion(), 0.5);
        challenge.current_amount = 900.0;
        assert_eq!(challenge.completion(), 1.0);
        challenge.target_amount = 0.0;
        assert_eq!(challenge.completion(), 0.0);
    }

    #[test]
    fn user_id_serializes_as_plain_number() {
        let json = serde_json::to_string(&UserId(42)).unwrap();
        assert_eq!(json, "42");
    }
}
