//! Typed inbound events and outbound commands for each realtime channel.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::{BoardKey, NotificationItem, RankingEntry, UserId};
use crate::protocol::{ChannelCommand, ChannelEvent};

// --- Gaming ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum GamingEvent {
    PlayerJoined {
        user_id: UserId,
        display_name: String,
        #[serde(default)]
        level: u32,
    },
    PlayerLeft {
        user_id: UserId,
    },
    ChallengeUpdate {
        challenge_id: String,
        user_id: UserId,
        #[serde(default)]
        display_name: String,
        contribution: f64,
        new_amount: f64,
    },
    TeamAction {
        user_id: UserId,
        #[serde(default)]
        display_name: String,
        action_type: String,
        #[serde(default)]
        data: Value,
    },
    XpGained {
        user_id: UserId,
        amount: u64,
        total_xp: u64,
        #[serde(default)]
        reason: String,
    },
    LevelUp {
        user_id: UserId,
        #[serde(default)]
        display_name: String,
        new_level: u32,
    },
    StreakUpdate {
        user_id: UserId,
        streak_type: String,
        count: u32,
    },
    AchievementUnlocked {
        user_id: UserId,
        #[serde(default)]
        display_name: String,
        achievement_id: String,
        title: String,
    },
    RoomState {
        room_id: String,
        participants: u32,
    },
}

impl ChannelEvent for GamingEvent {
    const NAMES: &'static [&'static str] = &[
        "player_joined",
        "player_left",
        "challenge_update",
        "team_action",
        "xp_gained",
        "level_up",
        "streak_update",
        "achievement_unlocked",
        "room_state",
    ];

    fn name(&self) -> &'static str {
        match self {
            GamingEvent::PlayerJoined { .. } => "player_joined",
            GamingEvent::PlayerLeft { .. } => "player_left",
            GamingEvent::ChallengeUpdate { .. } => "challenge_update",
            GamingEvent::TeamAction { .. } => "team_action",
            GamingEvent::XpGained { .. } => "xp_gained",
            GamingEvent::LevelUp { .. } => "level_up",
            GamingEvent::StreakUpdate { .. } => "streak_update",
            GamingEvent::AchievementUnlocked { .. } => "achievement_unlocked",
            GamingEvent::RoomState { .. } => "room_state",
        }
    }
}

impl GamingEvent {
    /// The player the event is about, if any.
    pub fn user_id(&self) -> Option<UserId> {
        match self {
            GamingEvent::PlayerJoined { user_id, .. }
            | GamingEvent::PlayerLeft { user_id }
            | GamingEvent::ChallengeUpdate { user_id, .. }
            | GamingEvent::TeamAction { user_id, .. }
            | GamingEvent::XpGained { user_id, .. }
            | GamingEvent::LevelUp { user_id, .. }
            | GamingEvent::StreakUpdate { user_id, .. }
            | GamingEvent::AchievementUnlocked { user_id, .. } => Some(*user_id),
            GamingEvent::RoomState { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", content = "payload", rename_all = "snake_case")]
pub enum GamingCommand {
    JoinRoom { room_type: String, room_id: String },
    LeaveRoom { room_id: String },
    Contribute { challenge_id: String, amount: f64 },
    TeamAction { action_type: String, data: Value },
    RequestSnapshot {},
}

impl ChannelCommand for GamingCommand {
    fn action(&self) -> &'static str {
        match self {
            GamingCommand::JoinRoom { .. } => "join_room",
            GamingCommand::LeaveRoom { .. } => "leave_room",
            GamingCommand::Contribute { .. } => "contribute",
            GamingCommand::TeamAction { .. } => "team_action",
            GamingCommand::RequestSnapshot {} => "request_snapshot",
        }
    }
}

// --- Notifications ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum NotificationEvent {
    Notification(NotificationItem),
    NotificationRead {
        id: String,
    },
    NotificationsCleared {
        #[serde(default = "Utc::now")]
        cleared_at: DateTime<Utc>,
    },
    UnreadCount {
        count: u32,
    },
}

impl ChannelEvent for NotificationEvent {
    const NAMES: &'static [&'static str] = &[
        "notification",
        "notification_read",
        "notifications_cleared",
        "unread_count",
    ];

    fn name(&self) -> &'static str {
        match self {
            NotificationEvent::Notification(_) => "notification",
            NotificationEvent::NotificationRead { .. } => "notification_read",
            NotificationEvent::NotificationsCleared { .. } => "notifications_cleared",
            NotificationEvent::UnreadCount { .. } => "unread_count",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", content = "payload", rename_all = "snake_case")]
pub enum NotificationCommand {
    Subscribe {},
    MarkRead { id: String },
    MarkAllRead {},
}

impl ChannelCommand for NotificationCommand {
    fn action(&self) -> &'static str {
        match self {
            NotificationCommand::Subscribe {} => "subscribe",
            NotificationCommand::MarkRead { .. } => "mark_read",
            NotificationCommand::MarkAllRead {} => "mark_all_read",
        }
    }
}

// --- Leaderboards ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum LeaderboardEvent {
    RankingUpdate {
        board: BoardKey,
        user_id: UserId,
        display_name: String,
        rank: u32,
        score: f64,
        #[serde(default)]
        previous_rank: Option<u32>,
    },
    LeaderboardSnapshot {
        board: BoardKey,
        entries: Vec<RankingEntry>,
    },
    RoomState {
        room_id: String,
        participants: u32,
    },
}

impl ChannelEvent for LeaderboardEvent {
    const NAMES: &'static [&'static str] = &["ranking_update", "leaderboard_snapshot", "room_state"];

    fn name(&self) -> &'static str {
        match self {
            LeaderboardEvent::RankingUpdate { .. } => "ranking_update",
            LeaderboardEvent::LeaderboardSnapshot { .. } => "leaderboard_snapshot",
            LeaderboardEvent::RoomState { .. } => "room_state",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", content = "payload", rename_all = "snake_case")]
pub enum LeaderboardCommand {
    JoinRoom { board: BoardKey },
    LeaveRoom { board: BoardKey },
    RequestSnapshot { board: BoardKey },
}

impl ChannelCommand for LeaderboardCommand {
    fn action(&self) -> &'static str {
        match self {
            LeaderboardCommand::JoinRoom { .. } => "join_room",
            LeaderboardCommand::LeaveRoom { .. } => "leave_room",
            LeaderboardCommand::RequestSnapshot { .. } => "request_snapshot",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{InboundFrame, OutboundFrame};
    use serde_json::json;

    #[test]
    fn gaming_names_match_decoded_variants() {
        let samples = [
            ("player_joined", json!({"user_id": 1, "display_name": "ana"})),
            ("player_left", json!({"user_id": 1})),
            (
                "challenge_update",
                json!({"challenge_id": "c", "user_id": 2, "contribution": 5.0, "new_amount": 50.0}),
            ),
            ("team_action", json!({"user_id": 3, "action_type": "cheer"})),
            ("xp_gained", json!({"user_id": 1, "amount": 10, "total_xp": 110})),
            ("level_up", json!({"user_id": 1, "new_level": 4})),
            ("streak_update", json!({"user_id": 1, "streak_type": "daily", "count": 6})),
            (
                "achievement_unlocked",
                json!({"user_id": 1, "achievement_id": "a1", "title": "Saver"}),
            ),
            ("room_state", json!({"room_id": "r", "participants": 4})),
        ];
        assert_eq!(samples.len(), GamingEvent::NAMES.len());
        for (name, payload) in samples {
            let event: GamingEvent = InboundFrame::new(name, payload).decode().unwrap();
            assert_eq!(event.name(), name);
        }
    }

    #[test]
    fn notification_payload_is_the_item() {
        let frame = InboundFrame::new(
            "notification",
            json!({
                "user_id": 9,
                "id": "n1",
                "title": "Budget",
                "message": "You hit 90% of groceries",
                "severity": "warning",
                "created_at": "2024-05-01T10:00:00Z"
            }),
        );
        let event: NotificationEvent = frame.decode().unwrap();
        match event {
            NotificationEvent::Notification(item) => {
                assert_eq!(item.user_id, UserId(9));
                assert_eq!(item.id, "n1");
                assert!(!item.read);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn cleared_event_accepts_empty_payload() {
        let event: NotificationEvent = InboundFrame::new("notifications_cleared", json!({}))
            .decode()
            .unwrap();
        assert_eq!(event.name(), "notifications_cleared");
    }

    #[test]
    fn command_action_matches_wire_tag() {
        let commands = [
            GamingCommand::JoinRoom {
                room_type: "challenge".into(),
                room_id: "c1".into(),
            },
            GamingCommand::Contribute {
                challenge_id: "c1".into(),
                amount: 150.0,
            },
            GamingCommand::RequestSnapshot {},
        ];
        for cmd in commands {
            let frame = OutboundFrame::from_command("gaming", &cmd).unwrap();
            assert_eq!(frame.action, cmd.action());
        }

        let frame = OutboundFrame::from_command(
            "leaderboards",
            &LeaderboardCommand::JoinRoom {
                board: BoardKey::new("xp", "weekly"),
            },
        )
        .unwrap();
        assert_eq!(frame.action, "join_room");
        assert_eq!(frame.payload["board"]["period"], "weekly");
    }

    #[test]
    fn room_state_has_no_subject_user() {
        let event = GamingEvent::RoomState {
            room_id: "r".into(),
            participants: 2,
        };
        assert_eq!(event.user_id(), None);
    }
}
