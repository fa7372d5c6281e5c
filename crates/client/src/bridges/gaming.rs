//! Gaming bridge: players, community challenges, XP and streaks.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ledgerplay_shared::{
    ChallengeProgress, ChannelKind, GamingCommand, GamingEvent, PlayerPresence, PlayerProgress,
    Room, UserId,
};
use serde_json::Value;

use super::core::{BridgeCore, Notice};
use super::{BridgeContext, BridgeError, BridgeMetrics, DomainBridge};
use crate::config::RealtimeConfig;
use crate::history::BoundedHistory;
use crate::identity::{attribute, Attribution};
use crate::notify::{format_amount, Severity};
use crate::sync::lock;
use crate::ws::{ChannelClient, ConnectionState, Delivery};

pub const DEFAULT_ROOM_TYPE: &str = "community";
pub const DEFAULT_ROOM_ID: &str = "global";

#[derive(Debug, Clone, PartialEq)]
pub struct GamingActivity {
    pub event: GamingEvent,
    pub attribution: Attribution,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct GamingState {
    pub active_players: HashMap<UserId, PlayerPresence>,
    pub challenges: HashMap<String, ChallengeProgress>,
    pub progress: PlayerProgress,
    pub rooms: HashMap<String, Room>,
    pub history: BoundedHistory<GamingActivity>,
}

impl GamingState {
    pub fn new(history_capacity: usize) -> Self {
        Self {
            active_players: HashMap::new(),
            challenges: HashMap::new(),
            progress: PlayerProgress::default(),
            rooms: HashMap::new(),
            history: BoundedHistory::new(history_capacity),
        }
    }

    fn challenge_title(&self, challenge_id: &str) -> String {
        self.challenges
            .get(challenge_id)
            .map_or_else(|| challenge_id.to_string(), |c| c.title.clone())
    }
}

/// Fold one inbound event into the state and return the notices it warrants.
pub fn apply(
    state: &mut GamingState,
    event: GamingEvent,
    session: UserId,
    materiality_threshold: f64,
) -> Vec<Notice> {
    let now = Utc::now();
    let attribution = event
        .user_id()
        .map_or(Attribution::Community, |subject| attribute(session, subject));
    let own = attribution == Attribution::Own;
    let mut notices = Vec::new();

    match &event {
        GamingEvent::PlayerJoined {
            user_id,
            display_name,
            level,
        } => {
            state.active_players.insert(
                *user_id,
                PlayerPresence {
                    user_id: *user_id,
                    display_name: display_name.clone(),
                    level: *level,
                    joined_at: now,
                },
            );
        }
        GamingEvent::PlayerLeft { user_id } => {
            state.active_players.remove(user_id);
        }
        GamingEvent::ChallengeUpdate {
            challenge_id,
            display_name,
            contribution,
            new_amount,
            ..
        } => {
            if let Some(challenge) = state.challenges.get_mut(challenge_id) {
                challenge.current_amount = *new_amount;
            }
            if !own && *contribution >= materiality_threshold {
                let who = if display_name.is_empty() {
                    "A teammate"
                } else {
                    display_name.as_str()
                };
                notices.push(Notice::new(
                    Severity::Info,
                    "Community challenge",
                    format!(
                        "{} contributed {} to {}",
                        who,
                        format_amount(*contribution),
                        state.challenge_title(challenge_id)
                    ),
                ));
            }
        }
        GamingEvent::TeamAction { .. } => {}
        GamingEvent::XpGained { total_xp, .. } => {
            if own {
                state.progress.xp_total = *total_xp;
            }
        }
        GamingEvent::LevelUp {
            user_id, new_level, ..
        } => {
            if let Some(player) = state.active_players.get_mut(user_id) {
                player.level = *new_level;
            }
            if own {
                state.progress.level = *new_level;
                notices.push(Notice::new(
                    Severity::Success,
                    "Level up",
                    format!("You reached level {}!", new_level),
                ));
            }
        }
        GamingEvent::StreakUpdate {
            streak_type, count, ..
        } => {
            if own {
                state.progress.streaks.insert(streak_type.clone(), *count);
            }
        }
        GamingEvent::AchievementUnlocked { title, .. } => {
            if own {
                notices.push(Notice::new(
                    Severity::Success,
                    "Achievement unlocked",
                    title.clone(),
                ));
            }
        }
        GamingEvent::RoomState {
            room_id,
            participants,
        } => {
            if let Some(room) = state.rooms.get_mut(room_id) {
                room.participants = *participants;
                room.last_update = now;
            }
        }
    }

    state.history.push(GamingActivity {
        event,
        attribution,
        at: now,
    });
    notices
}

pub struct GamingBridge {
    core: BridgeCore,
    state: Arc<Mutex<GamingState>>,
    materiality_threshold: f64,
}

impl GamingBridge {
    pub fn new(channel: ChannelClient, context: BridgeContext, config: &RealtimeConfig) -> Self {
        Self {
            core: BridgeCore::new(ChannelKind::Gaming, channel, context),
            state: Arc::new(Mutex::new(GamingState::new(config.gaming_history))),
            materiality_threshold: config.materiality_threshold,
        }
    }

    /// Snapshot of the bridge state.
    pub fn state(&self) -> GamingState {
        lock(&self.state).clone()
    }

    pub fn challenge(&self, challenge_id: &str) -> Option<ChallengeProgress> {
        lock(&self.state).challenges.get(challenge_id).cloned()
    }

    fn register_handlers(&self) {
        let state = self.state.clone();
        let identity = self.core.identity();
        let notifier = self.core.notifier();
        let threshold = self.materiality_threshold;
        self.core.subscribe_events::<GamingEvent, _>(move |event| {
            let session = identity.current().user_id;
            let notices = apply(&mut lock(&state), event, session, threshold);
            for notice in notices {
                notice.deliver(notifier.as_ref());
            }
            Ok(())
        });

        let state = self.state.clone();
        self.core.channel().on_link_lost(move || {
            let mut state = lock(&state);
            state.rooms.clear();
            state.active_players.clear();
        });
    }

    pub fn join_room(&self, room_type: &str, room_id: &str) -> Result<Delivery, BridgeError> {
        let delivery = self.core.send_queued(&GamingCommand::JoinRoom {
            room_type: room_type.to_string(),
            room_id: room_id.to_string(),
        })?;
        lock(&self.state)
            .rooms
            .insert(room_id.to_string(), Room::joined(room_id, Utc::now()));
        Ok(delivery)
    }

    pub fn leave_room(&self, room_id: &str) -> Result<(), BridgeError> {
        lock(&self.state).rooms.remove(room_id);
        if self.core.channel().is_connected() {
            self.core.send_now(&GamingCommand::LeaveRoom {
                room_id: room_id.to_string(),
            })?;
        }
        Ok(())
    }

    /// Contribute to a community challenge.
    ///
    /// The cached amount moves immediately; the next `challenge_update` or
    /// REST refresh overwrites it with the server total.
    pub fn contribute(&self, challenge_id: &str, amount: f64) -> Result<Delivery, BridgeError> {
        if !amount.is_finite() || amount <= 0.0 {
            return Err(BridgeError::Precondition(format!(
                "contribution must be positive, got {amount}"
            )));
        }

        let delivery = self.core.send_queued(&GamingCommand::Contribute {
            challenge_id: challenge_id.to_string(),
            amount,
        })?;

        let title = {
            let mut state = lock(&self.state);
            if let Some(challenge) = state.challenges.get_mut(challenge_id) {
                challenge.current_amount += amount;
            }
            state.challenge_title(challenge_id)
        };

        let mut message = format!("You contributed {} to {}", format_amount(amount), title);
        if delivery == Delivery::Queued {
            message.push_str(" (will sync when back online)");
        }
        self.core
            .notify(Notice::new(Severity::Success, "Contribution sent", message));
        Ok(delivery)
    }

    /// Fire-and-forget team broadcast; fails when offline.
    pub fn broadcast_action(&self, action_type: &str, data: Value) -> Result<(), BridgeError> {
        self.core.send_now(&GamingCommand::TeamAction {
            action_type: action_type.to_string(),
            data,
        })
    }

    pub fn request_snapshot(&self) -> Result<(), BridgeError> {
        self.core.send_now(&GamingCommand::RequestSnapshot {})
    }

    /// Replace cached challenges and progress with the REST view.
    pub async fn refresh_challenges(&self) -> Result<(), BridgeError> {
        let challenges = self.core.api().active_challenges().await?;
        let progress = self.core.api().player_progress().await?;
        let mut state = lock(&self.state);
        state.challenges = challenges
            .into_iter()
            .map(|challenge| (challenge.id.clone(), challenge))
            .collect();
        state.progress = progress;
        Ok(())
    }
}

#[async_trait]
impl DomainBridge for GamingBridge {
    fn name(&self) -> &'static str {
        "gaming"
    }

    fn kind(&self) -> ChannelKind {
        self.core.kind()
    }

    async fn init(&self) -> Result<(), BridgeError> {
        self.core.connect().await?;
        if self.core.begin_subscription() {
            self.register_handlers();
        }
        self.join_room(DEFAULT_ROOM_TYPE, DEFAULT_ROOM_ID)?;
        self.request_snapshot()?;
        crate::log_info!("Gaming bridge ready");
        Ok(())
    }

    fn connection_state(&self) -> ConnectionState {
        self.core.channel().state()
    }

    fn metrics(&self) -> BridgeMetrics {
        let state = lock(&self.state);
        BridgeMetrics {
            connected: self.core.channel().is_connected(),
            messages_sent: self.core.messages_sent(),
            events_received: self.core.events_received(),
            active_players: state.active_players.len(),
            queued_notifications: 0,
            subscribed_rooms: state.rooms.len(),
            history_len: state.history.len(),
        }
    }

    fn teardown(&self) {
        self.core.teardown();
        let mut state = lock(&self.state);
        state.rooms.clear();
        state.active_players.clear();
    }

    async fn reconcile(&self) -> Result<(), BridgeError> {
        self.refresh_challenges().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridges::testing::{harness, settle, Harness};
    use crate::identity::StaticIdentity;
    use crate::ws::LoopbackConnector;
    use serde_json::json;

    fn challenge(id: &str, current: f64) -> ChallengeProgress {
        ChallengeProgress {
            id: id.into(),
            title: "Emergency fund".into(),
            current_amount: current,
            target_amount: 1000.0,
            participants: 3,
        }
    }

    fn bridge(gateway: &LoopbackConnector, identity: StaticIdentity) -> (GamingBridge, Harness) {
        let h = harness(identity);
        let channel = ChannelClient::new("/gaming", Arc::new(gateway.clone()));
        let bridge = GamingBridge::new(channel, h.context.clone(), &RealtimeConfig::default());
        (bridge, h)
    }

    #[tokio::test]
    async fn init_subscribes_once_and_hydrates() {
        let gateway = LoopbackConnector::new();
        let (bridge, _h) = bridge(&gateway, StaticIdentity::user(7, "kim", 2));

        bridge.init().await.unwrap();
        bridge.init().await.unwrap();

        assert_eq!(bridge.core.channel().handler_count("player_joined"), 1);
        let actions: Vec<_> = gateway.sent("/gaming").into_iter().map(|f| f.action).collect();
        assert_eq!(
            actions,
            vec!["join_room", "request_snapshot", "join_room", "request_snapshot"]
        );
        assert_eq!(bridge.metrics().subscribed_rooms, 1);
    }

    #[tokio::test]
    async fn contribution_is_optimistic_then_reconciled() {
        let gateway = LoopbackConnector::new();
        let (bridge, h) = bridge(&gateway, StaticIdentity::user(7, "kim", 2));
        h.api.challenges.lock().unwrap().push(challenge("c1", 500.0));
        bridge.init().await.unwrap();
        bridge.reconcile().await.unwrap();
        h.toasts.drain();

        bridge.contribute("c1", 150.0).unwrap();
        assert_eq!(bridge.challenge("c1").unwrap().current_amount, 650.0);
        let toasts = h.toasts.drain();
        assert_eq!(toasts.len(), 1);
        assert_eq!(toasts[0].severity, Severity::Success);
        assert!(toasts[0].message.contains("150.00"));

        let sent = gateway.sent("/gaming");
        let contribute = sent.iter().find(|f| f.action == "contribute").unwrap();
        assert_eq!(contribute.payload["amount"], 150.0);
        assert_eq!(contribute.payload["actor"]["user_id"], 7);

        gateway.emit(
            "/gaming",
            "challenge_update",
            json!({"challenge_id": "c1", "user_id": 7, "contribution": 150.0, "new_amount": 640.0}),
        );
        settle().await;
        assert_eq!(bridge.challenge("c1").unwrap().current_amount, 640.0);
        assert!(h.toasts.is_empty());
    }

    #[tokio::test]
    async fn offline_contribution_is_queued_and_flushed() {
        let gateway = LoopbackConnector::new();
        let (bridge, h) = bridge(&gateway, StaticIdentity::user(7, "kim", 2));

        assert_eq!(bridge.contribute("c9", 25.0).unwrap(), Delivery::Queued);
        assert!(h.toasts.drain()[0].message.contains("back online"));
        assert!(matches!(
            bridge.contribute("c9", -1.0),
            Err(BridgeError::Precondition(_))
        ));

        bridge.init().await.unwrap();
        let actions: Vec<_> = gateway.sent("/gaming").into_iter().map(|f| f.action).collect();
        assert_eq!(actions[0], "contribute");
    }

    #[tokio::test]
    async fn broadcast_requires_connection() {
        let gateway = LoopbackConnector::new();
        let (bridge, _h) = bridge(&gateway, StaticIdentity::user(7, "kim", 2));
        assert!(matches!(
            bridge.broadcast_action("cheer", json!({})),
            Err(BridgeError::Channel(_))
        ));
    }

    #[test]
    fn material_community_contributions_raise_a_notice() {
        let mut state = GamingState::new(100);
        state.challenges.insert("c1".into(), challenge("c1", 0.0));
        let update = |user: u64, contribution: f64| GamingEvent::ChallengeUpdate {
            challenge_id: "c1".into(),
            user_id: UserId(user),
            display_name: "ana".into(),
            contribution,
            new_amount: contribution,
        };

        assert!(apply(&mut state, update(3, 99.99), UserId(7), 100.0).is_empty());
        let notices = apply(&mut state, update(3, 100.0), UserId(7), 100.0);
        assert_eq!(notices.len(), 1);
        assert!(notices[0].message.contains("ana contributed 100.00 to Emergency fund"));
        assert!(apply(&mut state, update(7, 500.0), UserId(7), 100.0).is_empty());
        assert_eq!(state.challenges["c1"].current_amount, 500.0);
    }

    #[test]
    fn own_progress_events_update_player_progress() {
        let mut state = GamingState::new(100);
        let me = UserId(7);
        apply(
            &mut state,
            GamingEvent::XpGained {
                user_id: me,
                amount: 10,
                total_xp: 310,
                reason: "budget kept".into(),
            },
            me,
            100.0,
        );
        apply(
            &mut state,
            GamingEvent::StreakUpdate {
                user_id: me,
                streak_type: "daily".into(),
                count: 6,
            },
            me,
            100.0,
        );
        let notices = apply(
            &mut state,
            GamingEvent::LevelUp {
                user_id: me,
                display_name: "kim".into(),
                new_level: 5,
            },
            me,
            100.0,
        );
        apply(
            &mut state,
            GamingEvent::XpGained {
                user_id: UserId(8),
                amount: 10,
                total_xp: 9999,
                reason: String::new(),
            },
            me,
            100.0,
        );

        assert_eq!(state.progress.xp_total, 310);
        assert_eq!(state.progress.level, 5);
        assert_eq!(state.progress.streaks["daily"], 6);
        assert_eq!(notices[0].severity, Severity::Success);
        assert_eq!(state.history.len(), 4);
        assert_eq!(state.history.latest().unwrap().attribution, Attribution::Community);
    }

    #[test]
    fn anonymous_session_treats_sentinel_events_as_community() {
        let mut state = GamingState::new(100);
        let notices = apply(
            &mut state,
            GamingEvent::AchievementUnlocked {
                user_id: UserId::ANONYMOUS,
                display_name: String::new(),
                achievement_id: "a1".into(),
                title: "First budget".into(),
            },
            UserId::ANONYMOUS,
            100.0,
        );
        assert!(notices.is_empty());
        assert_eq!(
            state.history.latest().unwrap().attribution,
            Attribution::Community
        );
    }

    #[test]
    fn history_is_bounded() {
        let mut state = GamingState::new(100);
        for n in 0..150 {
            apply(
                &mut state,
                GamingEvent::PlayerLeft { user_id: UserId(n) },
                UserId(1),
                100.0,
            );
        }
        assert_eq!(state.history.len(), 100);
        assert_eq!(
            state.history.latest().unwrap().event,
            GamingEvent::PlayerLeft {
                user_id: UserId(149)
            }
        );
    }

    #[tokio::test]
    async fn team_action_burst_keeps_latest_hundred_in_arrival_order() {
        let gateway = LoopbackConnector::new();
        let (bridge, _h) = bridge(&gateway, StaticIdentity::user(7, "kim", 2));
        bridge.init().await.unwrap();

        for seq in 0..120u64 {
            assert!(gateway.emit(
                "/gaming",
                "team_action",
                json!({
                    "user_id": 12,
                    "display_name": "ana",
                    "action_type": "cheer",
                    "data": {"seq": seq}
                }),
            ));
        }
        settle().await;

        let state = bridge.state();
        assert_eq!(state.history.len(), 100);
        let order: Vec<u64> = state
            .history
            .iter()
            .map(|activity| match &activity.event {
                GamingEvent::TeamAction { data, .. } => data["seq"].as_u64().unwrap(),
                other => panic!("unexpected activity {other:?}"),
            })
            .collect();
        assert_eq!(order, (20..120).rev().collect::<Vec<_>>());
        assert_eq!(bridge.metrics().events_received, 120);
    }

    #[tokio::test]
    async fn link_loss_and_teardown_drop_rooms() {
        let gateway = LoopbackConnector::new();
        let (bridge, _h) = bridge(&gateway, StaticIdentity::user(7, "kim", 2));
        bridge.init().await.unwrap();
        gateway.emit(
            "/gaming",
            "player_joined",
            json!({"user_id": 3, "display_name": "ana", "level": 2}),
        );
        settle().await;
        assert_eq!(bridge.metrics().active_players, 1);

        gateway.drop_link("/gaming");
        settle().await;
        assert_eq!(bridge.metrics().subscribed_rooms, 0);
        assert_eq!(bridge.connection_state(), ConnectionState::Disconnected);

        bridge.init().await.unwrap();
        assert_eq!(bridge.metrics().subscribed_rooms, 1);
        bridge.teardown();
        assert_eq!(bridge.metrics().subscribed_rooms, 0);
        assert!(!bridge.core.is_subscribed());
    }
}
