//! Leaderboards bridge: cached boards, joined board rooms and ranking changes.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ledgerplay_shared::{
    BoardKey, ChannelKind, LeaderboardCommand, LeaderboardEvent, RankingEntry, Room, UserId,
};

use super::core::{BridgeCore, Notice};
use super::{BridgeContext, BridgeError, BridgeMetrics, DomainBridge};
use crate::config::RealtimeConfig;
use crate::history::BoundedHistory;
use crate::identity::{attribute, Attribution};
use crate::notify::Severity;
use crate::sync::lock;
use crate::ws::{ChannelClient, ConnectionState, Delivery};

/// Rank at or below which an own improvement is announced.
pub const TOP_RANKS: u32 = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct RankingChange {
    pub board: BoardKey,
    pub user_id: UserId,
    pub display_name: String,
    pub rank: u32,
    pub previous_rank: Option<u32>,
    pub score: f64,
    pub attribution: Attribution,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct LeaderboardState {
    pub boards: HashMap<BoardKey, Vec<RankingEntry>>,
    pub rooms: HashMap<String, Room>,
    pub history: BoundedHistory<RankingChange>,
}

impl LeaderboardState {
    pub fn new(history_capacity: usize) -> Self {
        Self {
            boards: HashMap::new(),
            rooms: HashMap::new(),
            history: BoundedHistory::new(history_capacity),
        }
    }

    fn replace_board(&mut self, board: BoardKey, mut entries: Vec<RankingEntry>) {
        entries.sort_by_key(|entry| entry.rank);
        self.boards.insert(board, entries);
    }
}

pub fn apply(state: &mut LeaderboardState, event: LeaderboardEvent, session: UserId) -> Vec<Notice> {
    match event {
        LeaderboardEvent::RankingUpdate {
            board,
            user_id,
            display_name,
            rank,
            score,
            previous_rank,
        } => {
            let entries = state.boards.entry(board.clone()).or_default();
            let cached_rank = entries
                .iter()
                .find(|entry| entry.user_id == user_id)
                .map(|entry| entry.rank);
            let previous_rank = previous_rank.or(cached_rank);

            entries.retain(|entry| entry.user_id != user_id);
            entries.push(RankingEntry {
                user_id,
                display_name: display_name.clone(),
                rank,
                score,
            });
            entries.sort_by_key(|entry| entry.rank);

            let attribution = attribute(session, user_id);
            let improved = previous_rank.map_or(true, |previous| rank < previous);
            let mut notices = Vec::new();
            if attribution == Attribution::Own && rank <= TOP_RANKS && improved {
                notices.push(Notice::new(
                    Severity::Success,
                    "Leaderboard",
                    format!("You climbed to #{} on the {} board", rank, board),
                ));
            }

            state.history.push(RankingChange {
                board,
                user_id,
                display_name,
                rank,
                previous_rank,
                score,
                attribution,
                at: Utc::now(),
            });
            notices
        }
        LeaderboardEvent::LeaderboardSnapshot { board, entries } => {
            state.replace_board(board, entries);
            Vec::new()
        }
        LeaderboardEvent::RoomState {
            room_id,
            participants,
        } => {
            if let Some(room) = state.rooms.get_mut(&room_id) {
                room.participants = participants;
                room.last_update = Utc::now();
            }
            Vec::new()
        }
    }
}

pub struct LeaderboardBridge {
    core: BridgeCore,
    state: Arc<Mutex<LeaderboardState>>,
    default_board: BoardKey,
}

impl LeaderboardBridge {
    pub fn new(channel: ChannelClient, context: BridgeContext, config: &RealtimeConfig) -> Self {
        Self {
            core: BridgeCore::new(ChannelKind::Leaderboards, channel, context),
            state: Arc::new(Mutex::new(LeaderboardState::new(config.leaderboard_history))),
            default_board: BoardKey::new("xp", "weekly"),
        }
    }

    /// Board joined during `init`.
    pub fn with_default_board(mut self, board: BoardKey) -> Self {
        self.default_board = board;
        self
    }

    pub fn state(&self) -> LeaderboardState {
        lock(&self.state).clone()
    }

    pub fn board(&self, board: &BoardKey) -> Vec<RankingEntry> {
        lock(&self.state).boards.get(board).cloned().unwrap_or_default()
    }

    fn register_handlers(&self) {
        let state = self.state.clone();
        let identity = self.core.identity();
        let notifier = self.core.notifier();
        self.core
            .subscribe_events::<LeaderboardEvent, _>(move |event| {
                let session = identity.current().user_id;
                let notices = apply(&mut lock(&state), event, session);
                for notice in notices {
                    notice.deliver(notifier.as_ref());
                }
                Ok(())
            });

        let state = self.state.clone();
        self.core
            .channel()
            .on_link_lost(move || lock(&state).rooms.clear());
    }

    pub fn join_room(&self, board_type: &str, period: &str) -> Result<Delivery, BridgeError> {
        let board = BoardKey::new(board_type, period);
        let room_id = board.room_id();
        let delivery = self.core.send_queued(&LeaderboardCommand::JoinRoom { board })?;
        lock(&self.state)
            .rooms
            .insert(room_id.clone(), Room::joined(room_id, Utc::now()));
        Ok(delivery)
    }

    pub fn leave_room(&self, board: &BoardKey) -> Result<(), BridgeError> {
        lock(&self.state).rooms.remove(&board.room_id());
        if self.core.channel().is_connected() {
            self.core.send_now(&LeaderboardCommand::LeaveRoom {
                board: board.clone(),
            })?;
        }
        Ok(())
    }

    pub fn request_snapshot(&self, board: &BoardKey) -> Result<(), BridgeError> {
        self.core.send_now(&LeaderboardCommand::RequestSnapshot {
            board: board.clone(),
        })
    }

    pub async fn refresh(&self, board: &BoardKey) -> Result<(), BridgeError> {
        let entries = self.core.api().leaderboard(board).await?;
        lock(&self.state).replace_board(board.clone(), entries);
        Ok(())
    }
}

#[async_trait]
impl DomainBridge for LeaderboardBridge {
    fn name(&self) -> &'static str {
        "leaderboards"
    }

    fn kind(&self) -> ChannelKind {
        self.core.kind()
    }

    async fn init(&self) -> Result<(), BridgeError> {
        self.core.connect().await?;
        if self.core.begin_subscription() {
            self.register_handlers();
        }
        let board = self.default_board.clone();
        self.join_room(&board.board_type, &board.period)?;
        self.request_snapshot(&board)?;
        crate::log_info!("Leaderboards bridge ready");
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
            active_players: 0,
            queued_notifications: 0,
            subscribed_rooms: state.rooms.len(),
            history_len: state.history.len(),
        }
    }

    fn teardown(&self) {
        self.core.teardown();
        lock(&self.state).rooms.clear();
    }

    async fn reconcile(&self) -> Result<(), BridgeError> {
        let mut boards: Vec<BoardKey> = lock(&self.state).boards.keys().cloned().collect();
        if !boards.contains(&self.default_board) {
            boards.push(self.default_board.clone());
        }
        for board in boards {
            self.refresh(&board).await?;
        }
        Ok(())
    }
}
