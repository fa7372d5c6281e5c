//! REST client used for authoritative refreshes.

use std::sync::Arc;

use async_trait::async_trait;
use ledgerplay_shared::{
    ApiEnvelope, ApiError, BoardKey, ChallengeProgress, NotificationItem, PlayerProgress,
    RankingEntry, HEADER_ACTOR, HEADER_SIGNATURE, HEADER_TIMESTAMP,
};
use reqwest::Client;
use serde::de::DeserializeOwned;

use crate::client_keys::sign_request;
use crate::identity::{IdentityProvider, SessionIdentity};

/// Read-only REST endpoints the bridges reconcile against.
#[async_trait]
pub trait RealtimeApi: Send + Sync {
    async fn active_challenges(&self) -> Result<Vec<ChallengeProgress>, ApiError>;

    async fn player_progress(&self) -> Result<PlayerProgress, ApiError>;

    async fn notifications(&self) -> Result<Vec<NotificationItem>, ApiError>;

    async fn leaderboard(&self, board: &BoardKey) -> Result<Vec<RankingEntry>, ApiError>;
}

/// HTTP client that signs requests with the session's device key.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    session: Option<Arc<SessionIdentity>>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            session: None,
        }
    }

    /// Sign every request with the keys of the current session, if it has any.
    pub fn with_session(mut self, session: Arc<SessionIdentity>) -> Self {
        self.session = Some(session);
        self
    }

    fn url(&self, path: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        format!("{base}/{path}")
    }

    /// Signed GET that unwraps the `{ success, data, error }` envelope.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let url = self.url(path);
        let mut rb = self.client.get(&url);

        if let Some(session) = &self.session {
            if let Some(keys) = session.keys() {
                let path_only = reqwest::Url::parse(&url)
                    .map(|u| u.path().to_string())
                    .unwrap_or_else(|_| path.to_string());
                let user_id = session.current().user_id;
                if let Some(headers) = sign_request("GET", &path_only, &[], &keys, user_id) {
                    rb = rb
                        .header(HEADER_ACTOR, headers.actor.clone())
                        .header(HEADER_TIMESTAMP, headers.timestamp.clone())
                        .header(HEADER_SIGNATURE, headers.signature_header());
                }
            }
        }

        let resp = rb.send().await.map_err(|e| ApiError::Network(e.to_string()))?;
        let status = resp.status().as_u16();
        let is_success = resp.status().is_success();
        let text = resp
            .text()
            .await
            .map_err(|e| ApiError::Network(format!("failed to read body: {e}")))?;

        if !is_success {
            return Err(ApiError::Http { status, body: text });
        }

        serde_json::from_str::<ApiEnvelope<T>>(&text)
            .map_err(|e| ApiError::Deserialize(e.to_string()))?
            .into_result()
    }
}

#[async_trait]
impl RealtimeApi for ApiClient {
    async fn active_challenges(&self) -> Result<Vec<ChallengeProgress>, ApiError> {
        self.get_json("/api/gaming/challenges/active").await
    }

    async fn player_progress(&self) -> Result<PlayerProgress, ApiError> {
        self.get_json("/api/gaming/progress").await
    }

    async fn notifications(&self) -> Result<Vec<NotificationItem>, ApiError> {
        self.get_json("/api/notifications").await
    }

    async fn leaderboard(&self, board: &BoardKey) -> Result<Vec<RankingEntry>, ApiError> {
        self.get_json(&format!(
            "/api/leaderboards/{}/{}",
            urlencoding::encode(&board.board_type),
            urlencoding::encode(&board.period)
        ))
        .await
    }
}
