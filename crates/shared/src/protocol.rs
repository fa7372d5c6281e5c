//! Realtime wire protocol: frame shapes, channel topics and signing helpers.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Header names used for signed REST requests.
pub const HEADER_SIGNATURE: &str = "X-Ledgerplay-Signature";
pub const HEADER_ACTOR: &str = "X-Ledgerplay-Actor";
pub const HEADER_TIMESTAMP: &str = "X-Ledgerplay-Timestamp";

/// The logical realtime topics the client multiplexes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Gaming,
    Notifications,
    Leaderboards,
}

impl ChannelKind {
    pub const ALL: [ChannelKind; 3] = [
        ChannelKind::Gaming,
        ChannelKind::Notifications,
        ChannelKind::Leaderboards,
    ];

    pub fn topic(self) -> &'static str {
        match self {
            ChannelKind::Gaming => "gaming",
            ChannelKind::Notifications => "notifications",
            ChannelKind::Leaderboards => "leaderboards",
        }
    }

    /// Endpoint path on the realtime gateway.
    pub fn path(self) -> &'static str {
        match self {
            ChannelKind::Gaming => "/gaming",
            ChannelKind::Notifications => "/notifications",
            ChannelKind::Leaderboards => "/leaderboards",
        }
    }

    pub fn from_topic(topic: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.topic() == topic)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed frame: {0}")]
    Malformed(String),
    #[error("unknown event '{0}'")]
    UnknownEvent(String),
    #[error("payload for '{event}' did not match: {reason}")]
    Payload { event: String, reason: String },
}

/// A message sent by the client: `{ topic, action, payload }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundFrame {
    pub id: String,
    pub topic: String,
    pub action: String,
    #[serde(default)]
    pub payload: Value,
    pub ts: DateTime<Utc>,
}

impl OutboundFrame {
    pub fn new(topic: impl Into<String>, action: impl Into<String>, payload: Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            topic: topic.into(),
            action: action.into(),
            payload,
            ts: Utc::now(),
        }
    }

    /// Split a tagged command into its action name and payload.
    pub fn from_command<C: ChannelCommand>(topic: &str, command: &C) -> Result<Self, ProtocolError> {
        let value =
            serde_json::to_value(command).map_err(|e| ProtocolError::Malformed(e.to_string()))?;
        let Value::Object(mut map) = value else {
            return Err(ProtocolError::Malformed("command is not an object".into()));
        };
        let action = match map.remove("action") {
            Some(Value::String(action)) => action,
            _ => return Err(ProtocolError::Malformed("command has no action tag".into())),
        };
        let payload = map.remove("payload").unwrap_or_else(|| Value::Object(Map::new()));
        Ok(Self::new(topic, action, payload))
    }

    /// Add a field to an object payload; non-object payloads are left alone.
    pub fn with_field(mut self, key: &str, value: Value) -> Self {
        if let Value::Object(map) = &mut self.payload {
            map.insert(key.to_string(), value);
        }
        self
    }
}

/// A message received from the gateway: `{ event_name, payload }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundFrame {
    pub event_name: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(skip, default = "Utc::now")]
    pub received_at: DateTime<Utc>,
}

impl InboundFrame {
    pub fn new(event_name: impl Into<String>, payload: Value) -> Self {
        Self {
            event_name: event_name.into(),
            payload,
            received_at: Utc::now(),
        }
    }

    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(raw).map_err(|e| ProtocolError::Malformed(e.to_string()))
    }

    /// Decode into the closed event set of a channel.
    pub fn decode<E: ChannelEvent>(&self) -> Result<E, ProtocolError> {
        if !E::NAMES.contains(&self.event_name.as_str()) {
            return Err(ProtocolError::UnknownEvent(self.event_name.clone()));
        }
        let mut tagged = Map::new();
        tagged.insert("event".into(), Value::String(self.event_name.clone()));
        tagged.insert("payload".into(), self.payload.clone());
        serde_json::from_value(Value::Object(tagged)).map_err(|e| ProtocolError::Payload {
            event: self.event_name.clone(),
            reason: e.to_string(),
        })
    }
}

/// Closed set of inbound events for one channel.
///
/// Implementors are serde enums tagged as `#[serde(tag = "event", content = "payload")]`
/// so that `InboundFrame::decode` can rebuild them from a frame.
pub trait ChannelEvent: DeserializeOwned + Send + 'static {
    /// Every wire name the enum accepts.
    const NAMES: &'static [&'static str];

    fn name(&self) -> &'static str;
}

/// Outbound command enums, tagged as `#[serde(tag = "action", content = "payload")]`.
pub trait ChannelCommand: Serialize {
    fn action(&self) -> &'static str;
}

/// Canonical string signed for gateway and REST requests.
/// Format: `{METHOD}\n{PATH}\n{TIMESTAMP}\n{BODY_SHA256_HEX}`
pub fn signature_base(method: &str, path: &str, timestamp: &str, body: &[u8]) -> String {
    let body_hash = hex::encode(Sha256::digest(body));
    format!("{}\n{}\n{}\n{}", method, path, timestamp, body_hash)
}
