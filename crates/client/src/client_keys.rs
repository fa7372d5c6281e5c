//! Client-side Ed25519 keys and request signing for the gateway and REST API.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::Utc;
use ed25519_dalek::{Signer, SigningKey};
use ledgerplay_shared::{signature_base, UserId};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

/// Ed25519 keypair stored as base64 strings
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct KeyPair {
    pub public_key: String,  // Base64
    pub private_key: String, // Base64
    pub key_id: Option<String>,
}

/// Generate a new Ed25519 keypair
pub fn generate_keypair() -> KeyPair {
    let mut csprng = OsRng;
    let signing_key = SigningKey::generate(&mut csprng);
    let verifying_key = signing_key.verifying_key();

    KeyPair {
        public_key: BASE64.encode(verifying_key.as_bytes()),
        private_key: BASE64.encode(signing_key.to_bytes()),
        key_id: None,
    }
}

fn signing_key(keys: &KeyPair) -> Option<SigningKey> {
    let priv_bytes = BASE64.decode(&keys.private_key).ok()?;
    let priv_arr: [u8; 32] = priv_bytes.try_into().ok()?;
    Some(SigningKey::from_bytes(&priv_arr))
}

fn actor(user_id: UserId) -> String {
    format!("user:{}", user_id)
}

/// Signature headers for REST requests
#[derive(Clone, Debug)]
pub struct SignedHeaders {
    pub actor: String,
    pub key_id: String,
    pub timestamp: String,
    pub signature: String,
}

impl SignedHeaders {
    pub fn signature_header(&self) -> String {
        format!("keyId=\"{}\", signature=\"{}\"", self.key_id, self.signature)
    }
}

/// Sign an HTTP request. Returns `None` for keys that were never registered.
pub fn sign_request(
    method: &str,
    path: &str,
    body: &[u8],
    keys: &KeyPair,
    user_id: UserId,
) -> Option<SignedHeaders> {
    let key_id = keys.key_id.as_ref()?;
    let signing_key = signing_key(keys)?;

    let timestamp = Utc::now().to_rfc3339();
    let canonical = signature_base(method, path, &timestamp, body);
    let signature = signing_key.sign(canonical.as_bytes());

    Some(SignedHeaders {
        actor: actor(user_id),
        key_id: key_id.clone(),
        timestamp,
        signature: BASE64.encode(signature.to_bytes()),
    })
}

/// Channel authentication parameters (passed via query string)
#[derive(Clone, Debug)]
pub struct ChannelAuthParams {
    pub actor: String,
    pub key_id: String,
    pub timestamp: String,
    pub signature: String,
}

impl ChannelAuthParams {
    /// Convert to URL query string format
    pub fn to_query_string(&self) -> String {
        format!(
            "actor={}&timestamp={}&keyId={}&signature={}",
            urlencoding::encode(&self.actor),
            urlencoding::encode(&self.timestamp),
            urlencoding::encode(&self.key_id),
            urlencoding::encode(&self.signature)
        )
    }
}

/// Sign a channel upgrade request (GET with empty body)
pub fn sign_channel_request(path: &str, keys: &KeyPair, user_id: UserId) -> Option<ChannelAuthParams> {
    let headers = sign_request("GET", path, &[], keys, user_id)?;
    Some(ChannelAuthParams {
        actor: headers.actor,
        key_id: headers.key_id,
        timestamp: headers.timestamp,
        signature: headers.signature,
    })
}
