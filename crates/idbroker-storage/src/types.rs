//! Entities persisted by every storage backend.
//!
//! All timestamps are serialized as RFC 3339 and normalized to UTC by the
//! backends before they are written. Opaque byte fields (connector data,
//! connector configuration, password hashes) are carried as standard base64
//! strings in the serialized form.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use time::{OffsetDateTime, PrimitiveDateTime, UtcOffset};

/// Entity kind labels used in errors and table names.
pub mod kind {
    pub const AUTH_REQUEST: &str = "AuthRequest";
    pub const AUTH_CODE: &str = "AuthCode";
    pub const REFRESH_TOKEN: &str = "RefreshToken";
    pub const DEVICE_REQUEST: &str = "DeviceRequest";
    pub const DEVICE_TOKEN: &str = "DeviceToken";
    pub const CLIENT: &str = "Client";
    pub const CONNECTOR: &str = "Connector";
    pub const PASSWORD: &str = "Password";
    pub const OFFLINE_SESSION: &str = "OfflineSession";
    pub const KEYS: &str = "Keys";
}

/// Converts a timestamp to UTC without changing the instant it denotes.
#[must_use]
pub fn utc(ts: OffsetDateTime) -> OffsetDateTime {
    ts.to_offset(UtcOffset::UTC)
}

/// `ts + duration`, clamped to the latest representable instant.
#[must_use]
pub fn saturating_add(ts: OffsetDateTime, duration: std::time::Duration) -> OffsetDateTime {
    time::Duration::try_from(duration)
        .ok()
        .and_then(|d| ts.checked_add(d))
        .unwrap_or_else(|| PrimitiveDateTime::MAX.assume_offset(ts.offset()))
}

/// Generates a new random identifier for credential rows.
#[must_use]
pub fn new_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

pub(crate) mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

/// Identity-derived claims embedded in codes and refresh tokens.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    pub user_id: String,
    pub username: String,
    #[serde(default)]
    pub preferred_username: String,
    pub email: String,
    pub email_verified: bool,
    #[serde(default)]
    pub groups: Vec<String>,
}

/// PKCE challenge bound to a code or device token.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PkceChallenge {
    pub code_challenge: String,
    pub code_challenge_method: String,
}

/// An in-flight authorization request, kept until the user finishes logging in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthRequest {
    pub id: String,
    pub client_id: String,
    #[serde(default)]
    pub response_types: Vec<String>,
    #[serde(default)]
    pub scopes: Vec<String>,
    pub redirect_uri: String,
    #[serde(default)]
    pub nonce: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub force_approval_prompt: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub expiry: OffsetDateTime,
    #[serde(default)]
    pub logged_in: bool,
    #[serde(default)]
    pub claims: Claims,
    #[serde(default)]
    pub connector_id: String,
    #[serde(default, with = "base64_bytes")]
    pub connector_data: Vec<u8>,
    #[serde(default)]
    pub pkce: PkceChallenge,
    #[serde(default, with = "base64_bytes")]
    pub hmac_key: Vec<u8>,
}

/// Short-lived authorization code. Read once at token exchange, then deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthCode {
    pub id: String,
    pub client_id: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    pub redirect_uri: String,
    #[serde(default)]
    pub nonce: String,
    pub claims: Claims,
    #[serde(default)]
    pub pkce: PkceChallenge,
    pub connector_id: String,
    #[serde(default, with = "base64_bytes")]
    pub connector_data: Vec<u8>,
    #[serde(with = "time::serde::rfc3339")]
    pub expiry: OffsetDateTime,
}

/// Long-lived credential tying a client to a user session.
///
/// Carries no expiry: refresh tokens are never garbage collected, staleness is
/// enforced when the token is used (see [`crate::RefreshTokenPolicy`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshToken {
    pub id: String,
    pub token: String,
    #[serde(default)]
    pub obsolete_token: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub last_used: OffsetDateTime,
    pub client_id: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub nonce: String,
    pub claims: Claims,
    pub connector_id: String,
    #[serde(default, with = "base64_bytes")]
    pub connector_data: Vec<u8>,
}

/// Device authorization grant request, keyed by its user code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRequest {
    pub user_code: String,
    pub device_code: String,
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub expiry: OffsetDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceTokenStatus {
    Pending,
    Complete,
    Expired,
    Denied,
}

/// Polling state of a device flow, keyed by its device code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceToken {
    pub device_code: String,
    pub status: DeviceTokenStatus,
    #[serde(default)]
    pub token: String,
    #[serde(with = "time::serde::rfc3339")]
    pub expiry: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub last_request_time: OffsetDateTime,
    pub poll_interval_seconds: u32,
    #[serde(default)]
    pub pkce: PkceChallenge,
}

/// A registered OAuth2 client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    pub id: String,
    #[serde(default)]
    pub secret: String,
    #[serde(default)]
    pub redirect_uris: Vec<String>,
    #[serde(default)]
    pub trusted_peers: Vec<String>,
    #[serde(default)]
    pub public: bool,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub logo_url: String,
}

/// A configured upstream connector. `config` is the connector's own JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connector {
    pub id: String,
    #[serde(rename = "type")]
    pub connector_type: String,
    pub name: String,
    #[serde(default)]
    pub resource_version: String,
    #[serde(default, with = "base64_bytes")]
    pub config: Vec<u8>,
}

/// A local password entry. Keyed by the lowercased email.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Password {
    pub email: String,
    #[serde(with = "base64_bytes")]
    pub hash: Vec<u8>,
    pub username: String,
    pub user_id: String,
}

impl Password {
    /// Storage key for an email address.
    #[must_use]
    pub fn key(email: &str) -> String {
        email.to_lowercase()
    }
}

impl std::fmt::Debug for Password {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Password")
            .field("email", &self.email)
            .field("hash", &"[REDACTED]")
            .field("username", &self.username)
            .field("user_id", &self.user_id)
            .finish()
    }
}

/// Reference to a refresh token held in an offline session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenRef {
    pub id: String,
    pub client_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub last_used: OffsetDateTime,
}

/// Per (user, connector) offline state: one refresh token per client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfflineSession {
    pub user_id: String,
    pub conn_id: String,
    #[serde(default)]
    pub refresh: HashMap<String, RefreshTokenRef>,
    #[serde(default, with = "base64_bytes")]
    pub connector_data: Vec<u8>,
}

/// The current signing key. The PEM is PKCS#8.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SigningKey {
    pub key_id: String,
    pub algorithm: String,
    pub private_key_pem: String,
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey")
            .field("key_id", &self.key_id)
            .field("algorithm", &self.algorithm)
            .field("private_key_pem", &"[REDACTED]")
            .finish()
    }
}

/// Public half of a signing key, SPKI PEM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicKey {
    pub key_id: String,
    pub algorithm: String,
    pub public_key_pem: String,
}

/// A previously active public key, kept until tokens it signed have expired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationKey {
    pub public_key: PublicKey,
    #[serde(with = "time::serde::rfc3339")]
    pub expiry: OffsetDateTime,
}

/// Deployment-wide key material. Stored as a single row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Keys {
    #[serde(default)]
    pub signing_key: Option<SigningKey>,
    #[serde(default)]
    pub signing_key_pub: Option<PublicKey>,
    #[serde(default)]
    pub verification_keys: Vec<VerificationKey>,
    #[serde(with = "time::serde::rfc3339")]
    pub next_rotation: OffsetDateTime,
}

impl Default for Keys {
    fn default() -> Self {
        Self {
            signing_key: None,
            signing_key_pub: None,
            verification_keys: Vec::new(),
            next_rotation: OffsetDateTime::UNIX_EPOCH,
        }
    }
}

/// Converts every timestamp of a row to UTC. Backends apply it before
/// writing, so reads never depend on the offset a caller used.
pub trait IntoUtc {
    #[must_use]
    fn into_utc(self) -> Self;
}

impl IntoUtc for AuthRequest {
    fn into_utc(mut self) -> Self {
        self.expiry = utc(self.expiry);
        self
    }
}

impl IntoUtc for AuthCode {
    fn into_utc(mut self) -> Self {
        self.expiry = utc(self.expiry);
        self
    }
}

impl IntoUtc for RefreshToken {
    fn into_utc(mut self) -> Self {
        self.created_at = utc(self.created_at);
        self.last_used = utc(self.last_used);
        self
    }
}

impl IntoUtc for DeviceRequest {
    fn into_utc(mut self) -> Self {
        self.expiry = utc(self.expiry);
        self
    }
}

impl IntoUtc for DeviceToken {
    fn into_utc(mut self) -> Self {
        self.expiry = utc(self.expiry);
        self.last_request_time = utc(self.last_request_time);
        self
    }
}

impl IntoUtc for OfflineSession {
    fn into_utc(mut self) -> Self {
        for reference in self.refresh.values_mut() {
            reference.created_at = utc(reference.created_at);
            reference.last_used = utc(reference.last_used);
        }
        self
    }
}

impl IntoUtc for Keys {
    fn into_utc(mut self) -> Self {
        self.next_rotation = utc(self.next_rotation);
        for key in &mut self.verification_keys {
            key.expiry = utc(key.expiry);
        }
        self
    }
}

macro_rules! no_timestamps {
    ($($ty:ty),+) => {
        $(impl IntoUtc for $ty {
            fn into_utc(self) -> Self {
                self
            }
        })+
    };
}

no_timestamps!(Client, Connector, Password);

/// Rows removed by one garbage collection sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcResult {
    pub auth_requests: u64,
    pub auth_codes: u64,
    pub device_requests: u64,
    pub device_tokens: u64,
}

impl GcResult {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    #[must_use]
    pub fn total(&self) -> u64 {
        self.auth_requests + self.auth_codes + self.device_requests + self.device_tokens
    }
}
