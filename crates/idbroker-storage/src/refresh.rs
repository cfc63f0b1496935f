//! Refresh token rotation.
//!
//! Refresh tokens have no expiry column and are never garbage collected.
//! Staleness is enforced here, when a token is presented.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::traits::Storage;
use crate::types::{RefreshToken, saturating_add, utc};
use crate::{StorageError, StorageResult};

/// Generates a random refresh token value: 32 bytes, base64url without padding.
#[must_use]
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// How refresh tokens age and rotate.
///
/// The replay grace window: after a rotation the previous value stays
/// acceptable for `reuse_interval` after the token was last used, and
/// presenting it returns the current token unchanged. This covers clients
/// that retry a refresh whose response was lost. A zero interval disables
/// the window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshTokenPolicy {
    /// Issue a new token value on every use.
    pub rotate: bool,

    #[serde(with = "humantime_serde")]
    pub reuse_interval: Duration,

    /// Maximum age measured from creation.
    #[serde(with = "humantime_serde")]
    pub absolute_lifetime: Option<Duration>,

    /// Maximum idle time measured from the last use.
    #[serde(with = "humantime_serde")]
    pub valid_if_not_used_for: Option<Duration>,
}

impl Default for RefreshTokenPolicy {
    fn default() -> Self {
        Self {
            rotate: true,
            reuse_interval: Duration::from_secs(3),
            absolute_lifetime: None,
            valid_if_not_used_for: None,
        }
    }
}

impl RefreshTokenPolicy {
    #[must_use]
    pub fn with_rotation(mut self, rotate: bool) -> Self {
        self.rotate = rotate;
        self
    }

    #[must_use]
    pub fn with_reuse_interval(mut self, interval: Duration) -> Self {
        self.reuse_interval = interval;
        self
    }

    #[must_use]
    pub fn with_absolute_lifetime(mut self, lifetime: Duration) -> Self {
        self.absolute_lifetime = Some(lifetime);
        self
    }

    #[must_use]
    pub fn with_valid_if_not_used_for(mut self, idle: Duration) -> Self {
        self.valid_if_not_used_for = Some(idle);
        self
    }

    #[must_use]
    pub fn completely_expired(&self, created_at: OffsetDateTime, now: OffsetDateTime) -> bool {
        self.absolute_lifetime
            .is_some_and(|lifetime| now > saturating_add(created_at, lifetime))
    }

    #[must_use]
    pub fn expired_because_unused(&self, last_used: OffsetDateTime, now: OffsetDateTime) -> bool {
        self.valid_if_not_used_for
            .is_some_and(|idle| now > saturating_add(last_used, idle))
    }

    #[must_use]
    pub fn allowed_to_reuse(&self, last_used: OffsetDateTime, now: OffsetDateTime) -> bool {
        !self.reuse_interval.is_zero() && now < saturating_add(last_used, self.reuse_interval)
    }
}

/// Why a presented refresh token was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RefreshRejected {
    #[error("refresh token {id} exceeded its absolute lifetime")]
    Expired { id: String },

    #[error("refresh token {id} was idle for too long")]
    Unused { id: String },

    #[error("refresh token {id} does not match the stored value")]
    Mismatch { id: String },
}

/// Validates `presented` against the stored token `id` and rotates it.
///
/// Runs as one updater so two concurrent refreshes of the same token
/// serialize: the loser sees the winner's rotated value and either falls
/// into the grace window or is rejected with
/// `StorageError::Aborted(RefreshRejected::Mismatch)`.
pub async fn rotate_refresh_token(
    storage: &dyn Storage,
    policy: &RefreshTokenPolicy,
    id: &str,
    presented: &str,
    now: OffsetDateTime,
) -> StorageResult<RefreshToken> {
    let now = utc(now);
    let policy = policy.clone();
    let presented = presented.to_string();
    let next_value = generate_token();

    let updated = storage
        .update_refresh_token(
            id,
            Box::new(move |mut token: RefreshToken| {
                if policy.completely_expired(token.created_at, now) {
                    return Err(StorageError::aborted(RefreshRejected::Expired {
                        id: token.id,
                    }));
                }
                if policy.expired_because_unused(token.last_used, now) {
                    return Err(StorageError::aborted(RefreshRejected::Unused { id: token.id }));
                }

                if token.token != presented {
                    let replay = !token.obsolete_token.is_empty()
                        && token.obsolete_token == presented
                        && policy.allowed_to_reuse(token.last_used, now);
                    if replay {
                        return Ok(token);
                    }
                    return Err(StorageError::aborted(RefreshRejected::Mismatch {
                        id: token.id,
                    }));
                }

                if policy.rotate {
                    token.obsolete_token = std::mem::replace(&mut token.token, next_value);
                }
                token.last_used = now;
                Ok(token)
            }),
        )
        .await?;

    tracing::debug!(
        refresh_token = %updated.id,
        client_id = %updated.client_id,
        "refresh token used"
    );
    Ok(updated)
}
