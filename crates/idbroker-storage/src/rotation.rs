//! Signing key rotation.
//!
//! The rotator keeps one active signing key in the `Keys` singleton. On
//! rotation the previous public key is demoted to a verification key that
//! stays valid for as long as ID tokens signed by it can live.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::RngCore;
use rand::rngs::OsRng;
use rsa::RsaPrivateKey;
use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::traits::Storage;
use crate::types::{Keys, PublicKey, SigningKey, VerificationKey, saturating_add, utc};
use crate::{StorageError, StorageResult};

/// When keys rotate and how long their public halves stay trusted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RotationStrategy {
    #[serde(with = "humantime_serde")]
    pub rotation_frequency: Duration,

    /// Lifetime of issued ID tokens; a demoted key is kept this long.
    #[serde(with = "humantime_serde")]
    pub id_token_valid_for: Duration,
}

impl Default for RotationStrategy {
    fn default() -> Self {
        Self {
            rotation_frequency: Duration::from_secs(6 * 3600),
            id_token_valid_for: Duration::from_secs(24 * 3600),
        }
    }
}

/// Produces fresh signing key pairs.
#[async_trait]
pub trait KeyGenerator: Send + Sync {
    async fn generate(&self) -> StorageResult<(SigningKey, PublicKey)>;
}

/// RSA key pairs for RS256, generated on the blocking pool.
#[derive(Debug, Clone)]
pub struct RsaKeyGenerator {
    bits: usize,
}

impl Default for RsaKeyGenerator {
    fn default() -> Self {
        Self { bits: 2048 }
    }
}

impl RsaKeyGenerator {
    #[must_use]
    pub fn with_bits(mut self, bits: usize) -> Self {
        self.bits = bits;
        self
    }
}

fn generate_key_id() -> String {
    let mut bytes = [0u8; 20];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn generate_rsa(bits: usize) -> StorageResult<(SigningKey, PublicKey)> {
    let private_key = RsaPrivateKey::new(&mut OsRng, bits)
        .map_err(|e| StorageError::internal(format!("RSA key generation failed: {e}")))?;
    let private_pem = private_key
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| StorageError::internal(format!("encoding private key: {e}")))?;
    let public_pem = private_key
        .to_public_key()
        .to_public_key_pem(LineEnding::LF)
        .map_err(|e| StorageError::internal(format!("encoding public key: {e}")))?;

    let key_id = generate_key_id();
    Ok((
        SigningKey {
            key_id: key_id.clone(),
            algorithm: "RS256".to_string(),
            private_key_pem: private_pem.to_string(),
        },
        PublicKey {
            key_id,
            algorithm: "RS256".to_string(),
            public_key_pem: public_pem,
        },
    ))
}

#[async_trait]
impl KeyGenerator for RsaKeyGenerator {
    async fn generate(&self) -> StorageResult<(SigningKey, PublicKey)> {
        let bits = self.bits;
        tokio::task::spawn_blocking(move || generate_rsa(bits))
            .await
            .map_err(|e| StorageError::internal(format!("key generation task failed: {e}")))?
    }
}

/// Another rotator won the race for this rotation.
#[derive(Debug, thiserror::Error)]
#[error("keys already rotated by another process")]
struct AlreadyRotated;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationOutcome {
    Rotated { next_rotation: OffsetDateTime },
    NotDue { next_rotation: OffsetDateTime },
    AlreadyRotated,
}

pub struct KeyRotator {
    storage: Arc<dyn Storage>,
    strategy: RotationStrategy,
    generator: Arc<dyn KeyGenerator>,
}

impl KeyRotator {
    #[must_use]
    pub fn new(storage: Arc<dyn Storage>, strategy: RotationStrategy) -> Self {
        Self {
            storage,
            strategy,
            generator: Arc::new(RsaKeyGenerator::default()),
        }
    }

    #[must_use]
    pub fn with_generator(mut self, generator: Arc<dyn KeyGenerator>) -> Self {
        self.generator = generator;
        self
    }

    /// Rotates the signing key if `now` has reached `next_rotation`.
    ///
    /// Key material is generated before the transaction. The due check is
    /// repeated inside the updater; if another rotator got there first the
    /// update aborts and `AlreadyRotated` is returned.
    pub async fn rotate(&self, now: OffsetDateTime) -> StorageResult<RotationOutcome> {
        let now = utc(now);
        match self.storage.get_keys().await {
            Ok(keys) if now < keys.next_rotation => {
                return Ok(RotationOutcome::NotDue {
                    next_rotation: keys.next_rotation,
                });
            }
            Ok(_) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        let (signing_key, public_key) = self.generator.generate().await?;
        let key_id = signing_key.key_id.clone();
        let strategy = self.strategy.clone();

        let result = self
            .storage
            .update_keys(Box::new(move |mut keys: Keys| {
                if now < keys.next_rotation {
                    return Err(StorageError::aborted(AlreadyRotated));
                }

                keys.verification_keys.retain(|key| key.expiry >= now);
                if let Some(previous) = keys.signing_key_pub.take() {
                    keys.verification_keys.push(VerificationKey {
                        public_key: previous,
                        expiry: saturating_add(now, strategy.id_token_valid_for),
                    });
                }
                keys.signing_key = Some(signing_key);
                keys.signing_key_pub = Some(public_key);
                keys.next_rotation = saturating_add(now, strategy.rotation_frequency);
                Ok(keys)
            }))
            .await;

        match result {
            Ok(keys) => {
                tracing::info!(
                    key_id = %key_id,
                    next_rotation = %keys.next_rotation,
                    verification_keys = keys.verification_keys.len(),
                    "signing keys rotated"
                );
                Ok(RotationOutcome::Rotated {
                    next_rotation: keys.next_rotation,
                })
            }
            Err(e) if e.abort_cause::<AlreadyRotated>().is_some() => {
                tracing::debug!("signing keys already rotated elsewhere");
                Ok(RotationOutcome::AlreadyRotated)
            }
            Err(e) => Err(e),
        }
    }

    /// Checks for a due rotation every `check_interval` until cancelled.
    pub fn spawn(self: Arc<Self>, check_interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(check_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = self.rotate(OffsetDateTime::now_utc()).await {
                            tracing::warn!(error = %e, category = %e.category(), "key rotation failed");
                        }
                    }
                }
            }
            tracing::debug!("key rotation loop stopped");
        })
    }
}
