//! Storage contract for idbroker.
//!
//! This crate defines the credential entities, the [`Storage`] trait every
//! backend implements, and the lifecycle logic built on top of it:
//!
//! - [`MemoryStorage`]: process-local backend for development and tests
//! - [`GarbageCollector`]: periodic sweep of expired rows
//! - [`rotate_refresh_token`]: refresh token validation and rotation
//! - [`KeyRotator`]: signing key rotation on the `Keys` singleton
//! - [`offline_session_key`]: single-column keys for offline sessions

pub mod error;
pub mod gc;
pub mod memory;
pub mod offline;
pub mod refresh;
pub mod rotation;
pub mod traits;
pub mod types;

pub use error::{AbortCause, ErrorCategory, StorageError};
pub use gc::GarbageCollector;
pub use memory::MemoryStorage;
pub use offline::{KeyHashFn, offline_session_key, sha256};
pub use refresh::{RefreshRejected, RefreshTokenPolicy, generate_token, rotate_refresh_token};
pub use rotation::{KeyGenerator, KeyRotator, RotationOutcome, RotationStrategy, RsaKeyGenerator};
pub use traits::{Storage, Updater};
pub use types::{
    AuthCode, AuthRequest, Claims, Client, Connector, DeviceRequest, DeviceToken,
    DeviceTokenStatus, GcResult, Keys, OfflineSession, Password, PkceChallenge, PublicKey,
    IntoUtc, RefreshToken, RefreshTokenRef, SigningKey, VerificationKey, kind, new_id, saturating_add, utc,
};

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
