//! Synthetic single-column keys for offline sessions.

use sha2::{Digest, Sha256};

/// Hash used to derive offline session keys.
pub type KeyHashFn = fn(&[u8]) -> Vec<u8>;

/// SHA-256, the default offline session key hash.
#[must_use]
pub fn sha256(data: &[u8]) -> Vec<u8> {
    Sha256::digest(data).to_vec()
}

/// Hex-encoded `hash(user_id ++ conn_id)`.
#[must_use]
pub fn offline_session_key(hash: KeyHashFn, user_id: &str, conn_id: &str) -> String {
    let mut input = Vec::with_capacity(user_id.len() + conn_id.len());
    input.extend_from_slice(user_id.as_bytes());
    input.extend_from_slice(conn_id.as_bytes());
    hex::encode(hash(&input))
}
