//! Content fingerprints used as deduplication keys.

use serde::Serialize;
use sha2::{Digest, Sha256};

/// Length of the hex digest stored in `hash_input`.
pub const HASH_LEN: usize = 32;

/// Fingerprint an input payload.
///
/// SHA-256, hex encoded and truncated to [`HASH_LEN`] characters. This is a
/// dedup key, not a security boundary.
pub fn hash_input(input: impl AsRef<[u8]>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_ref());
    let mut digest = format!("{:x}", hasher.finalize());
    digest.truncate(HASH_LEN);
    digest
}

/// Fingerprint a structured payload through its JSON encoding.
pub fn hash_json<T: Serialize + ?Sized>(value: &T) -> Result<String, serde_json::Error> {
    Ok(hash_input(serde_json::to_vec(value)?))
}
