//! Cache entry key generation.

use sha2::{Digest, Sha256};

/// Compute the storage key of an entry within a partition.
pub fn compute_entry_key(partition: &str, url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(partition.as_bytes());
    hasher.update(b"\n");
    hasher.update(url.as_bytes());
    hex::encode(hasher.finalize())
}
