//! Content fingerprinting for artifact deduplication.

use sha2::{Digest, Sha256};

/// A 256-bit content digest, used as an equality proxy for "same bytes" within
/// one harvest pass.
pub type ContentDigest = [u8; 32];

/// Compute the SHA-256 digest of a byte buffer.
pub fn fingerprint(bytes: &[u8]) -> ContentDigest {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.finalize().into()
}
