//! Payload digests for matching a message across the sender's and receiver's logs.

use sha2::{Digest, Sha256};

/// Full SHA-256 of a payload.
pub fn hash_payload(payload: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(payload);
    hasher.finalize().into()
}

/// First 8 bytes of the SHA-256 as lowercase hex. Short enough for a log line.
pub fn payload_digest(payload: &[u8]) -> String {
    hex::encode(&hash_payload(payload)[..8])
}
