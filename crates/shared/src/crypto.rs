//! Hashing utilities for idempotency keys and admin key comparison.

use sha2::{Digest, Sha256};

/// Separator used between digest parts so that `("ab", "c")` and `("a", "bc")`
/// never hash to the same value.
const PART_SEPARATOR: u8 = 0x1f;

/// Computes SHA-256 hash of the input and returns it as a hex string.
pub fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

/// Computes a SHA-256 digest over an ordered list of parts.
///
/// Every part is followed by a unit separator byte, which keeps the digest
/// unambiguous regardless of where part boundaries fall.
pub fn digest_parts<I, S>(parts: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_ref().as_bytes());
        hasher.update([PART_SEPARATOR]);
    }
    hex::encode(hasher.finalize())
}

/// Compares two secrets by their SHA-256 digests.
pub fn digests_match(provided: &str, expected: &str) -> bool {
    let provided = Sha256::digest(provided.as_bytes());
    let expected = Sha256::digest(expected.as_bytes());
    provided
        .iter()
        .zip(expected.iter())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}
