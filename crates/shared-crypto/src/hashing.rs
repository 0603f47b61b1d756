//! # BLAKE3 Hashing
//!
//! Digests for message envelopes. Envelope hashes are deduplication and
//! correlation keys, so they are rendered as lowercase hex strings.

use blake3::Hasher;

/// BLAKE3 hash output (256-bit).
pub type Hash = [u8; 32];

/// Stateful BLAKE3 hasher.
pub struct Blake3Hasher {
    inner: Hasher,
}

impl Blake3Hasher {
    /// Create new hasher.
    pub fn new() -> Self {
        Self {
            inner: Hasher::new(),
        }
    }

    /// Update with data.
    pub fn update(&mut self, data: &[u8]) -> &mut Self {
        self.inner.update(data);
        self
    }

    /// Finalize and return hash.
    pub fn finalize(&self) -> Hash {
        *self.inner.finalize().as_bytes()
    }

    /// Finalize and return the hash as lowercase hex.
    pub fn finalize_hex(&self) -> String {
        self.inner.finalize().to_hex().to_string()
    }
}

impl Default for Blake3Hasher {
    fn default() -> Self {
        Self::new()
    }
}

/// Hash data with BLAKE3 (one-shot).
pub fn blake3_hash(data: &[u8]) -> Hash {
    *blake3::hash(data).as_bytes()
}

/// Hash data with BLAKE3 and render it as 64 lowercase hex characters.
pub fn blake3_hex(data: &[u8]) -> String {
    blake3::hash(data).to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic() {
        assert_eq!(blake3_hex(b"42,{}"), blake3_hex(b"42,{}"));
    }

    #[test]
    fn test_different_inputs() {
        assert_ne!(blake3_hex(b"1,{}"), blake3_hex(b"2,{}"));
    }

    #[test]
    fn test_hex_shape() {
        let hex = blake3_hex(b"envelope");
        assert_eq!(hex.len(), 64);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_streaming_matches_oneshot() {
        let mut hasher = Blake3Hasher::new();
        hasher.update(b"17").update(b",").update(b"{\"message\": 1}");

        assert_eq!(hasher.finalize(), blake3_hash(b"17,{\"message\": 1}"));
        assert_eq!(hasher.finalize_hex(), blake3_hex(b"17,{\"message\": 1}"));
    }
}
