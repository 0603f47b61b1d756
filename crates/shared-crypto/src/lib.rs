//! # Shared Crypto - Peer Messaging Primitives
//!
//! ## Components
//!
//! | Module | Algorithm | Use Case |
//! |--------|-----------|----------|
//! | `hashing` | BLAKE3 | Envelope digests (deduplication keys) |
//! | `ecdsa` | secp256k1 + Keccak-256 | Sender identity, message signing, signer recovery |
//!
//! ## Security Properties
//!
//! - **secp256k1**: RFC 6979 deterministic, low-S normalized, recoverable (65-byte `r||s||v`)
//! - **Addresses**: last 20 bytes of Keccak-256 over the uncompressed public key
//! - **BLAKE3**: deterministic, fast; used where only deduplication is required

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod ecdsa;
pub mod errors;
pub mod hashing;

// Re-exports
pub use ecdsa::{
    format_address, parse_address, recover_address, verify_message, Address,
    RecoverableSignature, Secp256k1Identity,
};
pub use errors::CryptoError;
pub use hashing::{blake3_hash, blake3_hex, Blake3Hasher};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    #[test]
    fn test_version() {
        assert!(!super::VERSION.is_empty());
    }
}
