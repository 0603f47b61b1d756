//! Crypto error types.

use thiserror::Error;

/// Cryptographic operation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CryptoError {
    /// Private key is not a valid 32-byte secp256k1 scalar
    #[error("Invalid private key")]
    InvalidPrivateKey,

    /// Address is not a 20-byte hex string
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Invalid signature format (length, encoding, recovery byte)
    #[error("Invalid signature format")]
    InvalidSignatureFormat,

    /// Public key could not be recovered from the signature
    #[error("Failed to recover public key")]
    RecoveryFailed,

    /// Recovered signer does not match the claimed address
    #[error("Signer mismatch: expected {expected}, got {actual}")]
    SignerMismatch {
        /// Address the signature claims
        expected: String,
        /// Address recovered from the signature
        actual: String,
    },

    /// Signing failed
    #[error("Signing failed: {0}")]
    SigningFailed(String),
}
