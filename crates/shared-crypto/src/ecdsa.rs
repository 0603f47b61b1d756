//! # ECDSA Identities (secp256k1)
//!
//! Sender identities for signed peer messages.
//!
//! ## Security Properties
//!
//! - RFC 6979 deterministic nonces (no RNG dependency for signing)
//! - Low-S normalization (EIP-2), recovery byte adjusted accordingly
//! - Signatures are recoverable, so a verifier only needs the claimed address
//!
//! ## Wire Forms
//!
//! - Private key: 64 hex characters, optional `0x` prefix
//! - Address: `0x` + 40 lowercase hex characters
//! - Signature: 130 hex characters (`r || s || v`, `v` in `{27, 28}`)

use crate::CryptoError;
use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use sha3::{Digest, Keccak256};
use zeroize::Zeroize;

/// 20-byte account-style address derived from a public key.
pub type Address = [u8; 20];

/// Offset added to the recovery id in the `v` byte.
const RECOVERY_OFFSET: u8 = 27;

/// Keccak-256 hash function.
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Derive the address of a public key.
pub fn address_from_verifying_key(public_key: &VerifyingKey) -> Address {
    let encoded = public_key.to_encoded_point(false);
    // Skip the 0x04 uncompressed-point prefix
    let hash = keccak256(&encoded.as_bytes()[1..]);

    let mut address = [0u8; 20];
    address.copy_from_slice(&hash[12..]);
    address
}

/// Render an address as `0x`-prefixed lowercase hex.
pub fn format_address(address: &Address) -> String {
    format!("0x{}", hex::encode(address))
}

/// Parse an address from hex (with or without `0x`).
pub fn parse_address(text: &str) -> Result<Address, CryptoError> {
    let bytes = hex::decode(strip_hex_prefix(text))
        .map_err(|_| CryptoError::InvalidAddress(text.to_string()))?;
    bytes
        .try_into()
        .map_err(|_| CryptoError::InvalidAddress(text.to_string()))
}

fn strip_hex_prefix(text: &str) -> &str {
    text.strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text)
}

/// Recoverable ECDSA signature (65 bytes, `r || s || v`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RecoverableSignature([u8; 65]);

impl RecoverableSignature {
    /// Create from raw bytes.
    pub fn from_bytes(bytes: [u8; 65]) -> Self {
        Self(bytes)
    }

    /// Parse from 130 hex characters.
    pub fn from_hex(text: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(strip_hex_prefix(text))
            .map_err(|_| CryptoError::InvalidSignatureFormat)?;
        let bytes: [u8; 65] = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidSignatureFormat)?;
        Ok(Self(bytes))
    }

    /// Get raw bytes.
    pub fn as_bytes(&self) -> &[u8; 65] {
        &self.0
    }

    /// Lowercase hex rendering.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    fn split(&self) -> Result<(Signature, RecoveryId), CryptoError> {
        let signature =
            Signature::from_slice(&self.0[..64]).map_err(|_| CryptoError::InvalidSignatureFormat)?;
        let recovery_id = match self.0[64] {
            v @ (27 | 28) => v - RECOVERY_OFFSET,
            v @ (0 | 1) => v,
            _ => return Err(CryptoError::InvalidSignatureFormat),
        };
        let recovery_id =
            RecoveryId::from_byte(recovery_id).ok_or(CryptoError::InvalidSignatureFormat)?;
        Ok((signature, recovery_id))
    }
}

/// secp256k1 signing identity.
///
/// `SigningKey` zeroizes its scalar on drop.
pub struct Secp256k1Identity {
    signing_key: SigningKey,
}

impl Secp256k1Identity {
    /// Generate a random identity.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::random(&mut rand::thread_rng()),
        }
    }

    /// Create from secret key bytes (32 bytes).
    pub fn from_bytes(bytes: [u8; 32]) -> Result<Self, CryptoError> {
        let signing_key =
            SigningKey::from_bytes((&bytes).into()).map_err(|_| CryptoError::InvalidPrivateKey)?;
        Ok(Self { signing_key })
    }

    /// Parse a hex-encoded secret key.
    pub fn from_hex(text: &str) -> Result<Self, CryptoError> {
        let mut bytes =
            hex::decode(strip_hex_prefix(text.trim())).map_err(|_| CryptoError::InvalidPrivateKey)?;
        let result = match <[u8; 32]>::try_from(bytes.as_slice()) {
            Ok(secret) => Self::from_bytes(secret),
            Err(_) => Err(CryptoError::InvalidPrivateKey),
        };
        bytes.zeroize();
        result
    }

    /// Secret key as lowercase hex.
    pub fn to_hex(&self) -> String {
        let mut bytes: [u8; 32] = self.signing_key.to_bytes().into();
        let encoded = hex::encode(bytes);
        bytes.zeroize();
        encoded
    }

    /// Address of this identity.
    pub fn address(&self) -> Address {
        address_from_verifying_key(self.signing_key.verifying_key())
    }

    /// Address of this identity in its `0x` text form.
    pub fn address_string(&self) -> String {
        format_address(&self.address())
    }

    /// Sign an arbitrary message. The message is hashed with Keccak-256.
    pub fn sign_message(&self, message: &[u8]) -> Result<RecoverableSignature, CryptoError> {
        let prehash = keccak256(message);
        let (signature, recovery_id) = self
            .signing_key
            .sign_prehash_recoverable(&prehash)
            .map_err(|e| CryptoError::SigningFailed(e.to_string()))?;

        let mut bytes = [0u8; 65];
        bytes[..64].copy_from_slice(&signature.to_bytes());
        bytes[64] = recovery_id.to_byte() + RECOVERY_OFFSET;
        Ok(RecoverableSignature(bytes))
    }
}

/// Recover the address that produced `signature` over `message`.
pub fn recover_address(
    message: &[u8],
    signature: &RecoverableSignature,
) -> Result<Address, CryptoError> {
    let (sig, recovery_id) = signature.split()?;
    let prehash = keccak256(message);
    let key = VerifyingKey::recover_from_prehash(&prehash, &sig, recovery_id)
        .map_err(|_| CryptoError::RecoveryFailed)?;
    Ok(address_from_verifying_key(&key))
}

/// Check that `signature` over `message` was produced by `address`.
pub fn verify_message(
    message: &[u8],
    address: &Address,
    signature: &RecoverableSignature,
) -> Result<(), CryptoError> {
    let recovered = recover_address(message, signature)?;
    if recovered != *address {
        return Err(CryptoError::SignerMismatch {
            expected: format_address(address),
            actual: format_address(&recovered),
        });
    }
    Ok(())
}
