//! # secp256k1 Crypto Adapter
//!
//! [`CryptoProvider`] over `shared-crypto`:
//!
//! - envelope hash: BLAKE3, 64 hex characters
//! - address: `0x` + 40 hex characters (Keccak-256 of the public key)
//! - signature: 130 hex characters, recoverable, so verification only needs
//!   the claimed address

use shared_crypto::{
    blake3_hex, parse_address, verify_message, CryptoError, RecoverableSignature,
    Secp256k1Identity,
};

use crate::ports::outbound::CryptoProvider;

#[derive(Debug, Default, Clone, Copy)]
pub struct Secp256k1Crypto;

impl Secp256k1Crypto {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl CryptoProvider for Secp256k1Crypto {
    fn digest(&self, data: &[u8]) -> String {
        blake3_hex(data)
    }

    fn derive_address(&self, private_key: &str) -> Result<String, CryptoError> {
        Ok(Secp256k1Identity::from_hex(private_key)?.address_string())
    }

    fn sign(&self, message: &[u8], private_key: &str) -> Result<String, CryptoError> {
        let identity = Secp256k1Identity::from_hex(private_key)?;
        Ok(identity.sign_message(message)?.to_hex())
    }

    fn verify(&self, message: &[u8], address: &str, signature: &str) -> Result<(), CryptoError> {
        let address = parse_address(address)?;
        let signature = RecoverableSignature::from_hex(signature)?;
        verify_message(message, &address, &signature)
    }
}
