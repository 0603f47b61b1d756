//! Envelope wire-format helpers.
//!
//! ```text
//! raw       = canonical JSON of the payload
//! hash      = digest("<nonce>,<raw>")
//! signature = "" | "<address>|<sig over '<address>|<hash>|<raw>'>"
//! ```

use rand::Rng;
use serde::de::DeserializeOwned;

use super::Envelope;

/// Largest nonce value (inclusive).
pub const MAX_NONCE: u64 = 1_000_000_000;

/// Fresh random nonce for one envelope.
pub fn generate_nonce() -> u64 {
    rand::thread_rng().gen_range(0..=MAX_NONCE)
}

/// Bytes fed to the digest function.
pub fn hash_input(nonce: u64, raw: &str) -> String {
    format!("{nonce},{raw}")
}

/// The string a signature covers.
pub fn signing_message(address: &str, hash: &str, raw: &str) -> String {
    format!("{address}|{hash}|{raw}")
}

/// Wire form of a signature.
pub fn format_signature(address: &str, signature: &str) -> String {
    format!("{address}|{signature}")
}

/// Split a wire signature into `(address, signature)`.
///
/// `None` for an empty or malformed signature field.
pub fn split_signature(signature: &str) -> Option<(&str, &str)> {
    let (address, sig) = signature.split_once('|')?;
    if address.is_empty() || sig.is_empty() {
        return None;
    }
    Some((address, sig))
}

/// Decode the payload carried in `raw`.
pub fn decode_payload<T: DeserializeOwned>(envelope: &Envelope) -> Result<T, serde_json::Error> {
    serde_json::from_str(&envelope.raw)
}
