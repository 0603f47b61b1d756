//! Envelope Codec and Signature Service.
//!
//! Builds envelopes over a [`CryptoProvider`]: canonical `raw`, fresh nonce,
//! `hash = digest("<nonce>,<raw>")`, then the optional signature over
//! `address|hash|raw`. A key that cannot be used yields an unsigned envelope.

use serde::Serialize;
use tracing::warn;

use crate::domain::{
    format_signature, generate_nonce, hash_input, signing_message, split_signature,
    to_canonical_string, Envelope,
};
use crate::events::MessagingError;
use crate::ports::outbound::CryptoProvider;

/// Wire signature for `hash`/`raw`, or `""` when there is no usable key.
pub fn sign_envelope<C>(crypto: &C, private_key: Option<&str>, hash: &str, raw: &str) -> String
where
    C: CryptoProvider + ?Sized,
{
    let Some(private_key) = private_key else {
        return String::new();
    };

    let address = match crypto.derive_address(private_key) {
        Ok(address) => address,
        Err(e) => {
            warn!(error = %e, "Unusable signing key, sending unsigned");
            return String::new();
        }
    };

    match crypto.sign(signing_message(&address, hash, raw).as_bytes(), private_key) {
        Ok(signature) => format_signature(&address, &signature),
        Err(e) => {
            warn!(error = %e, address = %address, "Signing failed, sending unsigned");
            String::new()
        }
    }
}

/// Serialize `payload` and wrap it in a fresh envelope.
pub fn build_envelope<C, P>(
    crypto: &C,
    payload: &P,
    private_key: Option<&str>,
) -> Result<Envelope, serde_json::Error>
where
    C: CryptoProvider + ?Sized,
    P: Serialize,
{
    let raw = to_canonical_string(payload)?;
    let nonce = generate_nonce();
    let hash = crypto.digest(hash_input(nonce, &raw).as_bytes());
    let signature = sign_envelope(crypto, private_key, &hash, &raw);

    Ok(Envelope {
        raw,
        signature,
        hash,
    })
}

/// Check the envelope signature. Unsigned envelopes pass.
pub fn verify_envelope<C>(crypto: &C, envelope: &Envelope) -> Result<(), MessagingError>
where
    C: CryptoProvider + ?Sized,
{
    if !envelope.is_signed() {
        return Ok(());
    }

    let (address, signature) =
        split_signature(&envelope.signature).ok_or(MessagingError::InvalidSignature)?;
    let message = signing_message(address, &envelope.hash, &envelope.raw);

    crypto
        .verify(message.as_bytes(), address, signature)
        .map_err(|e| {
            warn!(hash = %envelope.hash, signer = %address, error = %e, "Invalid envelope signature");
            MessagingError::InvalidSignature
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::Secp256k1Crypto;
    use crate::domain::{decode_payload, BroadcastPayload};
    use serde_json::json;

    const KEY: &str = "1111111111111111111111111111111111111111111111111111111111111111";

    fn payload() -> BroadcastPayload {
        BroadcastPayload {
            message: json!({ "text": "hello", "tags": [1, 2] }),
            peer_count: 5,
            broadcast: true,
            immediate: false,
            site: "1Site".into(),
        }
    }

    #[test]
    fn test_raw_decodes_to_original_fields() {
        let crypto = Secp256k1Crypto::new();
        let envelope = build_envelope(&crypto, &payload(), None).unwrap();

        let decoded: BroadcastPayload = decode_payload(&envelope).unwrap();
        assert_eq!(decoded, payload());
        assert_eq!(
            envelope.raw,
            r#"{"message": {"tags": [1, 2], "text": "hello"}, "peer_count": 5, "broadcast": true, "immediate": false, "site": "1Site"}"#
        );
    }

    #[test]
    fn test_unsigned_without_key() {
        let crypto = Secp256k1Crypto::new();
        let envelope = build_envelope(&crypto, &payload(), None).unwrap();
        assert_eq!(envelope.signature, "");
        assert_eq!(envelope.signed_by(), "");
        assert!(verify_envelope(&crypto, &envelope).is_ok());
    }

    #[test]
    fn test_explicit_key_signs_with_its_address() {
        let crypto = Secp256k1Crypto::new();
        let envelope = build_envelope(&crypto, &payload(), Some(KEY)).unwrap();

        assert_eq!(envelope.signed_by(), crypto.derive_address(KEY).unwrap());
        assert!(verify_envelope(&crypto, &envelope).is_ok());
    }

    #[test]
    fn test_fresh_nonce_per_envelope() {
        let crypto = Secp256k1Crypto::new();
        let a = build_envelope(&crypto, &payload(), None).unwrap();
        let b = build_envelope(&crypto, &payload(), None).unwrap();
        assert_eq!(a.raw, b.raw);
        // Equal nonces are possible but vanishingly unlikely
        assert_ne!(a.hash, b.hash);
    }

    #[test]
    fn test_tampering_detected() {
        let crypto = Secp256k1Crypto::new();
        let envelope = build_envelope(&crypto, &payload(), Some(KEY)).unwrap();

        let tampered_raw = Envelope {
            raw: envelope.raw.replace("hello", "hullo"),
            ..envelope.clone()
        };
        assert_eq!(
            verify_envelope(&crypto, &tampered_raw),
            Err(MessagingError::InvalidSignature)
        );

        let tampered_hash = Envelope {
            hash: "0".repeat(64),
            ..envelope.clone()
        };
        assert!(verify_envelope(&crypto, &tampered_hash).is_err());

        let garbage = Envelope {
            signature: "no-separator".into(),
            ..envelope
        };
        assert!(verify_envelope(&crypto, &garbage).is_err());
    }

    #[test]
    fn test_unusable_key_yields_unsigned() {
        let crypto = Secp256k1Crypto::new();
        let envelope = build_envelope(&crypto, &payload(), Some("not-a-key")).unwrap();
        assert_eq!(envelope.signature, "");
    }
}
