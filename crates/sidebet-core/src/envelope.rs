//! Encrypted envelope layer
//!
//! Binds an established session's shared secret and associated data to the
//! confidentiality and integrity of a JSON payload (market descriptions,
//! participant lists). The envelope publishes its nonce and ciphertext as
//! separate hex fields.

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::crypto::{aead, encoding};
use crate::error::{Error, Result};

/// Hex-encoded AEAD envelope ready for external storage
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EncryptedEnvelope {
    /// 12-byte nonce, hex-encoded
    pub nonce: String,
    /// Ciphertext with authentication tag, hex-encoded
    pub ciphertext: String,
}

impl EncryptedEnvelope {
    /// Decrypt this envelope back into a payload
    pub fn open<T: DeserializeOwned>(
        &self,
        key: &[u8; aead::KEY_SIZE],
        associated_data: &[u8],
    ) -> Result<T> {
        decrypt_json(key, &self.nonce, &self.ciphertext, associated_data)
    }
}

/// Serialize a payload to JSON and encrypt it under a session key
pub fn encrypt_json<T: Serialize>(
    key: &[u8; aead::KEY_SIZE],
    payload: &T,
    associated_data: &[u8],
) -> Result<EncryptedEnvelope> {
    let plaintext = serde_json::to_vec(payload).map_err(|e| Error::Serialization(e.to_string()))?;
    let (nonce, ciphertext) = aead::encrypt(key, &plaintext, associated_data)?;

    Ok(EncryptedEnvelope {
        nonce: encoding::encode(&nonce),
        ciphertext: encoding::encode(&ciphertext),
    })
}

/// Decrypt a hex nonce/ciphertext pair and parse the JSON payload
///
/// Propagates AEAD failures as [`Error::Decryption`]; never returns a
/// partial result.
pub fn decrypt_json<T: DeserializeOwned>(
    key: &[u8; aead::KEY_SIZE],
    nonce_hex: &str,
    ciphertext_hex: &str,
    associated_data: &[u8],
) -> Result<T> {
    let nonce_bytes = encoding::decode(nonce_hex)?;
    if nonce_bytes.len() != aead::NONCE_SIZE {
        return Err(Error::InvalidNonceLength {
            expected: aead::NONCE_SIZE,
            actual: nonce_bytes.len(),
        });
    }
    let mut nonce = [0u8; aead::NONCE_SIZE];
    nonce.copy_from_slice(&nonce_bytes);

    let ciphertext = encoding::decode(ciphertext_hex)?;

    let plaintext = aead::decrypt(key, &nonce, &ciphertext, associated_data)?;
    serde_json::from_slice(&plaintext).map_err(|e| Error::Serialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_round_trip() {
        let key = [9u8; 32];
        let aad = b"session associated data";
        let payload = json!({
            "description": "Who wins the office ping-pong final?",
            "participants": ["0xabc", "0xdef"],
            "stake": 250,
        });

        let envelope = encrypt_json(&key, &payload, aad).unwrap();
        let decrypted: serde_json::Value = envelope.open(&key, aad).unwrap();

        assert_eq!(decrypted, payload);
    }

    #[test]
    fn test_envelope_fields_are_hex() {
        let key = [9u8; 32];
        let envelope = encrypt_json(&key, &json!({"a": 1}), b"").unwrap();

        assert_eq!(envelope.nonce.len(), aead::NONCE_SIZE * 2);
        assert!(envelope.nonce.chars().all(|c| c.is_ascii_hexdigit()));
        assert!(envelope.ciphertext.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let key = [9u8; 32];
        let mut envelope = encrypt_json(&key, &json!({"a": 1}), b"aad").unwrap();

        // Flip one bit of the first ciphertext byte
        let mut bytes = hex::decode(&envelope.ciphertext).unwrap();
        bytes[0] ^= 0x01;
        envelope.ciphertext = hex::encode(bytes);

        assert!(matches!(
            envelope.open::<serde_json::Value>(&key, b"aad"),
            Err(Error::Decryption(_))
        ));
    }

    #[test]
    fn test_tampered_nonce_fails() {
        let key = [9u8; 32];
        let mut envelope = encrypt_json(&key, &json!({"a": 1}), b"aad").unwrap();

        let mut bytes = hex::decode(&envelope.nonce).unwrap();
        bytes[0] ^= 0x01;
        envelope.nonce = hex::encode(bytes);

        assert!(envelope.open::<serde_json::Value>(&key, b"aad").is_err());
    }

    #[test]
    fn test_tampered_aad_fails() {
        let key = [9u8; 32];
        let envelope = encrypt_json(&key, &json!({"a": 1}), b"aad").unwrap();

        assert!(envelope.open::<serde_json::Value>(&key, b"aae").is_err());
    }

    #[test]
    fn test_wrong_nonce_length_rejected_before_decryption() {
        let key = [9u8; 32];
        let result: Result<serde_json::Value> = decrypt_json(&key, "abcd", "00", b"");

        assert!(matches!(
            result,
            Err(Error::InvalidNonceLength { expected: 12, actual: 2 })
        ));
    }

    #[test]
    fn test_envelope_json_round_trip() {
        let key = [9u8; 32];
        let payload = json!({"market": "friendly wager"});
        let envelope = encrypt_json(&key, &payload, b"aad").unwrap();

        let json = serde_json::to_string(&envelope).unwrap();
        let restored: EncryptedEnvelope = serde_json::from_str(&json).unwrap();

        let decrypted: serde_json::Value = restored.open(&key, b"aad").unwrap();
        assert_eq!(decrypted, payload);
    }
}
