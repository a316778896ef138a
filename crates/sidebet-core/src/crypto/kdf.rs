//! Key derivation and MAC primitives
//!
//! HKDF-SHA256 for all key derivation in the subsystem (X3DH shared secrets,
//! identity key expansion) plus an HMAC-SHA256 primitive.

use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{Error, Result};

/// Size of derived symmetric keys in bytes
pub const KEY_SIZE: usize = 32;

/// A 32-byte all-zero salt, used where a protocol fixes the salt to zeros
pub const ZERO_SALT: [u8; 32] = [0u8; 32];

/// Derive output key material using HKDF-SHA256
///
/// Pure and deterministic: the same `(ikm, salt, info)` always yields the
/// same output.
pub fn derive_key(ikm: &[u8], salt: &[u8], info: &[u8], output_len: usize) -> Result<Vec<u8>> {
    let hkdf = Hkdf::<Sha256>::new(Some(salt), ikm);
    let mut output = vec![0u8; output_len];

    hkdf.expand(info, &mut output)
        .map_err(|e| Error::KeyDerivation(e.to_string()))?;

    Ok(output)
}

/// Compute an HMAC-SHA256 tag over a message
pub fn hmac_sha256(key: &[u8], message: &[u8]) -> [u8; 32] {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(message);

    let mut tag = [0u8; 32];
    tag.copy_from_slice(&mac.finalize().into_bytes());
    tag
}

/// Concatenate multiple byte slices for use as KDF input
pub fn concat_keys(keys: &[&[u8]]) -> Vec<u8> {
    let total_len: usize = keys.iter().map(|k| k.len()).sum();
    let mut result = Vec::with_capacity(total_len);
    for key in keys {
        result.extend_from_slice(key);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_key_deterministic() {
        let ikm = b"input key material";
        let info = b"test info";

        let key1 = derive_key(ikm, &ZERO_SALT, info, 32).unwrap();
        let key2 = derive_key(ikm, &ZERO_SALT, info, 32).unwrap();

        assert_eq!(key1, key2);
    }

    #[test]
    fn test_derive_key_different_info() {
        let ikm = b"input key material";

        let key1 = derive_key(ikm, &ZERO_SALT, b"info1", 32).unwrap();
        let key2 = derive_key(ikm, &ZERO_SALT, b"info2", 32).unwrap();

        assert_ne!(key1, key2);
    }

    #[test]
    fn test_derive_key_different_salt() {
        let ikm = b"input key material";

        let key1 = derive_key(ikm, &ZERO_SALT, b"info", 32).unwrap();
        let key2 = derive_key(ikm, &[1u8; 32], b"info", 32).unwrap();

        assert_ne!(key1, key2);
    }

    #[test]
    fn test_hmac_deterministic() {
        let tag1 = hmac_sha256(b"key", b"message");
        let tag2 = hmac_sha256(b"key", b"message");
        assert_eq!(tag1, tag2);

        let tag3 = hmac_sha256(b"other key", b"message");
        assert_ne!(tag1, tag3);
    }

    #[test]
    fn test_concat_keys() {
        let result = concat_keys(&[b"ab", b"cd", b"ef"]);
        assert_eq!(result, b"abcdef");
    }
}
