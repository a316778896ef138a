//! Hex boundary encoding
//!
//! All keys, nonces, signatures and ciphertexts cross the subsystem boundary
//! as lowercase hex strings; internal computation uses raw byte buffers.

use crate::error::{Error, Result};

/// Encode bytes as a lowercase hex string
pub fn encode(bytes: &[u8]) -> String {
    hex::encode(bytes)
}

/// Decode a hex string into bytes
pub fn decode(s: &str) -> Result<Vec<u8>> {
    hex::decode(s).map_err(|e| Error::MalformedKey(e.to_string()))
}

/// Decode a hex string into a fixed-size array, validating the length
pub fn decode_array<const N: usize>(s: &str) -> Result<[u8; N]> {
    let bytes = decode(s)?;
    let actual = bytes.len();
    bytes
        .try_into()
        .map_err(|_| Error::InvalidKeyLength { expected: N, actual })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let bytes = [0xab; 32];
        let encoded = encode(&bytes);
        assert_eq!(encoded.len(), 64);

        let decoded: [u8; 32] = decode_array(&encoded).unwrap();
        assert_eq!(decoded, bytes);
    }

    #[test]
    fn test_wrong_length_rejected() {
        let result: Result<[u8; 32]> = decode_array("abcd");
        assert!(matches!(
            result,
            Err(Error::InvalidKeyLength { expected: 32, actual: 2 })
        ));
    }

    #[test]
    fn test_invalid_hex_rejected() {
        assert!(decode("not hex!").is_err());
    }
}
