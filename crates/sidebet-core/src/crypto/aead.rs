//! Authenticated Encryption with Associated Data (AEAD)
//!
//! ChaCha20-Poly1305 for payload encryption. The nonce travels separately
//! from the ciphertext because encrypted envelopes publish the two as
//! distinct hex fields.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use rand::{rngs::OsRng, RngCore};

use crate::error::{Error, Result};

/// Size of the encryption key in bytes
pub const KEY_SIZE: usize = 32;
/// Size of the nonce in bytes
pub const NONCE_SIZE: usize = 12;
/// Size of the authentication tag in bytes
pub const TAG_SIZE: usize = 16;

/// Encrypt a message using ChaCha20-Poly1305
///
/// Draws a fresh random nonce for every call; nonces must never repeat under
/// the same key.
///
/// # Returns
/// The nonce and the ciphertext (with appended tag), separately.
pub fn encrypt(
    key: &[u8; KEY_SIZE],
    plaintext: &[u8],
    associated_data: &[u8],
) -> Result<([u8; NONCE_SIZE], Vec<u8>)> {
    let cipher =
        ChaCha20Poly1305::new_from_slice(key).map_err(|e| Error::Encryption(e.to_string()))?;

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, chacha20poly1305::aead::Payload {
            msg: plaintext,
            aad: associated_data,
        })
        .map_err(|e| Error::Encryption(e.to_string()))?;

    Ok((nonce_bytes, ciphertext))
}

/// Decrypt a message using ChaCha20-Poly1305
///
/// Fails on any authentication tag mismatch; no partial plaintext is ever
/// returned.
pub fn decrypt(
    key: &[u8; KEY_SIZE],
    nonce: &[u8; NONCE_SIZE],
    ciphertext: &[u8],
    associated_data: &[u8],
) -> Result<Vec<u8>> {
    if ciphertext.len() < TAG_SIZE {
        return Err(Error::Decryption("Ciphertext too short".to_string()));
    }

    let cipher =
        ChaCha20Poly1305::new_from_slice(key).map_err(|e| Error::Decryption(e.to_string()))?;

    let plaintext = cipher
        .decrypt(Nonce::from_slice(nonce), chacha20poly1305::aead::Payload {
            msg: ciphertext,
            aad: associated_data,
        })
        .map_err(|_| Error::Decryption("Authentication failed".to_string()))?;

    Ok(plaintext)
}
