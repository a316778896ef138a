//! Error types for the Sidebet encryption core

use thiserror::Error;

/// Core error type for Sidebet cryptographic operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("Encryption failed: {0}")]
    Encryption(String),

    #[error("Decryption failed: {0}")]
    Decryption(String),

    #[error("Signature verification failed")]
    SignatureVerification,

    #[error("Malformed key: {0}")]
    MalformedKey(String),

    #[error("Invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("Invalid nonce length: expected {expected}, got {actual}")]
    InvalidNonceLength { expected: usize, actual: usize },

    #[error("Missing key: {0}")]
    MissingKey(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type for Sidebet core operations
pub type Result<T> = std::result::Result<T, Error>;
