//! Sidebet Core - end-to-end encryption for private friend markets
//!
//! This crate provides the security core that keeps friend-market metadata
//! (descriptions, participant lists) readable only by invited counterparties:
//! - Identity key management (Ed25519 + X25519, seeded from a wallet signature)
//! - Key bundle generation with signed and one-time pre-keys
//! - X3DH session establishment, plus a single-DH mode for online peers
//! - ChaCha20-Poly1305 envelope encryption of JSON payloads
//!
//! All operations are synchronous and side-effect-free apart from consuming
//! randomness; key material crosses the crate boundary hex-encoded.

pub mod crypto;
pub mod envelope;
pub mod error;

pub use envelope::{decrypt_json, encrypt_json, EncryptedEnvelope};
pub use error::{Error, Result};
