//! Sidebet Storage - encrypted key management at rest
//!
//! Provides secure storage for:
//! - The wallet-derived identity seed
//! - The private half of a published key bundle
//! - Established session secrets
//!
//! Everything is encrypted under a password-derived key (Argon2id +
//! ChaCha20-Poly1305) and serialized as one opaque blob.

pub mod error;
pub mod keystore;

pub use error::{Error, Result};
pub use keystore::{EncryptedPreKey, EncryptedSession, KeyStore};
