//! Cryptographic primitives for Sidebet
//!
//! This module provides:
//! - `keys`: identity, signed pre-key and one-time pre-key management
//! - `bundle`: key bundle generation and the private key store
//! - `x3dh`: Extended Triple Diffie-Hellman session establishment
//! - `aead`: authenticated encryption (ChaCha20-Poly1305)
//! - `kdf`: key derivation and MAC primitives
//! - `encoding`: hex boundary helpers

pub mod aead;
pub mod bundle;
pub mod encoding;
pub mod kdf;
pub mod keys;
pub mod x3dh;

pub use aead::{decrypt, encrypt};
pub use bundle::{
    generate_key_bundle, generate_simple_bundle, KeyBundle, PrivateKeyStore, SimpleBundle,
    SimpleKeyPair, ONE_TIME_PREKEY_COUNT,
};
pub use kdf::{derive_key, hmac_sha256};
pub use keys::{
    EphemeralKeyPair, IdentityKeyPair, IdentityPublicKey, OneTimePreKey, SignedPreKey,
};
pub use x3dh::{
    simple_key_agreement, InitialMessage, Initiation, Session, X3dhInitiator, X3dhResponder,
};
