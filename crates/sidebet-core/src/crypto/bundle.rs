//! Key bundle generation and the private key store
//!
//! A party publishes a `KeyBundle` (identity key, one signed pre-key, a batch
//! of one-time pre-keys) to the external bundle registry and keeps the
//! matching `PrivateKeyStore` inside its own trust boundary.

use std::collections::HashSet;

use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret as X25519SecretKey};
use zeroize::ZeroizeOnDrop;

use super::keys::{
    x25519_public_key_hex, IdentityKeyPair, IdentityPublicKey, OneTimePreKey, OneTimePreKeyPublic,
    SignedPreKey, SignedPreKeyPublic,
};
use crate::error::{Error, Result};

/// Number of one-time pre-keys in a freshly generated bundle
pub const ONE_TIME_PREKEY_COUNT: usize = 10;

/// Complete public key bundle for publishing
///
/// Shareable and non-secret. The signed pre-key signature lets any holder of
/// the bundle verify the pre-key against the identity key before use.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KeyBundle {
    pub identity: IdentityPublicKey,
    pub signed_prekey: SignedPreKeyPublic,
    pub one_time_prekeys: Vec<OneTimePreKeyPublic>,
}

impl KeyBundle {
    /// Verify the signed pre-key signature against the bundle's identity key
    pub fn verify(&self) -> Result<()> {
        self.signed_prekey.verify(&self.identity)
    }
}

/// Secret mirror of a published bundle
///
/// Holds the signed pre-key and one-time pre-key secrets. Never leaves the
/// owner's trust boundary; the storage layer persists it encrypted at rest.
pub struct PrivateKeyStore {
    signed_prekey: SignedPreKey,
    one_time_prekeys: Vec<OneTimePreKey>,
}

impl PrivateKeyStore {
    /// Build a store from its parts
    pub fn new(signed_prekey: SignedPreKey, one_time_prekeys: Vec<OneTimePreKey>) -> Self {
        Self {
            signed_prekey,
            one_time_prekeys,
        }
    }

    /// Get the current signed pre-key
    pub fn signed_prekey(&self) -> &SignedPreKey {
        &self.signed_prekey
    }

    /// Replace the signed pre-key (rotation)
    pub fn set_signed_prekey(&mut self, signed_prekey: SignedPreKey) {
        self.signed_prekey = signed_prekey;
    }

    /// Add a one-time pre-key (replenishment)
    pub fn put_one_time_prekey(&mut self, prekey: OneTimePreKey) {
        self.one_time_prekeys.push(prekey);
    }

    /// Remove and return the one-time pre-key with the given id
    ///
    /// A consumed or never-published id is a hard failure; the caller must
    /// not fall back to a reduced-security agreement.
    pub fn take_one_time_prekey(&mut self, id: u32) -> Result<OneTimePreKey> {
        let idx = self
            .one_time_prekeys
            .iter()
            .position(|k| k.id == id)
            .ok_or_else(|| Error::MissingKey(format!("one-time pre-key {id}")))?;
        Ok(self.one_time_prekeys.remove(idx))
    }

    /// Iterate the stored one-time pre-keys
    pub fn one_time_prekeys(&self) -> &[OneTimePreKey] {
        &self.one_time_prekeys
    }

    /// Number of remaining one-time pre-keys
    pub fn one_time_prekey_count(&self) -> usize {
        self.one_time_prekeys.len()
    }
}

/// Generate a publishable bundle and its private mirror
///
/// Produces exactly one signed pre-key and [`ONE_TIME_PREKEY_COUNT`] one-time
/// pre-keys. Ids are drawn from the 32-bit space and re-drawn on collision,
/// so ids are unique within the bundle.
pub fn generate_key_bundle(identity: &IdentityKeyPair) -> (KeyBundle, PrivateKeyStore) {
    let mut used_ids = HashSet::new();

    let signed_prekey = SignedPreKey::generate(draw_id(&mut used_ids), identity);

    let one_time_prekeys: Vec<OneTimePreKey> = (0..ONE_TIME_PREKEY_COUNT)
        .map(|_| OneTimePreKey::generate(draw_id(&mut used_ids)))
        .collect();

    let bundle = KeyBundle {
        identity: identity.public_key(),
        signed_prekey: signed_prekey.public_key(),
        one_time_prekeys: one_time_prekeys.iter().map(|k| k.public_key()).collect(),
    };

    (bundle, PrivateKeyStore::new(signed_prekey, one_time_prekeys))
}

fn draw_id(used: &mut HashSet<u32>) -> u32 {
    loop {
        let id = OsRng.next_u32();
        if used.insert(id) {
            return id;
        }
    }
}

/// Key material for the always-online agreement mode: a bare X25519 pair
/// with no pre-key apparatus
#[derive(ZeroizeOnDrop)]
pub struct SimpleKeyPair {
    secret: X25519SecretKey,
}

impl SimpleKeyPair {
    /// Generate a new simple key pair
    pub fn generate() -> Self {
        Self {
            secret: X25519SecretKey::random_from_rng(&mut OsRng),
        }
    }

    /// Restore from raw secret bytes
    pub fn from_bytes(secret_bytes: &[u8]) -> Result<Self> {
        if secret_bytes.len() != 32 {
            return Err(Error::InvalidKeyLength {
                expected: 32,
                actual: secret_bytes.len(),
            });
        }
        let arr: [u8; 32] = secret_bytes.try_into().expect("length checked");
        Ok(Self {
            secret: X25519SecretKey::from(arr),
        })
    }

    /// Get the public key
    pub fn public_key(&self) -> X25519PublicKey {
        X25519PublicKey::from(&self.secret)
    }

    /// Get the secret key for DH
    pub fn secret(&self) -> &X25519SecretKey {
        &self.secret
    }

    /// The shareable half
    pub fn bundle(&self) -> SimpleBundle {
        SimpleBundle {
            public: self.public_key(),
        }
    }

    /// Export secret key bytes
    pub fn secret_bytes(&self) -> [u8; 32] {
        self.secret.to_bytes()
    }
}

/// Publishable half of a simple key pair
///
/// Callers authenticate the key out of band (e.g. by binding it to a signing
/// address) before trusting agreements made with it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SimpleBundle {
    #[serde(with = "x25519_public_key_hex")]
    pub public: X25519PublicKey,
}

/// Generate a simple bundle and its key pair
pub fn generate_simple_bundle() -> (SimpleBundle, SimpleKeyPair) {
    let pair = SimpleKeyPair::generate();
    (pair.bundle(), pair)
}
