//! Identity and pre-key management
//!
//! Implements the key hierarchy for Sidebet private markets:
//! - Identity Key: long-term Ed25519 signing key + X25519 DH key, both
//!   derived deterministically from a 32-byte wallet-signature seed
//! - Signed Pre-Key: medium-term X25519 key signed by the identity
//! - One-Time Pre-Keys: single-use X25519 keys consumed at session initiation

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret as X25519SecretKey};
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::kdf;
use crate::error::{Error, Result};

/// Size of Ed25519 public key in bytes
pub const ED25519_PUBLIC_KEY_SIZE: usize = 32;
/// Size of X25519 public key in bytes
pub const X25519_PUBLIC_KEY_SIZE: usize = 32;
/// Size of X25519 secret key in bytes
pub const X25519_SECRET_KEY_SIZE: usize = 32;
/// Size of the identity seed in bytes
pub const IDENTITY_SEED_SIZE: usize = 32;
/// Size of an Ed25519 signature in bytes
pub const SIGNATURE_SIZE: usize = 64;

/// HKDF info string for deriving the identity signing key from the seed
const IDENTITY_SIGNING_INFO: &[u8] = b"Sidebet_identity_signing";
/// HKDF info string for deriving the identity DH key from the seed
const IDENTITY_DH_INFO: &[u8] = b"Sidebet_identity_dh";

/// Long-term identity key pair
///
/// Contains an Ed25519 signing key and an X25519 DH key, both expanded from
/// one 32-byte seed (the digest of a wallet signature, produced outside this
/// crate). The same seed always reconstructs the same identity. Implements
/// manual `Drop` to zeroize the signing key, which does not implement the
/// `Zeroize` trait.
#[derive(Clone)]
pub struct IdentityKeyPair {
    /// Ed25519 signing key
    signing_key: SigningKey,
    /// X25519 secret key for DH operations
    dh_secret: X25519SecretKey,
}

impl Drop for IdentityKeyPair {
    fn drop(&mut self) {
        self.dh_secret.zeroize();

        let mut signing_bytes = self.signing_key.to_bytes();
        signing_bytes.zeroize();
        self.signing_key = SigningKey::from_bytes(&[0u8; 32]);
    }
}

impl IdentityKeyPair {
    /// Derive the identity deterministically from a 32-byte seed
    pub fn from_seed(seed: &[u8; IDENTITY_SEED_SIZE]) -> Self {
        let mut signing_bytes: [u8; 32] =
            kdf::derive_key(seed, &kdf::ZERO_SALT, IDENTITY_SIGNING_INFO, 32)
                .expect("32 bytes is a valid HKDF output length")
                .try_into()
                .expect("requested 32 bytes");
        let mut dh_bytes: [u8; 32] = kdf::derive_key(seed, &kdf::ZERO_SALT, IDENTITY_DH_INFO, 32)
            .expect("32 bytes is a valid HKDF output length")
            .try_into()
            .expect("requested 32 bytes");

        let signing_key = SigningKey::from_bytes(&signing_bytes);
        let dh_secret = X25519SecretKey::from(dh_bytes);

        signing_bytes.zeroize();
        dh_bytes.zeroize();

        Self {
            signing_key,
            dh_secret,
        }
    }

    /// Generate a new random identity key pair
    pub fn generate() -> Self {
        let mut seed = [0u8; IDENTITY_SEED_SIZE];
        OsRng.fill_bytes(&mut seed);
        let identity = Self::from_seed(&seed);
        seed.zeroize();
        identity
    }

    /// Get the public identity key
    pub fn public_key(&self) -> IdentityPublicKey {
        IdentityPublicKey {
            verifying_key: self.signing_key.verifying_key(),
            dh_public: X25519PublicKey::from(&self.dh_secret),
        }
    }

    /// Sign a message with the identity signing key
    pub fn sign(&self, message: &[u8]) -> Signature {
        self.signing_key.sign(message)
    }

    /// Get the X25519 secret key for DH operations
    pub fn dh_secret(&self) -> &X25519SecretKey {
        &self.dh_secret
    }
}

/// Public portion of an identity key
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IdentityPublicKey {
    /// Ed25519 verifying key
    #[serde(with = "verifying_key_hex")]
    verifying_key: VerifyingKey,
    /// X25519 public key for DH
    #[serde(with = "x25519_public_key_hex")]
    dh_public: X25519PublicKey,
}

impl PartialEq for IdentityPublicKey {
    fn eq(&self, other: &Self) -> bool {
        self.verifying_key == other.verifying_key
            && self.dh_public.as_bytes() == other.dh_public.as_bytes()
    }
}

impl Eq for IdentityPublicKey {}

impl IdentityPublicKey {
    /// Verify a signature against this identity
    pub fn verify(&self, message: &[u8], signature: &Signature) -> Result<()> {
        self.verifying_key
            .verify(message, signature)
            .map_err(|_| Error::SignatureVerification)
    }

    /// Get the X25519 public key for DH
    pub fn dh_public(&self) -> &X25519PublicKey {
        &self.dh_public
    }

    /// Get the Ed25519 verifying key
    pub fn verifying_key(&self) -> &VerifyingKey {
        &self.verifying_key
    }

    /// Generate a fingerprint for identity verification
    pub fn fingerprint(&self) -> String {
        use blake2::{Blake2s256, Digest};
        let mut hasher = Blake2s256::new();
        hasher.update(self.verifying_key.as_bytes());
        hasher.update(self.dh_public.as_bytes());
        let hash = hasher.finalize();
        hex::encode(&hash[..16])
    }

    /// Create from raw bytes
    pub fn from_bytes(verifying_bytes: &[u8], dh_bytes: &[u8]) -> Result<Self> {
        if verifying_bytes.len() != ED25519_PUBLIC_KEY_SIZE {
            return Err(Error::InvalidKeyLength {
                expected: ED25519_PUBLIC_KEY_SIZE,
                actual: verifying_bytes.len(),
            });
        }
        if dh_bytes.len() != X25519_PUBLIC_KEY_SIZE {
            return Err(Error::InvalidKeyLength {
                expected: X25519_PUBLIC_KEY_SIZE,
                actual: dh_bytes.len(),
            });
        }

        let verifying_arr: [u8; 32] = verifying_bytes.try_into().expect("length checked");
        let dh_arr: [u8; 32] = dh_bytes.try_into().expect("length checked");

        let verifying_key = VerifyingKey::from_bytes(&verifying_arr)
            .map_err(|e| Error::MalformedKey(e.to_string()))?;

        Ok(Self {
            verifying_key,
            dh_public: X25519PublicKey::from(dh_arr),
        })
    }

    /// Export verifying key bytes
    pub fn verifying_key_bytes(&self) -> [u8; 32] {
        self.verifying_key.to_bytes()
    }

    /// Export DH public key bytes
    pub fn dh_public_bytes(&self) -> [u8; 32] {
        self.dh_public.to_bytes()
    }
}

/// A signed pre-key
///
/// Rotated periodically by its owner. The X25519 public half is signed by
/// the identity's Ed25519 key so any bundle holder can verify it.
#[derive(Clone, ZeroizeOnDrop)]
pub struct SignedPreKey {
    /// Unique identifier for this pre-key
    #[zeroize(skip)]
    pub id: u32,
    /// X25519 secret key
    secret: X25519SecretKey,
    /// Identity signature over the public key
    #[zeroize(skip)]
    signature: Signature,
    /// Timestamp when this key was created
    #[zeroize(skip)]
    pub created_at: i64,
}

impl SignedPreKey {
    /// Generate a new signed pre-key
    pub fn generate(id: u32, identity: &IdentityKeyPair) -> Self {
        let secret = X25519SecretKey::random_from_rng(&mut OsRng);
        let public = X25519PublicKey::from(&secret);

        let signature = identity.sign(public.as_bytes());

        Self {
            id,
            secret,
            signature,
            created_at: chrono::Utc::now().timestamp(),
        }
    }

    /// Create from raw components
    pub fn from_bytes(
        id: u32,
        secret_bytes: &[u8],
        signature_bytes: &[u8],
        created_at: i64,
    ) -> Result<Self> {
        if secret_bytes.len() != X25519_SECRET_KEY_SIZE {
            return Err(Error::InvalidKeyLength {
                expected: X25519_SECRET_KEY_SIZE,
                actual: secret_bytes.len(),
            });
        }

        let secret_arr: [u8; 32] = secret_bytes.try_into().expect("length checked");
        let sig_arr: [u8; SIGNATURE_SIZE] =
            signature_bytes
                .try_into()
                .map_err(|_| Error::InvalidKeyLength {
                    expected: SIGNATURE_SIZE,
                    actual: signature_bytes.len(),
                })?;

        Ok(Self {
            id,
            secret: X25519SecretKey::from(secret_arr),
            signature: Signature::from_bytes(&sig_arr),
            created_at,
        })
    }

    /// Get the public pre-key
    pub fn public_key(&self) -> SignedPreKeyPublic {
        SignedPreKeyPublic {
            id: self.id,
            public: X25519PublicKey::from(&self.secret),
            signature: self.signature,
        }
    }

    /// Get the secret key for DH
    pub fn secret(&self) -> &X25519SecretKey {
        &self.secret
    }

    /// Export secret key bytes
    pub fn secret_bytes(&self) -> [u8; 32] {
        self.secret.to_bytes()
    }

    /// Export signature bytes
    pub fn signature_bytes(&self) -> [u8; SIGNATURE_SIZE] {
        self.signature.to_bytes()
    }
}

/// Public portion of a signed pre-key
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SignedPreKeyPublic {
    pub id: u32,
    #[serde(with = "x25519_public_key_hex")]
    pub public: X25519PublicKey,
    #[serde(with = "signature_hex")]
    pub signature: Signature,
}

impl SignedPreKeyPublic {
    /// Verify the signature using the identity's verifying key
    pub fn verify(&self, identity: &IdentityPublicKey) -> Result<()> {
        identity.verify(self.public.as_bytes(), &self.signature)
    }
}

/// A one-time pre-key
///
/// Consumed by at most one session initiation, then retired.
#[derive(Clone, ZeroizeOnDrop)]
pub struct OneTimePreKey {
    #[zeroize(skip)]
    pub id: u32,
    secret: X25519SecretKey,
}

impl OneTimePreKey {
    /// Generate a new one-time pre-key
    pub fn generate(id: u32) -> Self {
        Self {
            id,
            secret: X25519SecretKey::random_from_rng(&mut OsRng),
        }
    }

    /// Create from raw bytes
    pub fn from_bytes(id: u32, secret_bytes: &[u8]) -> Result<Self> {
        if secret_bytes.len() != X25519_SECRET_KEY_SIZE {
            return Err(Error::InvalidKeyLength {
                expected: X25519_SECRET_KEY_SIZE,
                actual: secret_bytes.len(),
            });
        }

        let secret_arr: [u8; 32] = secret_bytes.try_into().expect("length checked");
        Ok(Self {
            id,
            secret: X25519SecretKey::from(secret_arr),
        })
    }

    /// Get the public key
    pub fn public_key(&self) -> OneTimePreKeyPublic {
        OneTimePreKeyPublic {
            id: self.id,
            public: X25519PublicKey::from(&self.secret),
        }
    }

    /// Get the secret key for DH
    pub fn secret(&self) -> &X25519SecretKey {
        &self.secret
    }

    /// Export secret key bytes
    pub fn secret_bytes(&self) -> [u8; 32] {
        self.secret.to_bytes()
    }
}

/// Public portion of a one-time pre-key
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OneTimePreKeyPublic {
    pub id: u32,
    #[serde(with = "x25519_public_key_hex")]
    pub public: X25519PublicKey,
}

/// An ephemeral key pair scoped to a single session initiation
#[derive(ZeroizeOnDrop)]
pub struct EphemeralKeyPair {
    secret: X25519SecretKey,
}

impl EphemeralKeyPair {
    /// Generate a new ephemeral key pair
    pub fn generate() -> Self {
        Self {
            secret: X25519SecretKey::random_from_rng(&mut OsRng),
        }
    }

    /// Get the public key
    pub fn public_key(&self) -> X25519PublicKey {
        X25519PublicKey::from(&self.secret)
    }

    /// Get the secret key
    pub fn secret(&self) -> &X25519SecretKey {
        &self.secret
    }
}

// Serde adapters for dalek types at the hex boundary

pub(crate) mod verifying_key_hex {
    use ed25519_dalek::VerifyingKey;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(key: &VerifyingKey, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        hex::encode(key.as_bytes()).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<VerifyingKey, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let bytes: [u8; 32] =
            crate::crypto::encoding::decode_array(&s).map_err(serde::de::Error::custom)?;
        VerifyingKey::from_bytes(&bytes).map_err(serde::de::Error::custom)
    }
}

pub(crate) mod signature_hex {
    use ed25519_dalek::Signature;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(sig: &Signature, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        hex::encode(sig.to_bytes()).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Signature, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let bytes: [u8; 64] =
            crate::crypto::encoding::decode_array(&s).map_err(serde::de::Error::custom)?;
        Ok(Signature::from_bytes(&bytes))
    }
}

pub(crate) mod x25519_public_key_hex {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use x25519_dalek::PublicKey;

    pub fn serialize<S>(key: &PublicKey, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        hex::encode(key.as_bytes()).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<PublicKey, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let bytes: [u8; 32] =
            crate::crypto::encoding::decode_array(&s).map_err(serde::de::Error::custom)?;
        Ok(PublicKey::from(bytes))
    }
}
