//! Secure key storage with Argon2 password derivation
//!
//! Persists the identity seed, the private half of a published key bundle and
//! established session secrets, all encrypted at rest. One-time pre-keys are
//! deleted on consumption.

use argon2::{
    password_hash::{PasswordHasher, SaltString},
    Argon2, PasswordHash, PasswordVerifier,
};
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use sidebet_core::crypto::{
    IdentityKeyPair, OneTimePreKey, PrivateKeyStore, Session, SignedPreKey,
};

use crate::error::{Error, Result};

/// Size of the encryption key
const KEY_SIZE: usize = 32;
/// Size of the nonce
const NONCE_SIZE: usize = 12;
/// Size of the salt
const SALT_SIZE: usize = 16;

/// Create an Argon2 instance with secure parameters:
/// Algorithm: Argon2id, Version: 0x13, Memory: 64 MiB, Iterations: 3, Parallelism: 4
fn argon2_instance<'a>() -> Argon2<'a> {
    Argon2::new(
        argon2::Algorithm::Argon2id,
        argon2::Version::V0x13,
        argon2::Params::new(65536, 3, 4, Some(32)).expect("valid Argon2 parameters"),
    )
}

/// Encrypted key store
#[derive(Serialize, Deserialize)]
pub struct KeyStore {
    /// Salt for password-based key derivation
    salt: [u8; SALT_SIZE],
    /// Argon2 password hash for verification
    password_hash: String,
    /// Encrypted 32-byte identity seed
    encrypted_seed: Vec<u8>,
    /// Encrypted signed pre-key of the current bundle
    encrypted_signed_prekey: Option<EncryptedPreKey>,
    /// Encrypted one-time pre-keys of the current bundle
    encrypted_one_time_prekeys: Vec<EncryptedPreKey>,
    /// Encrypted established-session secrets, keyed by peer fingerprint
    encrypted_sessions: Vec<EncryptedSession>,
}

/// Encrypted pre-key record
#[derive(Clone, Serialize, Deserialize)]
pub struct EncryptedPreKey {
    pub id: u32,
    pub encrypted_secret: Vec<u8>,
    pub signature: Option<Vec<u8>>,
    pub created_at: i64,
}

/// Encrypted session record
///
/// Associated data is the two identity public keys and stays plaintext; only
/// the shared secret is encrypted.
#[derive(Clone, Serialize, Deserialize)]
pub struct EncryptedSession {
    pub peer_fingerprint: String,
    pub encrypted_secret: Vec<u8>,
    pub associated_data: Vec<u8>,
    pub consumed_prekey_id: Option<u32>,
}

impl KeyStore {
    /// Create a new key store around an externally derived identity seed
    pub fn create(password: &str, seed: &[u8; 32]) -> Result<(Self, IdentityKeyPair)> {
        let mut salt = [0u8; SALT_SIZE];
        rand::thread_rng().fill_bytes(&mut salt);

        let salt_string =
            SaltString::encode_b64(&salt).map_err(|e| Error::KeyDerivation(e.to_string()))?;
        let argon2 = argon2_instance();
        let password_hash = argon2
            .hash_password(password.as_bytes(), &salt_string)
            .map_err(|e| Error::KeyDerivation(e.to_string()))?
            .to_string();

        let encryption_key = derive_encryption_key(password, &salt)?;
        let encrypted_seed = encrypt_data(&encryption_key, seed)?;

        let identity = IdentityKeyPair::from_seed(seed);

        let store = Self {
            salt,
            password_hash,
            encrypted_seed,
            encrypted_signed_prekey: None,
            encrypted_one_time_prekeys: Vec::new(),
            encrypted_sessions: Vec::new(),
        };

        Ok((store, identity))
    }

    /// Open the store, reconstructing the identity from the stored seed
    pub fn open(&self, password: &str) -> Result<IdentityKeyPair> {
        self.verify_password(password)?;

        let encryption_key = derive_encryption_key(password, &self.salt)?;
        let mut seed_bytes = decrypt_data(&encryption_key, &self.encrypted_seed)?;

        if seed_bytes.len() != 32 {
            return Err(Error::Decryption("Corrupt identity seed".to_string()));
        }
        let mut seed = [0u8; 32];
        seed.copy_from_slice(&seed_bytes);
        seed_bytes.zeroize();

        let identity = IdentityKeyPair::from_seed(&seed);
        seed.zeroize();

        Ok(identity)
    }

    /// Verify password without decrypting keys
    pub fn verify_password(&self, password: &str) -> Result<()> {
        let parsed_hash = PasswordHash::new(&self.password_hash)
            .map_err(|e| Error::KeyDerivation(e.to_string()))?;

        argon2_instance()
            .verify_password(password.as_bytes(), &parsed_hash)
            .map_err(|_| Error::InvalidPassword)
    }

    /// Persist the private half of a freshly generated bundle
    ///
    /// Replaces any previously stored signed pre-key and one-time pre-keys.
    pub fn store_private_keys(&mut self, password: &str, keys: &PrivateKeyStore) -> Result<()> {
        self.verify_password(password)?;
        let encryption_key = derive_encryption_key(password, &self.salt)?;

        let spk = keys.signed_prekey();
        self.encrypted_signed_prekey = Some(EncryptedPreKey {
            id: spk.id,
            encrypted_secret: encrypt_data(&encryption_key, &spk.secret_bytes())?,
            signature: Some(spk.signature_bytes().to_vec()),
            created_at: spk.created_at,
        });

        self.encrypted_one_time_prekeys = keys
            .one_time_prekeys()
            .iter()
            .map(|otpk| {
                Ok(EncryptedPreKey {
                    id: otpk.id,
                    encrypted_secret: encrypt_data(&encryption_key, &otpk.secret_bytes())?,
                    signature: None,
                    created_at: chrono::Utc::now().timestamp(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(())
    }

    /// Load the private half of the current bundle
    pub fn private_keys(&self, password: &str) -> Result<Option<PrivateKeyStore>> {
        self.verify_password(password)?;
        let encryption_key = derive_encryption_key(password, &self.salt)?;

        let Some(ref encrypted_spk) = self.encrypted_signed_prekey else {
            return Ok(None);
        };

        let signature = encrypted_spk
            .signature
            .as_ref()
            .ok_or_else(|| Error::KeyNotFound("Missing pre-key signature".to_string()))?;
        let mut spk_secret = decrypt_data(&encryption_key, &encrypted_spk.encrypted_secret)?;
        let signed_prekey = SignedPreKey::from_bytes(
            encrypted_spk.id,
            &spk_secret,
            signature,
            encrypted_spk.created_at,
        )?;
        spk_secret.zeroize();

        let mut one_time_prekeys = Vec::with_capacity(self.encrypted_one_time_prekeys.len());
        for record in &self.encrypted_one_time_prekeys {
            let mut secret = decrypt_data(&encryption_key, &record.encrypted_secret)?;
            one_time_prekeys.push(OneTimePreKey::from_bytes(record.id, &secret)?);
            secret.zeroize();
        }

        Ok(Some(PrivateKeyStore::new(signed_prekey, one_time_prekeys)))
    }

    /// Delete and return the one-time pre-key with the given id
    pub fn consume_one_time_prekey(&mut self, password: &str, id: u32) -> Result<OneTimePreKey> {
        self.verify_password(password)?;
        let encryption_key = derive_encryption_key(password, &self.salt)?;

        let idx = self
            .encrypted_one_time_prekeys
            .iter()
            .position(|k| k.id == id)
            .ok_or_else(|| Error::KeyNotFound(format!("One-time pre-key {}", id)))?;

        let record = self.encrypted_one_time_prekeys.remove(idx);
        let mut secret = decrypt_data(&encryption_key, &record.encrypted_secret)?;
        let otpk = OneTimePreKey::from_bytes(id, &secret)?;
        secret.zeroize();

        Ok(otpk)
    }

    /// Number of available one-time pre-keys
    pub fn one_time_prekey_count(&self) -> usize {
        self.encrypted_one_time_prekeys.len()
    }

    /// Persist an established session, replacing any prior session with the peer
    pub fn put_session(
        &mut self,
        password: &str,
        peer_fingerprint: &str,
        session: &Session,
    ) -> Result<()> {
        self.verify_password(password)?;
        let encryption_key = derive_encryption_key(password, &self.salt)?;

        self.encrypted_sessions
            .retain(|s| s.peer_fingerprint != peer_fingerprint);
        self.encrypted_sessions.push(EncryptedSession {
            peer_fingerprint: peer_fingerprint.to_string(),
            encrypted_secret: encrypt_data(&encryption_key, session.secret())?,
            associated_data: session.associated_data().to_vec(),
            consumed_prekey_id: session.consumed_prekey_id(),
        });

        Ok(())
    }

    /// Load all persisted sessions
    pub fn sessions(&self, password: &str) -> Result<Vec<(String, Session)>> {
        self.verify_password(password)?;
        let encryption_key = derive_encryption_key(password, &self.salt)?;

        let mut sessions = Vec::with_capacity(self.encrypted_sessions.len());
        for record in &self.encrypted_sessions {
            let mut secret_bytes = decrypt_data(&encryption_key, &record.encrypted_secret)?;
            if secret_bytes.len() != 32 {
                return Err(Error::Decryption("Corrupt session secret".to_string()));
            }
            let mut secret = [0u8; 32];
            secret.copy_from_slice(&secret_bytes);
            secret_bytes.zeroize();

            sessions.push((
                record.peer_fingerprint.clone(),
                Session::from_parts(
                    secret,
                    record.associated_data.clone(),
                    record.consumed_prekey_id,
                ),
            ));
        }

        Ok(sessions)
    }

    /// Delete a persisted session
    pub fn delete_session(&mut self, peer_fingerprint: &str) {
        self.encrypted_sessions
            .retain(|s| s.peer_fingerprint != peer_fingerprint);
    }

    /// Serialize the key store to bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize a key store from bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Change the password, re-encrypting everything under the new key
    pub fn change_password(&mut self, old_password: &str, new_password: &str) -> Result<()> {
        self.verify_password(old_password)?;

        let old_key = derive_encryption_key(old_password, &self.salt)?;
        let seed = decrypt_data(&old_key, &self.encrypted_seed)?;

        let mut new_salt = [0u8; SALT_SIZE];
        rand::thread_rng().fill_bytes(&mut new_salt);

        let salt_string =
            SaltString::encode_b64(&new_salt).map_err(|e| Error::KeyDerivation(e.to_string()))?;
        let argon2 = argon2_instance();
        let new_hash = argon2
            .hash_password(new_password.as_bytes(), &salt_string)
            .map_err(|e| Error::KeyDerivation(e.to_string()))?
            .to_string();

        let new_key = derive_encryption_key(new_password, &new_salt)?;

        let new_encrypted_seed = encrypt_data(&new_key, &seed)?;

        let new_signed_prekey = match self.encrypted_signed_prekey {
            Some(ref old_spk) => {
                let secret = decrypt_data(&old_key, &old_spk.encrypted_secret)?;
                Some(EncryptedPreKey {
                    id: old_spk.id,
                    encrypted_secret: encrypt_data(&new_key, &secret)?,
                    signature: old_spk.signature.clone(),
                    created_at: old_spk.created_at,
                })
            }
            None => None,
        };

        let mut new_otpks = Vec::with_capacity(self.encrypted_one_time_prekeys.len());
        for old_otpk in &self.encrypted_one_time_prekeys {
            let secret = decrypt_data(&old_key, &old_otpk.encrypted_secret)?;
            new_otpks.push(EncryptedPreKey {
                id: old_otpk.id,
                encrypted_secret: encrypt_data(&new_key, &secret)?,
                signature: None,
                created_at: old_otpk.created_at,
            });
        }

        let mut new_sessions = Vec::with_capacity(self.encrypted_sessions.len());
        for old_session in &self.encrypted_sessions {
            let secret = decrypt_data(&old_key, &old_session.encrypted_secret)?;
            new_sessions.push(EncryptedSession {
                peer_fingerprint: old_session.peer_fingerprint.clone(),
                encrypted_secret: encrypt_data(&new_key, &secret)?,
                associated_data: old_session.associated_data.clone(),
                consumed_prekey_id: old_session.consumed_prekey_id,
            });
        }

        self.salt = new_salt;
        self.password_hash = new_hash;
        self.encrypted_seed = new_encrypted_seed;
        self.encrypted_signed_prekey = new_signed_prekey;
        self.encrypted_one_time_prekeys = new_otpks;
        self.encrypted_sessions = new_sessions;

        Ok(())
    }
}

/// Derive an encryption key from password using Argon2
fn derive_encryption_key(password: &str, salt: &[u8]) -> Result<[u8; KEY_SIZE]> {
    let mut key = [0u8; KEY_SIZE];
    argon2_instance()
        .hash_password_into(password.as_bytes(), salt, &mut key)
        .map_err(|e| Error::KeyDerivation(e.to_string()))?;

    Ok(key)
}

/// Encrypt data with ChaCha20-Poly1305
fn encrypt_data(key: &[u8; KEY_SIZE], plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher =
        ChaCha20Poly1305::new_from_slice(key).map_err(|e| Error::Encryption(e.to_string()))?;

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| Error::Encryption(e.to_string()))?;

    // Prepend nonce
    let mut result = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    result.extend_from_slice(&nonce_bytes);
    result.extend_from_slice(&ciphertext);

    Ok(result)
}

/// Decrypt data with ChaCha20-Poly1305
fn decrypt_data(key: &[u8; KEY_SIZE], ciphertext: &[u8]) -> Result<Vec<u8>> {
    if ciphertext.len() < NONCE_SIZE {
        return Err(Error::Decryption("Ciphertext too short".to_string()));
    }

    let cipher =
        ChaCha20Poly1305::new_from_slice(key).map_err(|e| Error::Decryption(e.to_string()))?;

    let nonce = Nonce::from_slice(&ciphertext[..NONCE_SIZE]);
    let encrypted = &ciphertext[NONCE_SIZE..];

    let plaintext = cipher
        .decrypt(nonce, encrypted)
        .map_err(|_| Error::Decryption("Decryption failed".to_string()))?;

    Ok(plaintext)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sidebet_core::crypto::generate_key_bundle;

    #[test]
    fn test_keystore_create_and_open() {
        let password = "test_password_123";
        let seed = [5u8; 32];

        let (store, identity1) = KeyStore::create(password, &seed).unwrap();
        let identity2 = store.open(password).unwrap();

        assert_eq!(
            identity1.public_key().fingerprint(),
            identity2.public_key().fingerprint()
        );
    }

    #[test]
    fn test_wrong_password() {
        let (store, _) = KeyStore::create("correct_password", &[5u8; 32]).unwrap();

        assert!(matches!(
            store.open("wrong_password"),
            Err(Error::InvalidPassword)
        ));
    }

    #[test]
    fn test_private_key_storage_round_trip() {
        let password = "test_password";
        let seed = [5u8; 32];
        let (mut store, identity) = KeyStore::create(password, &seed).unwrap();

        let (bundle, private_keys) = generate_key_bundle(&identity);
        store.store_private_keys(password, &private_keys).unwrap();

        let restored = store.private_keys(password).unwrap().unwrap();
        assert_eq!(restored.signed_prekey().id, bundle.signed_prekey.id);
        assert_eq!(restored.one_time_prekey_count(), 10);
        assert!(restored
            .signed_prekey()
            .public_key()
            .verify(&identity.public_key())
            .is_ok());
    }

    #[test]
    fn test_no_bundle_stored() {
        let (store, _) = KeyStore::create("pw", &[5u8; 32]).unwrap();
        assert!(store.private_keys("pw").unwrap().is_none());
    }

    #[test]
    fn test_consume_one_time_prekey() {
        let password = "test_password";
        let (mut store, identity) = KeyStore::create(password, &[5u8; 32]).unwrap();

        let (bundle, private_keys) = generate_key_bundle(&identity);
        store.store_private_keys(password, &private_keys).unwrap();

        let id = bundle.one_time_prekeys[3].id;
        let consumed = store.consume_one_time_prekey(password, id).unwrap();
        assert_eq!(consumed.id, id);
        assert_eq!(store.one_time_prekey_count(), 9);

        assert!(matches!(
            store.consume_one_time_prekey(password, id),
            Err(Error::KeyNotFound(_))
        ));
    }

    #[test]
    fn test_session_persistence() {
        let password = "test_password";
        let (mut store, _) = KeyStore::create(password, &[5u8; 32]).unwrap();

        let session = Session::from_parts([7u8; 32], vec![1, 2, 3], Some(42));
        store.put_session(password, "peer-fp", &session).unwrap();

        let sessions = store.sessions(password).unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].0, "peer-fp");
        assert_eq!(sessions[0].1.secret(), &[7u8; 32]);
        assert_eq!(sessions[0].1.associated_data(), &[1, 2, 3]);
        assert_eq!(sessions[0].1.consumed_prekey_id(), Some(42));

        store.delete_session("peer-fp");
        assert!(store.sessions(password).unwrap().is_empty());
    }

    #[test]
    fn test_keystore_serialization() {
        let password = "test_password";
        let (store1, identity1) = KeyStore::create(password, &[5u8; 32]).unwrap();

        let bytes = store1.to_bytes().unwrap();
        let store2 = KeyStore::from_bytes(&bytes).unwrap();

        let identity2 = store2.open(password).unwrap();
        assert_eq!(
            identity1.public_key().fingerprint(),
            identity2.public_key().fingerprint()
        );
    }

    #[test]
    fn test_change_password() {
        let old_password = "old_password";
        let new_password = "new_password";

        let (mut store, identity1) = KeyStore::create(old_password, &[5u8; 32]).unwrap();
        let (_, private_keys) = generate_key_bundle(&identity1);
        store.store_private_keys(old_password, &private_keys).unwrap();
        store
            .put_session(
                old_password,
                "peer",
                &Session::from_parts([9u8; 32], vec![4, 5], None),
            )
            .unwrap();

        store.change_password(old_password, new_password).unwrap();

        assert!(store.open(old_password).is_err());

        let identity2 = store.open(new_password).unwrap();
        assert_eq!(
            identity1.public_key().fingerprint(),
            identity2.public_key().fingerprint()
        );

        assert!(store.private_keys(new_password).unwrap().is_some());
        assert_eq!(store.one_time_prekey_count(), 10);
        assert_eq!(store.sessions(new_password).unwrap().len(), 1);
    }
}
