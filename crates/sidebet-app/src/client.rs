//! Sidebet client - main application interface
//!
//! Coordinates the crypto core and the encrypted key store: identity
//! lifecycle, bundle publication, session establishment with market
//! counterparties, and sealing/opening of market metadata.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use sidebet_core::crypto::{
    generate_key_bundle, IdentityKeyPair, InitialMessage, KeyBundle, Session, X3dhInitiator,
    X3dhResponder,
};
use sidebet_core::envelope::{encrypt_json, EncryptedEnvelope};
use sidebet_storage::KeyStore;

use crate::error::{Error, Result};

const KEYSTORE_FILE: &str = "keystore.bin";

/// Sidebet client
///
/// Holds the unlocked identity, the at-rest key store and the cache of
/// established sessions keyed by peer fingerprint.
pub struct MarketClient {
    /// Data directory path
    data_dir: PathBuf,
    /// Identity key pair (when unlocked)
    identity: Option<IdentityKeyPair>,
    /// Key store (when unlocked)
    keystore: Option<KeyStore>,
    /// Established sessions by peer fingerprint
    sessions: HashMap<String, Session>,
}

impl MarketClient {
    /// Create a new client with the given data directory
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            identity: None,
            keystore: None,
            sessions: HashMap::new(),
        }
    }

    /// Get the data directory path
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Check if the client has been initialized
    pub fn is_initialized(&self) -> bool {
        self.keystore_path().exists()
    }

    /// Initialize a new identity from a wallet-derived 32-byte seed
    pub fn init(&mut self, password: &str, seed: &[u8; 32]) -> Result<String> {
        if self.is_initialized() {
            return Err(Error::AlreadyInitialized);
        }

        std::fs::create_dir_all(&self.data_dir)?;

        let (keystore, identity) = KeyStore::create(password, seed)?;
        std::fs::write(self.keystore_path(), keystore.to_bytes()?)?;

        let fingerprint = identity.public_key().fingerprint();
        tracing::info!(%fingerprint, "initialized identity");

        self.identity = Some(identity);
        self.keystore = Some(keystore);

        Ok(fingerprint)
    }

    /// Unlock an existing identity and reload persisted sessions
    pub fn unlock(&mut self, password: &str) -> Result<String> {
        if !self.is_initialized() {
            return Err(Error::NotInitialized);
        }

        let keystore_bytes = std::fs::read(self.keystore_path())?;
        let keystore = KeyStore::from_bytes(&keystore_bytes)?;
        let identity = keystore.open(password)?;

        self.sessions = keystore.sessions(password)?.into_iter().collect();
        tracing::debug!(sessions = self.sessions.len(), "restored sessions");

        self.identity = Some(identity);
        self.keystore = Some(keystore);

        self.fingerprint()
    }

    /// Get our identity fingerprint
    pub fn fingerprint(&self) -> Result<String> {
        let identity = self.identity.as_ref().ok_or(Error::NotInitialized)?;
        Ok(identity.public_key().fingerprint())
    }

    /// Generate and persist a fresh key bundle, returning the publishable half
    ///
    /// The public bundle goes to the external bundle registry; the private
    /// half replaces whatever the key store held before.
    pub fn publish_bundle(&mut self, password: &str) -> Result<KeyBundle> {
        let identity = self.identity.as_ref().ok_or(Error::NotInitialized)?;
        let keystore = self.keystore.as_mut().ok_or(Error::NotInitialized)?;

        let (bundle, private_keys) = generate_key_bundle(identity);
        keystore.store_private_keys(password, &private_keys)?;
        std::fs::write(self.data_dir.join(KEYSTORE_FILE), keystore.to_bytes()?)?;

        tracing::info!(
            signed_prekey = bundle.signed_prekey.id,
            one_time_prekeys = bundle.one_time_prekeys.len(),
            "published key bundle"
        );

        Ok(bundle)
    }

    /// Number of one-time pre-keys still held in the key store
    pub fn one_time_prekey_count(&self) -> Result<usize> {
        let keystore = self.keystore.as_ref().ok_or(Error::NotInitialized)?;
        Ok(keystore.one_time_prekey_count())
    }

    /// Start a session with a counterparty from their published bundle
    ///
    /// Returns the initial message to publish alongside the first envelope.
    pub fn invite(&mut self, password: &str, peer_bundle: &KeyBundle) -> Result<InitialMessage> {
        let identity = self.identity.as_ref().ok_or(Error::NotInitialized)?;
        let keystore = self.keystore.as_mut().ok_or(Error::NotInitialized)?;

        let peer_fingerprint = peer_bundle.identity.fingerprint();

        let initiator = X3dhInitiator::new(identity.clone());
        let initiation = initiator.initiate(peer_bundle)?;

        keystore.put_session(password, &peer_fingerprint, &initiation.session)?;
        std::fs::write(self.data_dir.join(KEYSTORE_FILE), keystore.to_bytes()?)?;

        tracing::info!(peer = %peer_fingerprint, "session initiated");
        self.sessions.insert(peer_fingerprint, initiation.session);

        Ok(initiation.message)
    }

    /// Accept a session from a counterparty's initial message
    ///
    /// Consumes the referenced one-time pre-key from the key store and
    /// returns the peer's fingerprint.
    pub fn accept(&mut self, password: &str, message: &InitialMessage) -> Result<String> {
        let identity = self.identity.as_ref().ok_or(Error::NotInitialized)?;
        let keystore = self.keystore.as_mut().ok_or(Error::NotInitialized)?;

        let mut private_keys = keystore.private_keys(password)?.ok_or(Error::NoBundle)?;

        let responder = X3dhResponder::new(identity.clone());
        let session = responder.complete(&mut private_keys, message)?;

        // The completed agreement consumed its one-time pre-key; persist the
        // reduced store along with the new session
        keystore.store_private_keys(password, &private_keys)?;
        let peer_fingerprint = message.identity_key.fingerprint();
        keystore.put_session(password, &peer_fingerprint, &session)?;
        std::fs::write(self.data_dir.join(KEYSTORE_FILE), keystore.to_bytes()?)?;

        tracing::info!(peer = %peer_fingerprint, "session accepted");
        self.sessions.insert(peer_fingerprint.clone(), session);

        Ok(peer_fingerprint)
    }

    /// Fingerprints of all established sessions
    pub fn session_peers(&self) -> Vec<String> {
        self.sessions.keys().cloned().collect()
    }

    /// Encrypt market metadata for a counterparty
    pub fn seal(
        &self,
        peer_fingerprint: &str,
        payload: &serde_json::Value,
    ) -> Result<EncryptedEnvelope> {
        let session = self
            .sessions
            .get(peer_fingerprint)
            .ok_or_else(|| Error::SessionNotFound(peer_fingerprint.to_string()))?;

        let envelope = encrypt_json(session.secret(), payload, session.associated_data())?;
        tracing::debug!(peer = %peer_fingerprint, "sealed envelope");
        Ok(envelope)
    }

    /// Decrypt market metadata from a counterparty
    pub fn open_envelope(
        &self,
        peer_fingerprint: &str,
        envelope: &EncryptedEnvelope,
    ) -> Result<serde_json::Value> {
        let session = self
            .sessions
            .get(peer_fingerprint)
            .ok_or_else(|| Error::SessionNotFound(peer_fingerprint.to_string()))?;

        Ok(envelope.open(session.secret(), session.associated_data())?)
    }

    /// Drop a session and remove it from the key store
    pub fn end_session(&mut self, password: &str, peer_fingerprint: &str) -> Result<()> {
        let keystore = self.keystore.as_mut().ok_or(Error::NotInitialized)?;

        self.sessions.remove(peer_fingerprint);
        keystore.verify_password(password)?;
        keystore.delete_session(peer_fingerprint);
        std::fs::write(self.data_dir.join(KEYSTORE_FILE), keystore.to_bytes()?)?;

        tracing::info!(peer = %peer_fingerprint, "session ended");
        Ok(())
    }

    fn keystore_path(&self) -> PathBuf {
        self.data_dir.join(KEYSTORE_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const PASSWORD: &str = "test_password";

    fn client_pair() -> (tempfile::TempDir, MarketClient, MarketClient) {
        let dir = tempfile::tempdir().unwrap();
        let alice = MarketClient::new(dir.path().join("alice"));
        let bob = MarketClient::new(dir.path().join("bob"));
        (dir, alice, bob)
    }

    #[test]
    fn test_init_is_deterministic_for_seed() {
        let dir = tempfile::tempdir().unwrap();

        let mut c1 = MarketClient::new(dir.path().join("a"));
        let mut c2 = MarketClient::new(dir.path().join("b"));

        let fp1 = c1.init(PASSWORD, &[1u8; 32]).unwrap();
        let fp2 = c2.init(PASSWORD, &[1u8; 32]).unwrap();

        assert_eq!(fp1, fp2);
    }

    #[test]
    fn test_double_init_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut client = MarketClient::new(dir.path());

        client.init(PASSWORD, &[1u8; 32]).unwrap();
        assert!(matches!(
            client.init(PASSWORD, &[2u8; 32]),
            Err(Error::AlreadyInitialized)
        ));
    }

    #[test]
    fn test_invite_accept_seal_open() {
        let (_dir, mut alice, mut bob) = client_pair();

        alice.init(PASSWORD, &[1u8; 32]).unwrap();
        let bob_fp = bob.init(PASSWORD, &[2u8; 32]).unwrap();

        let bob_bundle = bob.publish_bundle(PASSWORD).unwrap();

        let message = alice.invite(PASSWORD, &bob_bundle).unwrap();
        let alice_fp = bob.accept(PASSWORD, &message).unwrap();

        assert_eq!(alice_fp, alice.fingerprint().unwrap());
        assert_eq!(bob.one_time_prekey_count().unwrap(), 9);

        let payload = json!({
            "description": "First to ship wins",
            "participants": ["alice", "bob"],
        });

        let envelope = alice.seal(&bob_fp, &payload).unwrap();
        let opened = bob.open_envelope(&alice_fp, &envelope).unwrap();
        assert_eq!(opened, payload);

        // And the other direction under the same session
        let reply = json!({"ack": true});
        let envelope = bob.seal(&alice_fp, &reply).unwrap();
        let opened = alice.open_envelope(&bob_fp, &envelope).unwrap();
        assert_eq!(opened, reply);
    }

    #[test]
    fn test_replayed_initial_message_rejected() {
        let (_dir, mut alice, mut bob) = client_pair();

        alice.init(PASSWORD, &[1u8; 32]).unwrap();
        bob.init(PASSWORD, &[2u8; 32]).unwrap();

        let bob_bundle = bob.publish_bundle(PASSWORD).unwrap();
        let message = alice.invite(PASSWORD, &bob_bundle).unwrap();

        bob.accept(PASSWORD, &message).unwrap();

        // The one-time pre-key is gone; replay must fail hard
        assert!(matches!(
            bob.accept(PASSWORD, &message),
            Err(Error::Crypto(sidebet_core::Error::MissingKey(_)))
        ));
    }

    #[test]
    fn test_sessions_survive_relock() {
        let (_dir, mut alice, mut bob) = client_pair();

        alice.init(PASSWORD, &[1u8; 32]).unwrap();
        let bob_fp = bob.init(PASSWORD, &[2u8; 32]).unwrap();

        let bob_bundle = bob.publish_bundle(PASSWORD).unwrap();
        let message = alice.invite(PASSWORD, &bob_bundle).unwrap();
        let alice_fp = bob.accept(PASSWORD, &message).unwrap();

        let payload = json!({"market": "rematch"});
        let envelope = alice.seal(&bob_fp, &payload).unwrap();

        // Fresh client over Bob's data directory
        let mut bob2 = MarketClient::new(bob.data_dir());
        bob2.unlock(PASSWORD).unwrap();

        let opened = bob2.open_envelope(&alice_fp, &envelope).unwrap();
        assert_eq!(opened, payload);
    }

    #[test]
    fn test_seal_without_session_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut client = MarketClient::new(dir.path());
        client.init(PASSWORD, &[1u8; 32]).unwrap();

        assert!(matches!(
            client.seal("unknown-peer", &json!({})),
            Err(Error::SessionNotFound(_))
        ));
    }

    #[test]
    fn test_end_session() {
        let (_dir, mut alice, mut bob) = client_pair();

        alice.init(PASSWORD, &[1u8; 32]).unwrap();
        let bob_fp = bob.init(PASSWORD, &[2u8; 32]).unwrap();

        let bob_bundle = bob.publish_bundle(PASSWORD).unwrap();
        alice.invite(PASSWORD, &bob_bundle).unwrap();

        alice.end_session(PASSWORD, &bob_fp).unwrap();
        assert!(alice.session_peers().is_empty());
        assert!(matches!(
            alice.seal(&bob_fp, &json!({})),
            Err(Error::SessionNotFound(_))
        ));

        // Gone after relock too
        let mut alice2 = MarketClient::new(alice.data_dir());
        alice2.unlock(PASSWORD).unwrap();
        assert!(alice2.session_peers().is_empty());
    }

    #[test]
    fn test_accept_without_bundle_fails() {
        let (_dir, mut alice, mut bob) = client_pair();

        alice.init(PASSWORD, &[1u8; 32]).unwrap();
        bob.init(PASSWORD, &[2u8; 32]).unwrap();

        let bob_bundle = bob.publish_bundle(PASSWORD).unwrap();
        let message = alice.invite(PASSWORD, &bob_bundle).unwrap();

        // Alice never published a bundle, so she cannot accept
        assert!(matches!(
            alice.accept(PASSWORD, &message),
            Err(Error::NoBundle)
        ));
    }
}
