//! Extended Triple Diffie-Hellman (X3DH) session establishment
//!
//! Combines long-term, medium-term and ephemeral key pairs into one shared
//! secret without requiring both parties online simultaneously. Also provides
//! the degenerate single-DH agreement for always-online peers.
//!
//! The DH concatenation order is fixed; initiator and responder must combine
//! terms identically or the derived secrets silently diverge.

use serde::{Deserialize, Serialize};
use x25519_dalek::{PublicKey as X25519PublicKey, SharedSecret, StaticSecret as X25519SecretKey};
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::bundle::{KeyBundle, PrivateKeyStore};
use super::kdf::{self, concat_keys, derive_key};
use super::keys::{x25519_public_key_hex, EphemeralKeyPair, IdentityKeyPair, IdentityPublicKey};
use crate::error::{Error, Result};

/// Size of the shared secret in bytes
pub const SHARED_SECRET_SIZE: usize = 32;

/// X3DH protocol info string
const X3DH_INFO: &[u8] = b"X3DH_v1";

/// An established session
///
/// Terminal output of a successful key agreement: the 32-byte shared secret,
/// the associated data both sides bind into envelope encryption, and the id
/// of the one-time pre-key the session consumed, if any.
#[derive(ZeroizeOnDrop)]
pub struct Session {
    secret: [u8; SHARED_SECRET_SIZE],
    #[zeroize(skip)]
    associated_data: Vec<u8>,
    #[zeroize(skip)]
    consumed_prekey_id: Option<u32>,
}

impl Session {
    /// Restore a session from persisted parts
    pub fn from_parts(
        secret: [u8; SHARED_SECRET_SIZE],
        associated_data: Vec<u8>,
        consumed_prekey_id: Option<u32>,
    ) -> Self {
        Self {
            secret,
            associated_data,
            consumed_prekey_id,
        }
    }

    /// Get the shared secret bytes
    pub fn secret(&self) -> &[u8; SHARED_SECRET_SIZE] {
        &self.secret
    }

    /// Get the associated data (both identity DH public keys, initiator first)
    pub fn associated_data(&self) -> &[u8] {
        &self.associated_data
    }

    /// Id of the one-time pre-key this session consumed, if any
    pub fn consumed_prekey_id(&self) -> Option<u32> {
        self.consumed_prekey_id
    }
}

/// Initial message sent from initiator to responder
///
/// Published alongside the first ciphertext so the responder can mirror the
/// key agreement from its stored private keys.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InitialMessage {
    /// Initiator's identity public key
    pub identity_key: IdentityPublicKey,
    /// Ephemeral public key used in this exchange
    #[serde(with = "x25519_public_key_hex")]
    pub ephemeral_key: X25519PublicKey,
    /// Id of the signed pre-key used
    pub signed_prekey_id: u32,
    /// Id of the one-time pre-key used (if any)
    pub one_time_prekey_id: Option<u32>,
}

/// Result of initiating a session
pub struct Initiation {
    /// The established session
    pub session: Session,
    /// Initial message for the responder
    pub message: InitialMessage,
    /// The responder's signed pre-key, usable to seed a ratchet later
    pub peer_ratchet_key: X25519PublicKey,
}

/// X3DH initiator - the party starting the session
pub struct X3dhInitiator {
    identity: IdentityKeyPair,
}

impl X3dhInitiator {
    /// Create a new initiator
    pub fn new(identity: IdentityKeyPair) -> Self {
        Self { identity }
    }

    /// Perform X3DH key agreement against a peer's published bundle
    ///
    /// Verifies the signed pre-key signature before any DH computation. If
    /// the bundle carries one-time pre-keys the first entry is consumed;
    /// otherwise the agreement proceeds without the fourth DH term
    /// (reduced-security mode).
    pub fn initiate(&self, peer_bundle: &KeyBundle) -> Result<Initiation> {
        // Signature gate: abort before any DH on failure
        peer_bundle.verify()?;

        let ephemeral = EphemeralKeyPair::generate();

        // DH1 = DH(IK_self, SPK_peer)
        let dh1 = dh(self.identity.dh_secret(), &peer_bundle.signed_prekey.public)?;
        // DH2 = DH(EK_self, IK_peer)
        let dh2 = dh(ephemeral.secret(), peer_bundle.identity.dh_public())?;
        // DH3 = DH(EK_self, SPK_peer)
        let dh3 = dh(ephemeral.secret(), &peer_bundle.signed_prekey.public)?;

        let mut ikm = concat_keys(&[dh1.as_bytes(), dh2.as_bytes(), dh3.as_bytes()]);

        // DH4 = DH(EK_self, OPK_peer) with the first published one-time pre-key
        let one_time_prekey_id = match peer_bundle.one_time_prekeys.first() {
            Some(opk) => {
                let dh4 = dh(ephemeral.secret(), &opk.public)?;
                ikm.extend_from_slice(dh4.as_bytes());
                Some(opk.id)
            }
            None => None,
        };

        let secret = derive_secret(&ikm)?;
        ikm.zeroize();

        let associated_data = concat_keys(&[
            self.identity.public_key().dh_public().as_bytes(),
            peer_bundle.identity.dh_public().as_bytes(),
        ]);

        let message = InitialMessage {
            identity_key: self.identity.public_key(),
            ephemeral_key: ephemeral.public_key(),
            signed_prekey_id: peer_bundle.signed_prekey.id,
            one_time_prekey_id,
        };

        Ok(Initiation {
            session: Session {
                secret,
                associated_data,
                consumed_prekey_id: one_time_prekey_id,
            },
            message,
            peer_ratchet_key: peer_bundle.signed_prekey.public,
        })
    }
}

/// X3DH responder - the party completing a session from an initial message
pub struct X3dhResponder {
    identity: IdentityKeyPair,
}

impl X3dhResponder {
    /// Create a new responder
    pub fn new(identity: IdentityKeyPair) -> Self {
        Self { identity }
    }

    /// Mirror the initiator's key agreement from stored private keys
    ///
    /// A referenced signed pre-key or one-time pre-key id that is not in the
    /// store is a hard [`Error::MissingKey`]; the fourth DH term is never
    /// silently omitted. The matching one-time pre-key is removed from the
    /// store on use.
    pub fn complete(&self, store: &mut PrivateKeyStore, message: &InitialMessage) -> Result<Session> {
        let signed_prekey = store.signed_prekey();
        if message.signed_prekey_id != signed_prekey.id {
            return Err(Error::MissingKey(format!(
                "signed pre-key {}",
                message.signed_prekey_id
            )));
        }

        // DH1 = DH(SPK_self, IK_peer)
        let dh1 = dh(signed_prekey.secret(), message.identity_key.dh_public())?;
        // DH2 = DH(IK_self, EK_peer)
        let dh2 = dh(self.identity.dh_secret(), &message.ephemeral_key)?;
        // DH3 = DH(SPK_self, EK_peer)
        let dh3 = dh(signed_prekey.secret(), &message.ephemeral_key)?;

        let mut ikm = concat_keys(&[dh1.as_bytes(), dh2.as_bytes(), dh3.as_bytes()]);

        // DH4 = DH(OPK_self, EK_peer); consumes the stored one-time pre-key
        if let Some(id) = message.one_time_prekey_id {
            let opk = store.take_one_time_prekey(id)?;
            let dh4 = dh(opk.secret(), &message.ephemeral_key)?;
            ikm.extend_from_slice(dh4.as_bytes());
        }

        let secret = derive_secret(&ikm)?;
        ikm.zeroize();

        let associated_data = concat_keys(&[
            message.identity_key.dh_public().as_bytes(),
            self.identity.public_key().dh_public().as_bytes(),
        ]);

        Ok(Session {
            secret,
            associated_data,
            consumed_prekey_id: message.one_time_prekey_id,
        })
    }
}

/// Single-DH agreement for always-online peers
///
/// No pre-key apparatus; the caller authenticates the peer's public key out
/// of band before trusting the result.
pub fn simple_key_agreement(
    my_secret: &X25519SecretKey,
    their_public: &X25519PublicKey,
) -> Result<[u8; SHARED_SECRET_SIZE]> {
    let shared = dh(my_secret, their_public)?;
    let mut ikm = shared.as_bytes().to_vec();
    let secret = derive_secret(&ikm)?;
    ikm.zeroize();
    Ok(secret)
}

/// ECDH with rejection of low-order results
fn dh(secret: &X25519SecretKey, public: &X25519PublicKey) -> Result<SharedSecret> {
    let shared = secret.diffie_hellman(public);
    if !shared.was_contributory() {
        return Err(Error::MalformedKey("low-order public key".to_string()));
    }
    Ok(shared)
}

/// HKDF over the concatenated DH outputs: zero salt, "X3DH_v1" info
fn derive_secret(ikm: &[u8]) -> Result<[u8; SHARED_SECRET_SIZE]> {
    let bytes = derive_key(ikm, &kdf::ZERO_SALT, X3DH_INFO, SHARED_SECRET_SIZE)?;
    let mut secret = [0u8; SHARED_SECRET_SIZE];
    secret.copy_from_slice(&bytes);
    Ok(secret)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::bundle::{generate_key_bundle, generate_simple_bundle};

    fn setup_responder() -> (X3dhResponder, KeyBundle, PrivateKeyStore) {
        let identity = IdentityKeyPair::generate();
        let (bundle, store) = generate_key_bundle(&identity);
        (X3dhResponder::new(identity), bundle, store)
    }

    #[test]
    fn test_x3dh_with_one_time_prekey() {
        let alice = X3dhInitiator::new(IdentityKeyPair::generate());
        let (bob, bob_bundle, mut bob_store) = setup_responder();

        let initiation = alice.initiate(&bob_bundle).unwrap();
        assert_eq!(
            initiation.session.consumed_prekey_id(),
            Some(bob_bundle.one_time_prekeys[0].id)
        );

        let bob_session = bob.complete(&mut bob_store, &initiation.message).unwrap();

        assert_eq!(initiation.session.secret(), bob_session.secret());
        assert_eq!(
            initiation.session.associated_data(),
            bob_session.associated_data()
        );

        // The one-time pre-key was consumed
        assert_eq!(bob_store.one_time_prekey_count(), 9);
    }

    #[test]
    fn test_x3dh_without_one_time_prekey() {
        let alice = X3dhInitiator::new(IdentityKeyPair::generate());
        let (bob, mut bob_bundle, mut bob_store) = setup_responder();
        bob_bundle.one_time_prekeys.clear();

        let initiation = alice.initiate(&bob_bundle).unwrap();
        assert_eq!(initiation.message.one_time_prekey_id, None);

        let bob_session = bob.complete(&mut bob_store, &initiation.message).unwrap();

        assert_eq!(initiation.session.secret(), bob_session.secret());
        assert_eq!(bob_store.one_time_prekey_count(), 10);
    }

    #[test]
    fn test_x3dh_associated_data_order() {
        let alice_identity = IdentityKeyPair::generate();
        let alice = X3dhInitiator::new(alice_identity.clone());
        let (bob, bob_bundle, mut bob_store) = setup_responder();

        let initiation = alice.initiate(&bob_bundle).unwrap();
        let bob_session = bob.complete(&mut bob_store, &initiation.message).unwrap();

        let mut expected = alice_identity.public_key().dh_public().as_bytes().to_vec();
        expected.extend_from_slice(bob_bundle.identity.dh_public().as_bytes());

        assert_eq!(initiation.session.associated_data(), expected.as_slice());
        assert_eq!(bob_session.associated_data(), expected.as_slice());
    }

    #[test]
    fn test_signature_gate_rejects_tampered_bundle() {
        let alice = X3dhInitiator::new(IdentityKeyPair::generate());
        let (_, mut bob_bundle, _) = setup_responder();

        // Re-sign the pre-key with a different identity
        let mallory = IdentityKeyPair::generate();
        bob_bundle.signed_prekey.signature =
            mallory.sign(bob_bundle.signed_prekey.public.as_bytes());

        assert!(matches!(
            alice.initiate(&bob_bundle),
            Err(Error::SignatureVerification)
        ));
    }

    #[test]
    fn test_unknown_signed_prekey_id_fails() {
        let alice = X3dhInitiator::new(IdentityKeyPair::generate());
        let (bob, bob_bundle, mut bob_store) = setup_responder();

        let mut initiation = alice.initiate(&bob_bundle).unwrap();
        initiation.message.signed_prekey_id = initiation.message.signed_prekey_id.wrapping_add(1);

        assert!(matches!(
            bob.complete(&mut bob_store, &initiation.message),
            Err(Error::MissingKey(_))
        ));
    }

    #[test]
    fn test_consumed_one_time_prekey_fails_hard() {
        let (bob, bob_bundle, mut bob_store) = setup_responder();

        let alice = X3dhInitiator::new(IdentityKeyPair::generate());
        let initiation = alice.initiate(&bob_bundle).unwrap();
        bob.complete(&mut bob_store, &initiation.message).unwrap();

        // Replaying the same initial message after the pre-key was deleted
        // must not silently drop the fourth DH term
        assert!(matches!(
            bob.complete(&mut bob_store, &initiation.message),
            Err(Error::MissingKey(_))
        ));
    }

    #[test]
    fn test_different_initiators_different_secrets() {
        let alice1 = X3dhInitiator::new(IdentityKeyPair::generate());
        let alice2 = X3dhInitiator::new(IdentityKeyPair::generate());
        let (_, bob_bundle, _) = setup_responder();

        let s1 = alice1.initiate(&bob_bundle).unwrap();
        let s2 = alice2.initiate(&bob_bundle).unwrap();

        assert_ne!(s1.session.secret(), s2.session.secret());
    }

    #[test]
    fn test_peer_ratchet_key_is_signed_prekey() {
        let alice = X3dhInitiator::new(IdentityKeyPair::generate());
        let (_, bob_bundle, _) = setup_responder();

        let initiation = alice.initiate(&bob_bundle).unwrap();
        assert_eq!(
            initiation.peer_ratchet_key.as_bytes(),
            bob_bundle.signed_prekey.public.as_bytes()
        );
    }

    #[test]
    fn test_initial_message_json_round_trip() {
        let alice = X3dhInitiator::new(IdentityKeyPair::generate());
        let (bob, bob_bundle, mut bob_store) = setup_responder();

        let initiation = alice.initiate(&bob_bundle).unwrap();

        let json = serde_json::to_string(&initiation.message).unwrap();
        let restored: InitialMessage = serde_json::from_str(&json).unwrap();

        let bob_session = bob.complete(&mut bob_store, &restored).unwrap();
        assert_eq!(initiation.session.secret(), bob_session.secret());
    }

    #[test]
    fn test_simple_agreement_symmetry() {
        let (a_bundle, a_pair) = generate_simple_bundle();
        let (b_bundle, b_pair) = generate_simple_bundle();

        let ab = simple_key_agreement(a_pair.secret(), &b_bundle.public).unwrap();
        let ba = simple_key_agreement(b_pair.secret(), &a_bundle.public).unwrap();

        assert_eq!(ab, ba);
    }

    #[test]
    fn test_simple_agreement_rejects_low_order_key() {
        let (_, pair) = generate_simple_bundle();
        let zero_point = X25519PublicKey::from([0u8; 32]);

        assert!(matches!(
            simple_key_agreement(pair.secret(), &zero_point),
            Err(Error::MalformedKey(_))
        ));
    }
}
