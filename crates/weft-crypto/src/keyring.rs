//! Keyring and keypair management using Ed25519

use std::collections::HashMap;

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

use weft_core::{
    Assertion, Credential, DeviceKey, FeedKey, IdentityKey, PrincipalKey, SpaceKey, KEY_LEN,
    SIGNATURE_LEN,
};

/// An Ed25519 keypair held by this party.
#[derive(Clone)]
pub struct Keypair {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
}

impl Keypair {
    /// Generate a fresh random keypair.
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        let verifying_key = signing_key.verifying_key();
        Keypair {
            signing_key,
            verifying_key,
        }
    }

    /// Restore a keypair from its secret bytes.
    pub fn from_bytes(bytes: &[u8; KEY_LEN]) -> Self {
        let signing_key = SigningKey::from_bytes(bytes);
        let verifying_key = signing_key.verifying_key();
        Keypair {
            signing_key,
            verifying_key,
        }
    }

    /// Secret key bytes.
    pub fn secret_bytes(&self) -> [u8; KEY_LEN] {
        self.signing_key.to_bytes()
    }

    /// Public key bytes.
    pub fn public_bytes(&self) -> [u8; KEY_LEN] {
        self.verifying_key.to_bytes()
    }

    /// Sign a message with this keypair.
    pub fn sign(&self, message: &[u8]) -> [u8; SIGNATURE_LEN] {
        self.signing_key.sign(message).to_bytes()
    }

    pub fn as_feed_key(&self) -> FeedKey {
        FeedKey::new(self.public_bytes())
    }

    pub fn as_space_key(&self) -> SpaceKey {
        SpaceKey::new(self.public_bytes())
    }

    pub fn as_identity_key(&self) -> IdentityKey {
        IdentityKey::new(self.public_bytes())
    }

    pub fn as_device_key(&self) -> DeviceKey {
        DeviceKey::new(self.public_bytes())
    }
}

impl std::fmt::Debug for Keypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keypair")
            .field("public", &self.as_feed_key())
            .finish_non_exhaustive()
    }
}

/// Holds the private halves of keys this party owns.
#[derive(Default)]
pub struct Keyring {
    keys: HashMap<[u8; KEY_LEN], Keypair>,
}

impl Keyring {
    pub fn new() -> Self {
        Keyring {
            keys: HashMap::new(),
        }
    }

    /// Generate a fresh keypair and retain its secret half.
    pub fn generate(&mut self) -> Keypair {
        let keypair = Keypair::generate();
        tracing::debug!(key = %keypair.as_feed_key(), "generated keypair");
        self.keys.insert(keypair.public_bytes(), keypair.clone());
        keypair
    }

    /// Retain an externally created keypair.
    pub fn insert(&mut self, keypair: Keypair) {
        self.keys.insert(keypair.public_bytes(), keypair);
    }

    /// The keypair for a public key, if this party holds its secret.
    pub fn keypair(&self, public: &[u8; KEY_LEN]) -> Option<&Keypair> {
        self.keys.get(public)
    }

    /// True if this party can sign for the given public key.
    pub fn holds(&self, public: &[u8; KEY_LEN]) -> bool {
        self.keys.contains_key(public)
    }

    /// Sign `message` with the key identified by `public`, if held.
    pub fn sign(&self, public: &[u8; KEY_LEN], message: &[u8]) -> Option<[u8; SIGNATURE_LEN]> {
        self.keys.get(public).map(|kp| kp.sign(message))
    }
}

/// Verify a signature for any public key. Returns `false` on malformed
/// keys or signatures, never an error.
pub fn verify(public: &[u8; KEY_LEN], message: &[u8], signature: &[u8; SIGNATURE_LEN]) -> bool {
    let Ok(verifying_key) = VerifyingKey::from_bytes(public) else {
        return false;
    };
    let sig = Signature::from_bytes(signature);
    verifying_key.verify(message, &sig).is_ok()
}

/// Issue a credential, signing the proof with the issuer's keypair.
///
/// The caller is responsible for `keypair` actually being the issuer's;
/// a mismatched proof simply fails verification on every peer.
pub fn issue_credential(
    keypair: &Keypair,
    issuer: impl Into<PrincipalKey>,
    subject: impl Into<PrincipalKey>,
    assertion: Assertion,
) -> Credential {
    let mut credential = Credential::new(issuer, subject, assertion);
    credential.proof = keypair.sign(&credential.proof_bytes());
    credential
}

/// Check a credential's issuer proof. `false` on any malformed input.
pub fn verify_credential(credential: &Credential) -> bool {
    verify(
        credential.issuer.key_bytes(),
        &credential.proof_bytes(),
        &credential.proof,
    )
}

/// Digest of an invitation secret, used to index the single-use registry
/// without retaining the secret itself.
pub fn secret_digest(secret: &[u8]) -> [u8; KEY_LEN] {
    let mut hasher = Sha256::new();
    hasher.update(secret);
    hasher.finalize().into()
}

/// Generate a fresh random invitation secret.
pub fn generate_secret() -> [u8; KEY_LEN] {
    use rand::RngCore;
    let mut secret = [0u8; KEY_LEN];
    OsRng.fill_bytes(&mut secret);
    secret
}
