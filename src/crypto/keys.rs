//! # Key Management
//!
//! Long-term identity keys.
//!
//! ## Key Types
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          KEY TYPES                                      │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  SigningKeyPair (Ed25519)                                       │   │
//! │  │  • Signs deletion proofs                                        │   │
//! │  │  • Secret: 64 bytes (seed ‖ public), zeroized on drop           │   │
//! │  │  • Public: 32 bytes                                             │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  EncryptionKeyPair (X25519)                                     │   │
//! │  │  • ECDH for sealing channel keys to a recipient                 │   │
//! │  │  • Secret: 32 bytes, zeroized on drop                           │   │
//! │  │  • Public: 32 bytes                                             │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  KeyPair = SigningKeyPair + EncryptionKeyPair                          │
//! │  PublicKeyBundle = the two public halves, safe to publish              │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use ed25519_dalek::{SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};
use zeroize::{Zeroizing, ZeroizeOnDrop};

use super::encryption::random_bytes;
use crate::error::{Error, Result};

/// Combined keypair containing both signing and encryption keys
///
/// ## Security
///
/// - Private keys are zeroized when this struct is dropped
/// - Public keys can be safely shared with anyone
#[derive(ZeroizeOnDrop)]
pub struct KeyPair {
    /// Ed25519 keypair for signing
    pub signing: SigningKeyPair,
    /// X25519 keypair for encryption
    pub encryption: EncryptionKeyPair,
}

impl KeyPair {
    /// Generate a new random keypair
    ///
    /// Each half draws its own fresh entropy from the OS.
    pub fn generate() -> Result<Self> {
        Ok(Self {
            signing: SigningKeyPair::generate()?,
            encryption: EncryptionKeyPair::generate()?,
        })
    }

    /// Get the public keys for publishing
    pub fn public_keys(&self) -> PublicKeyBundle {
        PublicKeyBundle {
            encryption: self.encryption.public_bytes(),
            signing: self.signing.public_bytes(),
        }
    }
}

/// Ed25519 signing keypair
#[derive(ZeroizeOnDrop)]
pub struct SigningKeyPair {
    #[zeroize(skip)] // ed25519_dalek::SigningKey handles its own zeroization
    secret: SigningKey,
}

impl SigningKeyPair {
    /// Generate a new random signing keypair
    pub fn generate() -> Result<Self> {
        let seed = Zeroizing::new(random_bytes::<32>()?);
        Ok(Self {
            secret: SigningKey::from_bytes(&seed),
        })
    }

    /// Restore from the 64-byte `seed ‖ public` form
    ///
    /// Fails if the public half does not match the seed.
    pub fn from_keypair_bytes(bytes: &[u8; 64]) -> Result<Self> {
        let secret = SigningKey::from_keypair_bytes(bytes)
            .map_err(|e| Error::InvalidKey(format!("Invalid signing keypair: {}", e)))?;
        Ok(Self { secret })
    }

    /// Get the 64-byte secret (`seed ‖ public`) for the locked store
    ///
    /// ## Security Warning
    ///
    /// Only use this for secure storage. Never log or transmit these bytes.
    pub fn keypair_bytes(&self) -> Zeroizing<[u8; 64]> {
        Zeroizing::new(self.secret.to_keypair_bytes())
    }

    /// Get the public key bytes
    pub fn public_bytes(&self) -> [u8; 32] {
        self.secret.verifying_key().to_bytes()
    }

    /// Get the verifying key for signature verification
    pub fn verifying_key(&self) -> VerifyingKey {
        self.secret.verifying_key()
    }

    pub(crate) fn signing_key(&self) -> &SigningKey {
        &self.secret
    }
}

/// X25519 encryption keypair for key exchange
#[derive(ZeroizeOnDrop)]
pub struct EncryptionKeyPair {
    #[zeroize(skip)] // x25519_dalek handles its own zeroization
    secret: StaticSecret,
    #[zeroize(skip)]
    public: X25519PublicKey,
}

impl EncryptionKeyPair {
    /// Generate a new random encryption keypair
    pub fn generate() -> Result<Self> {
        let bytes = Zeroizing::new(random_bytes::<32>()?);
        Ok(Self::from_bytes(&bytes))
    }

    /// Create from raw secret bytes
    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        let secret = StaticSecret::from(*bytes);
        let public = X25519PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Get the secret key bytes (for the locked store)
    ///
    /// ## Security Warning
    ///
    /// Only use this for secure storage. Never log or transmit these bytes.
    pub fn secret_bytes(&self) -> Zeroizing<[u8; 32]> {
        Zeroizing::new(self.secret.to_bytes())
    }

    /// Get the public key bytes
    pub fn public_bytes(&self) -> [u8; 32] {
        self.public.to_bytes()
    }

    /// Perform Diffie-Hellman key exchange
    ///
    /// - Alice: alice_secret × bob_public
    /// - Bob: bob_secret × alice_public
    ///
    /// Both computations produce the same shared secret. Rejects low-order
    /// peer keys that would force an all-zero output.
    pub fn diffie_hellman(&self, their_public: &[u8; 32]) -> Result<Zeroizing<[u8; 32]>> {
        let their_public = X25519PublicKey::from(*their_public);
        let shared = self.secret.diffie_hellman(&their_public);
        if !shared.was_contributory() {
            return Err(Error::InvalidKey("Non-contributory X25519 public key".into()));
        }
        Ok(Zeroizing::new(shared.to_bytes()))
    }
}

/// Public identity keys, as returned by the external key lookup
///
/// Wire form: `{"encPublicKey": "<base64>", "signPublicKey": "<base64>"}`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PublicKeyBundle {
    /// X25519 public key for sealing (32 bytes)
    #[serde(rename = "encPublicKey", with = "super::b64_32")]
    pub encryption: [u8; 32],

    /// Ed25519 public key for signature verification (32 bytes)
    #[serde(rename = "signPublicKey", with = "super::b64_32")]
    pub signing: [u8; 32],
}

impl PublicKeyBundle {
    /// Get the verifying key for signature verification
    pub fn verifying_key(&self) -> Result<VerifyingKey> {
        VerifyingKey::from_bytes(&self.signing)
            .map_err(|e| Error::InvalidKey(format!("Invalid signing public key: {}", e)))
    }

    /// Short hex fingerprint for logs and safety-number UIs
    pub fn fingerprint(&self) -> String {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(self.encryption);
        hasher.update(self.signing);
        hex::encode(&hasher.finalize()[..8])
    }
}

// ============================================================================
// TESTS
// ============================================================================
