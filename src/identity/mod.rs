//! # Identity Module
//!
//! The device's long-term identity keypair and its password-locked storage.
//!
//! ## Identity Lifecycle
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      IDENTITY LIFECYCLE                                 │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  generate_identity()                                                   │
//! │        │   X25519 + Ed25519 from OsRng                                 │
//! │        ▼                                                               │
//! │  ┌─────────────┐   lock(password)    ┌──────────────────────┐         │
//! │  │  Identity   │ ──────────────────► │   LockedKeyBlob      │         │
//! │  │ (in memory) │                     │ {version, iterations,│         │
//! │  │             │ ◄────────────────── │  salt, nonce, ct}    │         │
//! │  └─────────────┘   unlock(password)  └──────────────────────┘         │
//! │        │                                       │                       │
//! │        │ cache()                               │ persist() / load()    │
//! │        ▼                                       ▼                       │
//! │  ┌─────────────┐                     ┌──────────────────────┐         │
//! │  │ Session     │                     │    SecureStore       │         │
//! │  │ cache       │                     │  (device-local)      │         │
//! │  └─────────────┘                     └──────────────────────┘         │
//! │                                                                         │
//! │  Only `public_keys()` ever leaves the device.                         │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

mod locked;
mod store;

pub use locked::{lock_identity, unlock_identity, LockedKeyBlob, LOCKED_BLOB_VERSION};
pub use store::IdentityStore;

use zeroize::Zeroizing;

use crate::crypto::{EncryptionKeyPair, KeyPair, PublicKeyBundle, SigningKeyPair};
use crate::error::{Error, Result};

/// Length of a serialized identity: Ed25519 `seed ‖ public` then X25519 secret
pub const IDENTITY_BYTES: usize = 64 + 32;

/// A device identity: the two long-term keypairs
///
/// Secrets are zeroized when this value is dropped.
pub struct Identity {
    keypair: KeyPair,
}

impl Identity {
    /// Wrap an existing keypair
    pub fn from_keypair(keypair: KeyPair) -> Self {
        Self { keypair }
    }

    /// Access the keypairs
    pub fn keypair(&self) -> &KeyPair {
        &self.keypair
    }

    /// The two public keys, safe to publish
    pub fn public_keys(&self) -> PublicKeyBundle {
        self.keypair.public_keys()
    }

    /// Serialize the secret material
    ///
    /// Layout: `ed25519 seed ‖ ed25519 public ‖ x25519 secret`.
    pub fn to_bytes(&self) -> Zeroizing<Vec<u8>> {
        let mut out = Zeroizing::new(Vec::with_capacity(IDENTITY_BYTES));
        out.extend_from_slice(&self.keypair.signing.keypair_bytes()[..]);
        out.extend_from_slice(&self.keypair.encryption.secret_bytes()[..]);
        out
    }

    /// Parse the output of [`Identity::to_bytes`]
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != IDENTITY_BYTES {
            return Err(Error::MalformedInput(format!(
                "Identity must be {} bytes, got {}",
                IDENTITY_BYTES,
                bytes.len()
            )));
        }

        let mut signing = Zeroizing::new([0u8; 64]);
        signing.copy_from_slice(&bytes[..64]);
        let mut encryption = Zeroizing::new([0u8; 32]);
        encryption.copy_from_slice(&bytes[64..]);

        Ok(Self {
            keypair: KeyPair {
                signing: SigningKeyPair::from_keypair_bytes(&signing)?,
                encryption: EncryptionKeyPair::from_bytes(&encryption),
            },
        })
    }
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("fingerprint", &self.public_keys().fingerprint())
            .finish_non_exhaustive()
    }
}

/// Generate a fresh identity from the OS CSPRNG
///
/// Fails with `RngFailed` if the OS random source is unavailable.
pub fn generate_identity() -> Result<Identity> {
    let keypair = KeyPair::generate()?;
    let identity = Identity::from_keypair(keypair);
    tracing::info!("Generated identity {}", identity.public_keys().fingerprint());
    Ok(identity)
}

// ============================================================================
// TESTS
// ============================================================================
