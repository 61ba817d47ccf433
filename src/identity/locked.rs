//! Password-locked identity blob.
//!
//! ```text
//! password ──PBKDF2-HMAC-SHA256(salt, iterations)──► lock key
//! lock key ──AES-256-GCM(nonce, aad = "murmur-identity-v1")──► ciphertext
//! ```

use serde::{Deserialize, Serialize};

use super::Identity;
use crate::config::MIN_PBKDF2_ITERATIONS;
use crate::crypto::{
    decrypt_with_aad, derive_lock_key, encrypt_with_aad, random_bytes, Nonce, SALT_SIZE,
};
use crate::error::{Error, Result};

/// Current blob format version
pub const LOCKED_BLOB_VERSION: u8 = 1;

const LOCK_AAD: &[u8] = b"murmur-identity-v1";

/// A serialized identity encrypted under a password-derived key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockedKeyBlob {
    /// Format version
    pub version: u8,
    /// PBKDF2 iteration count used to derive the lock key
    pub iterations: u32,
    /// Random PBKDF2 salt (16 bytes)
    #[serde(with = "crate::crypto::b64_vec")]
    pub salt: Vec<u8>,
    /// AES-GCM nonce (12 bytes)
    #[serde(with = "crate::crypto::b64_vec")]
    pub nonce: Vec<u8>,
    /// Encrypted identity with tag
    #[serde(with = "crate::crypto::b64_vec")]
    pub ciphertext: Vec<u8>,
}

impl LockedKeyBlob {
    /// Serialize to JSON for storage
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Lock an identity under a password
///
/// ## Parameters
///
/// - `identity`: The identity to lock
/// - `password`: User password
/// - `iterations`: PBKDF2 rounds, at least `MIN_PBKDF2_ITERATIONS`
pub fn lock_identity(identity: &Identity, password: &str, iterations: u32) -> Result<LockedKeyBlob> {
    let salt: [u8; SALT_SIZE] = random_bytes()?;
    let key = derive_lock_key(password, &salt, iterations)?;

    let plaintext = identity.to_bytes();
    let sealed = encrypt_with_aad(&key, &plaintext, LOCK_AAD)?;

    Ok(LockedKeyBlob {
        version: LOCKED_BLOB_VERSION,
        iterations,
        salt: salt.to_vec(),
        nonce: sealed.nonce.as_bytes().to_vec(),
        ciphertext: sealed.ciphertext,
    })
}

/// Unlock a blob with a password
///
/// A wrong password and a corrupted blob are indistinguishable: both
/// return `AuthenticationFailed` and no plaintext.
pub fn unlock_identity(blob: &LockedKeyBlob, password: &str) -> Result<Identity> {
    if blob.version != LOCKED_BLOB_VERSION {
        return Err(Error::MalformedInput(format!(
            "Unsupported identity blob version {}",
            blob.version
        )));
    }
    if blob.iterations < MIN_PBKDF2_ITERATIONS {
        return Err(Error::MalformedInput(format!(
            "Identity blob iteration count {} below minimum",
            blob.iterations
        )));
    }
    let salt: [u8; SALT_SIZE] = blob
        .salt
        .as_slice()
        .try_into()
        .map_err(|_| Error::MalformedInput("Identity blob salt must be 16 bytes".into()))?;
    let nonce = Nonce::from_slice(&blob.nonce)?;

    let key = derive_lock_key(password, &salt, blob.iterations)?;

    let plaintext = zeroize::Zeroizing::new(
        decrypt_with_aad(&key, &nonce, &blob.ciphertext, LOCK_AAD).ok_or_else(|| {
            Error::AuthenticationFailed("wrong password or corrupted store".into())
        })?,
    );

    Identity::from_bytes(&plaintext)
}

// ============================================================================
// TESTS
// ============================================================================
