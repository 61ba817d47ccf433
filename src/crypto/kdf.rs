//! # Key Derivation Functions
//!
//! Two derivations exist in this crate, and nothing else is ever derived:
//! channel, file and media keys are purely random.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    KEY DERIVATION                                       │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌───────────────────────────┐   ┌───────────────────────────┐         │
//! │  │     IDENTITY LOCK KEY     │   │        SEAL KEY           │         │
//! │  │                           │   │                           │         │
//! │  │  PBKDF2-HMAC-SHA256(      │   │  HKDF-SHA256(             │         │
//! │  │    password,              │   │    ikm  = X25519(our_sk,  │         │
//! │  │    salt = 16 random bytes,│   │                their_pk), │         │
//! │  │    iterations ≥ 250 000   │   │    salt = channel_id,     │         │
//! │  │  )                        │   │    info = "murmur-channel │         │
//! │  │                           │   │            -key-seal-v1"  │         │
//! │  │  → 32-byte AES key        │   │  )                        │         │
//! │  │    for the Locked Blob    │   │  → 32-byte AES key        │         │
//! │  └───────────────────────────┘   └───────────────────────────┘         │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::num::NonZeroU32;

use hkdf::Hkdf;
use ring::pbkdf2;
use sha2::Sha256;
use zeroize::Zeroizing;

use super::encryption::{SymmetricKey, KEY_SIZE};
use crate::config::MIN_PBKDF2_ITERATIONS;
use crate::error::{Error, Result};

/// Salt length for the password lock (128 bits)
pub const SALT_SIZE: usize = 16;

/// Domain separation strings for HKDF
pub mod domain {
    /// Domain for per-recipient channel key seals
    pub const CHANNEL_KEY_SEAL: &[u8] = b"murmur-channel-key-seal-v1";
}

/// Derive the AES key that locks an identity blob
///
/// Refuses iteration counts below `MIN_PBKDF2_ITERATIONS`: a blob that
/// claims fewer rounds was not produced by this crate.
pub fn derive_lock_key(
    password: &str,
    salt: &[u8; SALT_SIZE],
    iterations: u32,
) -> Result<SymmetricKey> {
    if iterations < MIN_PBKDF2_ITERATIONS {
        return Err(Error::KeyDerivationFailed(format!(
            "PBKDF2 iteration count {} is below the minimum of {}",
            iterations, MIN_PBKDF2_ITERATIONS
        )));
    }
    let rounds = NonZeroU32::new(iterations)
        .ok_or_else(|| Error::KeyDerivationFailed("zero PBKDF2 iterations".into()))?;

    let mut key = Zeroizing::new([0u8; KEY_SIZE]);
    pbkdf2::derive(
        pbkdf2::PBKDF2_HMAC_SHA256,
        rounds,
        salt,
        password.as_bytes(),
        &mut key[..],
    );

    Ok(SymmetricKey::from_bytes(*key))
}

/// Derive the AES key for one channel key seal
///
/// ## Parameters
///
/// - `dh_output`: Raw 32-byte output from X25519 Diffie-Hellman
/// - `channel_id`: Channel the sealed key belongs to
pub fn derive_seal_key(dh_output: &[u8; 32], channel_id: &[u8]) -> Result<SymmetricKey> {
    let hkdf = Hkdf::<Sha256>::new(Some(channel_id), dh_output);

    let mut key = Zeroizing::new([0u8; KEY_SIZE]);
    hkdf.expand(domain::CHANNEL_KEY_SEAL, &mut key[..])
        .map_err(|_| Error::KeyDerivationFailed("HKDF expansion failed".into()))?;

    Ok(SymmetricKey::from_bytes(*key))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_key_deterministic() {
        let salt = [9u8; SALT_SIZE];
        let k1 = derive_lock_key("hunter2", &salt, MIN_PBKDF2_ITERATIONS).unwrap();
        let k2 = derive_lock_key("hunter2", &salt, MIN_PBKDF2_ITERATIONS).unwrap();
        assert_eq!(k1, k2);
    }

    #[test]
    fn test_lock_key_depends_on_password_and_salt() {
        let salt = [9u8; SALT_SIZE];
        let base = derive_lock_key("hunter2", &salt, MIN_PBKDF2_ITERATIONS).unwrap();
        let other_pw = derive_lock_key("hunter3", &salt, MIN_PBKDF2_ITERATIONS).unwrap();
        let other_salt = derive_lock_key("hunter2", &[1u8; SALT_SIZE], MIN_PBKDF2_ITERATIONS).unwrap();
        assert_ne!(base, other_pw);
        assert_ne!(base, other_salt);
    }

    #[test]
    fn test_lock_key_rejects_weak_iterations() {
        let result = derive_lock_key("pw", &[0u8; SALT_SIZE], 10_000);
        assert!(matches!(result, Err(Error::KeyDerivationFailed(_))));
    }

    #[test]
    fn test_seal_key_bound_to_channel() {
        let dh = [42u8; 32];
        let a = derive_seal_key(&dh, b"channel-a").unwrap();
        let a2 = derive_seal_key(&dh, b"channel-a").unwrap();
        let b = derive_seal_key(&dh, b"channel-b").unwrap();
        assert_eq!(a, a2);
        assert_ne!(a, b);
    }
}
