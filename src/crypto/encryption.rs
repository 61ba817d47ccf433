//! # Symmetric Codec
//!
//! AES-256-GCM authenticated encryption: the one primitive every higher layer
//! calls.
//!
//! ## Codec Contract
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        SYMMETRIC CODEC                                  │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  encrypt(key, plaintext)                                               │
//! │  ┌─────────────────────────────────────────────────────────────┐       │
//! │  │  1. IV ← 12 random bytes from OsRng (generated HERE only)   │       │
//! │  │  2. AES-256-GCM(key, IV, plaintext, aad)                    │       │
//! │  │  → Sealed { iv, ciphertext ‖ 16-byte tag }                  │       │
//! │  └─────────────────────────────────────────────────────────────┘       │
//! │                                                                         │
//! │  decrypt(key, iv, ciphertext)                                          │
//! │  ┌─────────────────────────────────────────────────────────────┐       │
//! │  │  Tag verifies   → Some(plaintext)                           │       │
//! │  │  Anything else  → None                                      │       │
//! │  │  (wrong key, tampered bytes, truncated input all collapse   │       │
//! │  │   to the same answer)                                       │       │
//! │  └─────────────────────────────────────────────────────────────┘       │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! No encrypt entry point accepts an IV from the caller, so IV reuse under a
//! key cannot be expressed through this API.

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Key, Nonce as AesNonce,
};
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{Error, Result};

/// Size of the AES-GCM nonce in bytes (96 bits)
pub const NONCE_SIZE: usize = 12;

/// Size of the AES-GCM authentication tag in bytes (128 bits)
pub const TAG_SIZE: usize = 16;

/// Size of the encryption key in bytes (256 bits)
pub const KEY_SIZE: usize = 32;

/// Fill an array from the OS CSPRNG.
///
/// Returns `RngFailed` instead of panicking when the OS source is
/// unavailable.
pub fn random_bytes<const N: usize>() -> Result<[u8; N]> {
    let mut bytes = [0u8; N];
    rand::rngs::OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| {
            tracing::error!("OS random source unavailable: {}", e);
            Error::RngFailed
        })?;
    Ok(bytes)
}

/// A nonce (number used once) for AES-GCM
///
/// Fresh nonces are only minted inside this module. `from_bytes` exists for
/// reading a nonce back out of a received envelope.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Nonce([u8; NONCE_SIZE]);

impl Nonce {
    fn random() -> Result<Self> {
        Ok(Self(random_bytes()?))
    }

    /// Rebuild a nonce parsed from received data
    pub fn from_bytes(bytes: [u8; NONCE_SIZE]) -> Self {
        Self(bytes)
    }

    /// Parse a nonce from a slice (must be exactly 12 bytes)
    pub fn from_slice(slice: &[u8]) -> Result<Self> {
        let bytes: [u8; NONCE_SIZE] = slice.try_into().map_err(|_| {
            Error::MalformedInput(format!(
                "Nonce must be {} bytes, got {}",
                NONCE_SIZE,
                slice.len()
            ))
        })?;
        Ok(Self(bytes))
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; NONCE_SIZE] {
        &self.0
    }
}

/// A 256-bit AES-GCM key
///
/// Zeroized when dropped.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SymmetricKey([u8; KEY_SIZE]);

impl SymmetricKey {
    /// Generate a purely random key
    pub fn generate() -> Result<Self> {
        Ok(Self(random_bytes()?))
    }

    /// Create from raw bytes
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Create from a slice (must be exactly 32 bytes)
    pub fn from_slice(slice: &[u8]) -> Result<Self> {
        let bytes: [u8; KEY_SIZE] = slice.try_into().map_err(|_| {
            Error::InvalidKey(format!(
                "Symmetric key must be {} bytes, got {}",
                KEY_SIZE,
                slice.len()
            ))
        })?;
        Ok(Self(bytes))
    }

    /// Get the raw key bytes
    ///
    /// Only for sealing the key to a recipient or writing it to the secure
    /// store. Never log these bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.0))
    }
}

impl PartialEq for SymmetricKey {
    fn eq(&self, other: &Self) -> bool {
        use ring::constant_time::verify_slices_are_equal;
        verify_slices_are_equal(&self.0, &other.0).is_ok()
    }
}

impl Eq for SymmetricKey {}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SymmetricKey(<redacted>)")
    }
}

/// Output of one encrypt call: the IV and ciphertext-with-tag
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sealed {
    /// IV generated for this call
    pub nonce: Nonce,
    /// Ciphertext with the 16-byte tag appended
    pub ciphertext: Vec<u8>,
}

impl Sealed {
    /// Serialize as `iv ‖ ciphertext ‖ tag`
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(NONCE_SIZE + self.ciphertext.len());
        out.extend_from_slice(self.nonce.as_bytes());
        out.extend_from_slice(&self.ciphertext);
        out
    }

    /// Parse `iv ‖ ciphertext ‖ tag`
    ///
    /// Only the structure is checked here; authenticity is checked on open.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < NONCE_SIZE + TAG_SIZE {
            return Err(Error::MalformedInput(format!(
                "Sealed data too short: {} bytes (min {})",
                bytes.len(),
                NONCE_SIZE + TAG_SIZE
            )));
        }
        let (iv, ciphertext) = bytes.split_at(NONCE_SIZE);
        Ok(Self {
            nonce: Nonce::from_slice(iv)?,
            ciphertext: ciphertext.to_vec(),
        })
    }

    /// Decrypt with `key` (no AAD)
    pub fn open(&self, key: &SymmetricKey) -> Option<Vec<u8>> {
        decrypt(key, &self.nonce, &self.ciphertext)
    }
}

/// Encrypt with a fresh random IV
///
/// ## Example
///
/// ```ignore
/// let key = SymmetricKey::generate()?;
/// let sealed = encrypt(&key, b"Hello, Bob!")?;
/// ```
pub fn encrypt(key: &SymmetricKey, plaintext: &[u8]) -> Result<Sealed> {
    encrypt_with_aad(key, plaintext, &[])
}

/// Encrypt with a fresh random IV, authenticating `aad` alongside
pub fn encrypt_with_aad(key: &SymmetricKey, plaintext: &[u8], aad: &[u8]) -> Result<Sealed> {
    let nonce = Nonce::random()?;

    let payload = Payload {
        msg: plaintext,
        aad,
    };

    let ciphertext = key
        .cipher()
        .encrypt(AesNonce::from_slice(&nonce.0), payload)
        .map_err(|e| Error::EncryptionFailed(format!("AES-GCM seal failed: {}", e)))?;

    Ok(Sealed { nonce, ciphertext })
}

/// Decrypt and verify
///
/// Returns `None` on any failure. Callers must render `None` as
/// "unable to decrypt".
pub fn decrypt(key: &SymmetricKey, nonce: &Nonce, ciphertext: &[u8]) -> Option<Vec<u8>> {
    decrypt_with_aad(key, nonce, ciphertext, &[])
}

/// Decrypt and verify with associated data
///
/// `aad` must match the value used at encryption.
pub fn decrypt_with_aad(
    key: &SymmetricKey,
    nonce: &Nonce,
    ciphertext: &[u8],
    aad: &[u8],
) -> Option<Vec<u8>> {
    if ciphertext.len() < TAG_SIZE {
        return None;
    }

    let payload = Payload {
        msg: ciphertext,
        aad,
    };

    key.cipher()
        .decrypt(AesNonce::from_slice(&nonce.0), payload)
        .ok()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_decrypt_basic() {
        let key = SymmetricKey::generate().unwrap();
        let plaintext = b"Hello, World!";

        let sealed = encrypt(&key, plaintext).unwrap();
        let decrypted = decrypt(&key, &sealed.nonce, &sealed.ciphertext).unwrap();

        assert_eq!(decrypted, plaintext);
        assert_eq!(sealed.ciphertext.len(), plaintext.len() + TAG_SIZE);
    }

    #[test]
    fn test_encrypt_decrypt_empty() {
        let key = SymmetricKey::generate().unwrap();

        let sealed = encrypt(&key, b"").unwrap();
        let decrypted = sealed.open(&key).unwrap();

        assert!(decrypted.is_empty());
    }

    #[test]
    fn test_wrong_key_returns_none() {
        let key1 = SymmetricKey::generate().unwrap();
        let key2 = SymmetricKey::generate().unwrap();
        assert_ne!(key1, key2);

        let sealed = encrypt(&key1, b"for key1 only").unwrap();
        assert!(sealed.open(&key2).is_none());
    }

    #[test]
    fn test_iv_never_repeats() {
        let key = SymmetricKey::generate().unwrap();
        let plaintext = b"same plaintext";

        let a = encrypt(&key, plaintext).unwrap();
        let b = encrypt(&key, plaintext).unwrap();

        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.ciphertext, b.ciphertext);
        assert_eq!(a.open(&key).unwrap(), plaintext);
        assert_eq!(b.open(&key).unwrap(), plaintext);
    }

    #[test]
    fn test_single_bit_flip_returns_none() {
        let key = SymmetricKey::generate().unwrap();
        let plaintext = b"the quick brown fox jumps";

        let mut sealed = encrypt(&key, plaintext).unwrap();
        sealed.ciphertext[3] ^= 0x01;

        assert!(sealed.open(&key).is_none());
    }

    #[test]
    fn test_wrong_aad_returns_none() {
        let key = SymmetricKey::generate().unwrap();

        let sealed = encrypt_with_aad(&key, b"chunk", b"index-0").unwrap();
        assert!(decrypt_with_aad(&key, &sealed.nonce, &sealed.ciphertext, b"index-1").is_none());
        assert_eq!(
            decrypt_with_aad(&key, &sealed.nonce, &sealed.ciphertext, b"index-0").unwrap(),
            b"chunk"
        );
    }

    #[test]
    fn test_truncated_ciphertext_returns_none() {
        let key = SymmetricKey::generate().unwrap();
        let sealed = encrypt(&key, b"abc").unwrap();
        assert!(decrypt(&key, &sealed.nonce, &sealed.ciphertext[..5]).is_none());
    }

    #[test]
    fn test_sealed_bytes_round_trip() {
        let key = SymmetricKey::generate().unwrap();
        let sealed = encrypt(&key, b"wire format").unwrap();

        let bytes = sealed.to_bytes();
        assert_eq!(bytes.len(), NONCE_SIZE + 11 + TAG_SIZE);

        let parsed = Sealed::from_bytes(&bytes).unwrap();
        assert_eq!(parsed, sealed);
        assert!(Sealed::from_bytes(&bytes[..NONCE_SIZE + TAG_SIZE - 1]).is_err());
    }

    #[test]
    fn test_key_debug_is_redacted() {
        let key = SymmetricKey::from_bytes([7u8; KEY_SIZE]);
        assert_eq!(format!("{:?}", key), "SymmetricKey(<redacted>)");
    }
}
