//! # Cryptography Module
//!
//! Primitives shared by every pipeline in the crate.
//!
//! ## Security Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    CRYPTOGRAPHIC ARCHITECTURE                           │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────────┐         ┌─────────────────┐                       │
//! │  │  Signing Key    │         │ Encryption Key  │   Identity Keypair    │
//! │  │  (Ed25519)      │         │ (X25519)        │   (long-term)         │
//! │  │                 │         │                 │                       │
//! │  │ • Deletion      │         │ • Channel key   │                       │
//! │  │   proofs        │         │   seals (ECDH)  │                       │
//! │  └─────────────────┘         └─────────────────┘                       │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  Symmetric Codec: AES-256-GCM                                   │   │
//! │  │  • 256-bit key   • 96-bit random IV per call   • 128-bit tag    │   │
//! │  │                                                                 │   │
//! │  │  Used by: messages, file chunks, media frames, key seals,      │   │
//! │  │           the password-locked identity blob                    │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  Key Derivation                                                 │   │
//! │  │  • PBKDF2-HMAC-SHA256 (≥250k iterations) → identity lock key   │   │
//! │  │  • HKDF-SHA256(ECDH output, channel id)   → seal key           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Security Considerations
//!
//! 1. **Key Zeroization**: secret keys are zeroized when dropped
//! 2. **Secure Random**: `rand::rngs::OsRng`; failures surface as `RngFailed`
//! 3. **No Nonce Reuse**: the codec generates every IV itself

mod encryption;
mod kdf;
mod keys;
mod signing;

pub use encryption::{
    decrypt, decrypt_with_aad, encrypt, encrypt_with_aad, random_bytes, Nonce, Sealed,
    SymmetricKey, KEY_SIZE, NONCE_SIZE, TAG_SIZE,
};
pub use kdf::{derive_lock_key, derive_seal_key, domain, SALT_SIZE};
pub use keys::{EncryptionKeyPair, KeyPair, PublicKeyBundle, SigningKeyPair};
pub use signing::{sign, verify, Signature, SIGNATURE_SIZE};

/// Size of public keys in bytes
pub const PUBLIC_KEY_SIZE: usize = 32;

/// Serde helper for 32-byte arrays as standard base64
pub(crate) mod b64_32 {
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&BASE64.encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<[u8; 32], D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let bytes = BASE64.decode(&s).map_err(serde::de::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("Invalid length"))
    }
}

/// Serde helper for variable-length byte strings as standard base64
pub(crate) mod b64_vec {
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&BASE64.encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        BASE64.decode(&s).map_err(serde::de::Error::custom)
    }
}
