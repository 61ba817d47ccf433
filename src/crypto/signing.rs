//! # Digital Signatures
//!
//! Ed25519 signatures over canonical byte strings.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │   sign(signing_keypair, message)      → 64-byte signature              │
//! │   verify(public_key, message, sig)    → Ok(()) | VerificationFailed    │
//! │                                                                         │
//! │   Deterministic: same key + same message = same signature              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use ed25519_dalek::{Signature as Ed25519Signature, Signer, VerifyingKey};
use serde::{Deserialize, Serialize};

use super::keys::SigningKeyPair;
use crate::error::{Error, Result};

/// Size of an Ed25519 signature in bytes
pub const SIGNATURE_SIZE: usize = 64;

/// An Ed25519 digital signature
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature(#[serde(with = "signature_bytes")] pub [u8; SIGNATURE_SIZE]);

impl Signature {
    /// Create from raw bytes
    pub fn from_bytes(bytes: [u8; SIGNATURE_SIZE]) -> Self {
        Self(bytes)
    }

    /// Create from a slice (must be exactly 64 bytes)
    pub fn from_slice(slice: &[u8]) -> Result<Self> {
        let bytes: [u8; SIGNATURE_SIZE] = slice.try_into().map_err(|_| {
            Error::MalformedInput(format!(
                "Signature must be {} bytes, got {}",
                SIGNATURE_SIZE,
                slice.len()
            ))
        })?;
        Ok(Self(bytes))
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; SIGNATURE_SIZE] {
        &self.0
    }

    /// Encode as hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Decode from hex string
    pub fn from_hex(hex_str: &str) -> Result<Self> {
        let bytes = hex::decode(hex_str)
            .map_err(|e| Error::MalformedInput(format!("Invalid signature hex: {}", e)))?;
        Self::from_slice(&bytes)
    }
}

/// Sign a message using Ed25519
pub fn sign(keypair: &SigningKeyPair, message: &[u8]) -> Signature {
    let sig = keypair.signing_key().sign(message);
    Signature(sig.to_bytes())
}

/// Verify an Ed25519 signature
///
/// Uses strict verification so malleable encodings are rejected.
pub fn verify(public_key: &[u8; 32], message: &[u8], signature: &Signature) -> Result<()> {
    let verifying_key = VerifyingKey::from_bytes(public_key)
        .map_err(|e| Error::InvalidKey(format!("Invalid public key: {}", e)))?;

    let sig = Ed25519Signature::from_bytes(&signature.0);

    verifying_key
        .verify_strict(message, &sig)
        .map_err(|_| Error::VerificationFailed)
}

/// Serde helper for signature bytes
mod signature_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8; 64], serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> std::result::Result<[u8; 64], D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("Invalid signature length"))
    }
}

// ============================================================================
// TESTS
// ============================================================================
