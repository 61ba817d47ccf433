//! # File Pipeline
//!
//! Files are encrypted under a random one-time `FileKey`. The encrypted blob
//! goes to storage; the key travels inside the (already encrypted) message
//! that references the file, as a `FileAttachment`.

mod envelope;

pub use envelope::{decrypt_file, encrypt_file, encrypt_file_with_chunk_size, FileDecryptor};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::crypto::SymmetricKey;
use crate::error::Result;

/// One-time key for a single file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileKey(SymmetricKey);

impl FileKey {
    /// Generate a fresh random file key
    pub fn generate() -> Result<Self> {
        Ok(Self(SymmetricKey::generate()?))
    }

    /// Encode for embedding in a message payload
    pub fn to_base64(&self) -> String {
        BASE64.encode(self.0.as_bytes())
    }

    /// Decode a key received in a message payload
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let bytes = zeroize::Zeroizing::new(BASE64.decode(encoded)?);
        Ok(Self(SymmetricKey::from_slice(&bytes)?))
    }

    pub(crate) fn as_symmetric(&self) -> &SymmetricKey {
        &self.0
    }
}

impl Serialize for FileKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base64())
    }
}

impl<'de> Deserialize<'de> for FileKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_base64(&s).map_err(serde::de::Error::custom)
    }
}

/// Reference to an encrypted file, carried inside a message payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileAttachment {
    /// Storage id of the encrypted blob
    pub file_id: String,
    /// Original file name
    pub name: String,
    /// Plaintext size in bytes
    pub size: u64,
    /// MIME type, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// Key that opens the blob
    pub key: FileKey,
}
