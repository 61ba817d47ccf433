//! # Secure Storage
//!
//! Key/value storage for secrets that must survive a restart.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      SECURE STORAGE                                     │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  SecureStore                                                    │   │
//! │  │  • store(key, value)   - Store (optionally encrypted) data     │   │
//! │  │  • retrieve(key)       - Retrieve and decrypt data             │   │
//! │  │  • delete(key)         - Remove data                           │   │
//! │  │  • exists(key)         - Check if key exists                   │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  Backends:                                                             │
//! │  ┌───────────────────────────┐  ┌───────────────────────────┐         │
//! │  │  Memory                   │  │  Directory                │         │
//! │  │  RwLock<HashMap>          │  │  one file per key,        │         │
//! │  │  (tests, ephemeral)       │  │  hex-encoded file name,   │         │
//! │  │                           │  │  write-then-rename        │         │
//! │  └───────────────────────────┘  └───────────────────────────┘         │
//! │                                                                         │
//! │  With an encryption key, each value is stored as                       │
//! │  iv ‖ ciphertext ‖ tag, with the key name bound as AAD so a value     │
//! │  cannot be swapped under another name.                                 │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use zeroize::Zeroizing;

use crate::crypto::{decrypt_with_aad, encrypt_with_aad, Sealed, SymmetricKey};
use crate::error::{Error, Result};

/// Key names for secure storage
pub mod keys {
    /// The password-locked identity blob
    pub const LOCKED_IDENTITY: &str = "murmur.identity.locked";

    /// Prefix for per-channel symmetric keys (`murmur.channel.<id>`)
    pub const CHANNEL_KEY_PREFIX: &str = "murmur.channel.";

    /// Storage name for a channel's key
    pub fn channel_key(channel_id: &str) -> String {
        format!("{}{}", CHANNEL_KEY_PREFIX, channel_id)
    }
}

enum Backend {
    Memory(RwLock<HashMap<String, Vec<u8>>>),
    Directory(PathBuf),
}

/// Device-local secret storage
pub struct SecureStore {
    backend: Backend,

    /// Optional encryption key for additional protection
    encryption_key: Option<SymmetricKey>,
}

impl SecureStore {
    /// Create an in-memory store
    pub fn new() -> Self {
        Self {
            backend: Backend::Memory(RwLock::new(HashMap::new())),
            encryption_key: None,
        }
    }

    /// Create an in-memory store that encrypts every value
    pub fn with_encryption(key: SymmetricKey) -> Self {
        Self {
            backend: Backend::Memory(RwLock::new(HashMap::new())),
            encryption_key: Some(key),
        }
    }

    /// Open a store backed by a directory, creating it if needed
    ///
    /// Values are written as-is until [`SecureStore::encrypted`] adds a key.
    pub fn open_dir(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        fs::create_dir_all(&path).map_err(|e| {
            Error::StorageWriteError(format!("Cannot create {}: {}", path.display(), e))
        })?;
        tracing::debug!("Opened secure store at {}", path.display());
        Ok(Self {
            backend: Backend::Directory(path),
            encryption_key: None,
        })
    }

    /// Add an encryption key to an existing store
    pub fn encrypted(mut self, key: SymmetricKey) -> Self {
        self.encryption_key = Some(key);
        self
    }

    /// Whether values would reach the disk unencrypted
    pub fn is_plaintext_on_disk(&self) -> bool {
        matches!(self.backend, Backend::Directory(_)) && self.encryption_key.is_none()
    }

    /// Store data
    ///
    /// The data will be encrypted if an encryption key was provided.
    pub fn store(&self, key: &str, value: &[u8]) -> Result<()> {
        let data = match self.encryption_key {
            Some(ref enc_key) => encrypt_with_aad(enc_key, value, key.as_bytes())?.to_bytes(),
            None => value.to_vec(),
        };

        self.store_raw(key, &data)
    }

    /// Retrieve data
    ///
    /// The data will be decrypted if an encryption key was provided.
    pub fn retrieve(&self, key: &str) -> Result<Option<Zeroizing<Vec<u8>>>> {
        let data = match self.retrieve_raw(key)? {
            Some(d) => d,
            None => return Ok(None),
        };

        let result = match self.encryption_key {
            Some(ref enc_key) => {
                let sealed = Sealed::from_bytes(&data)
                    .map_err(|_| Error::StorageReadError("Stored data too short".into()))?;
                let plaintext =
                    decrypt_with_aad(enc_key, &sealed.nonce, &sealed.ciphertext, key.as_bytes())
                        .ok_or_else(|| {
                            Error::AuthenticationFailed(format!("Stored value '{}' failed to open", key))
                        })?;
                Zeroizing::new(plaintext)
            }
            None => Zeroizing::new(data),
        };

        Ok(Some(result))
    }

    /// Delete data from storage
    pub fn delete(&self, key: &str) -> Result<bool> {
        match &self.backend {
            Backend::Memory(map) => Ok(map.write().remove(key).is_some()),
            Backend::Directory(dir) => match fs::remove_file(entry_path(dir, key)) {
                Ok(()) => Ok(true),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
                Err(e) => Err(Error::StorageWriteError(format!("Delete failed: {}", e))),
            },
        }
    }

    /// Check if a key exists
    pub fn exists(&self, key: &str) -> Result<bool> {
        match &self.backend {
            Backend::Memory(map) => Ok(map.read().contains_key(key)),
            Backend::Directory(dir) => Ok(entry_path(dir, key).is_file()),
        }
    }

    fn store_raw(&self, key: &str, value: &[u8]) -> Result<()> {
        match &self.backend {
            Backend::Memory(map) => {
                map.write().insert(key.to_string(), value.to_vec());
                Ok(())
            }
            Backend::Directory(dir) => {
                let target = entry_path(dir, key);
                let tmp = target.with_extension("tmp");
                fs::write(&tmp, value)
                    .and_then(|_| fs::rename(&tmp, &target))
                    .map_err(|e| Error::StorageWriteError(format!("Write failed: {}", e)))
            }
        }
    }

    fn retrieve_raw(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match &self.backend {
            Backend::Memory(map) => Ok(map.read().get(key).cloned()),
            Backend::Directory(dir) => match fs::read(entry_path(dir, key)) {
                Ok(data) => Ok(Some(data)),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
                Err(e) => Err(Error::StorageReadError(format!("Read failed: {}", e))),
            },
        }
    }
}

impl Default for SecureStore {
    fn default() -> Self {
        Self::new()
    }
}

// Key names may contain '/', ':' and other characters that are not safe in
// file names.
fn entry_path(dir: &Path, key: &str) -> PathBuf {
    dir.join(format!("{}.bin", hex::encode(key.as_bytes())))
}

// ============================================================================
// TESTS
// ============================================================================
