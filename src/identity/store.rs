//! Identity key store: lock/unlock, persistence and the session cache.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use super::locked::{lock_identity, unlock_identity, LockedKeyBlob};
use super::Identity;
use crate::config::E2eeConfig;
use crate::error::{Error, Result};
use crate::storage::{keys, SecureStore};

/// Per-device identity key store
///
/// Lock and unlock on one store are serialized. The cache holds the only
/// long-lived strong reference to the unlocked identity; clearing it lets the
/// secrets be zeroized once callers drop their clones.
pub struct IdentityStore {
    storage: Arc<SecureStore>,
    config: E2eeConfig,
    op_lock: Mutex<()>,
    cached: RwLock<Option<Arc<Identity>>>,
}

impl IdentityStore {
    /// Create a store over device-local storage
    pub fn new(storage: Arc<SecureStore>, config: E2eeConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            storage,
            config,
            op_lock: Mutex::new(()),
            cached: RwLock::new(None),
        })
    }

    /// Lock an identity with the configured iteration count
    pub fn lock(&self, identity: &Identity, password: &str) -> Result<LockedKeyBlob> {
        let _guard = self.op_lock.lock();
        let blob = lock_identity(identity, password, self.config.pbkdf2_iterations)?;
        tracing::debug!("Locked identity ({} iterations)", blob.iterations);
        Ok(blob)
    }

    /// Unlock a blob
    pub fn unlock(&self, blob: &LockedKeyBlob, password: &str) -> Result<Identity> {
        let _guard = self.op_lock.lock();
        match unlock_identity(blob, password) {
            Ok(identity) => {
                tracing::debug!("Unlocked identity {}", identity.public_keys().fingerprint());
                Ok(identity)
            }
            Err(e) => {
                tracing::warn!("Identity unlock failed: {}", e);
                Err(e)
            }
        }
    }

    /// Load the persisted blob, unlock it and cache the result
    pub fn unlock_persisted(&self, password: &str) -> Result<Arc<Identity>> {
        let blob = self.load()?.ok_or(Error::NoIdentity)?;
        let identity = self.unlock(&blob, password)?;
        Ok(self.cache(identity))
    }

    /// Put an unlocked identity in the session cache, replacing any previous
    pub fn cache(&self, identity: Identity) -> Arc<Identity> {
        let identity = Arc::new(identity);
        *self.cached.write() = Some(Arc::clone(&identity));
        identity
    }

    /// The cached identity, if one is unlocked
    pub fn get_cached(&self) -> Option<Arc<Identity>> {
        self.cached.read().clone()
    }

    /// Drop the cached identity
    pub fn clear_cache(&self) {
        if self.cached.write().take().is_some() {
            tracing::debug!("Cleared identity cache");
        }
    }

    /// Write a locked blob to device storage
    pub fn persist(&self, blob: &LockedKeyBlob) -> Result<()> {
        self.storage
            .store(keys::LOCKED_IDENTITY, blob.to_json()?.as_bytes())
    }

    /// Read the locked blob from device storage
    pub fn load(&self) -> Result<Option<LockedKeyBlob>> {
        let Some(bytes) = self.storage.retrieve(keys::LOCKED_IDENTITY)? else {
            return Ok(None);
        };
        let json = std::str::from_utf8(&bytes)
            .map_err(|e| Error::StorageReadError(format!("Identity blob is not UTF-8: {}", e)))?;
        LockedKeyBlob::from_json(json).map(Some)
    }

    /// Remove the persisted blob and clear the cache
    pub fn wipe(&self) -> Result<bool> {
        self.clear_cache();
        let removed = self.storage.delete(keys::LOCKED_IDENTITY)?;
        tracing::info!("Wiped identity store");
        Ok(removed)
    }
}

// ============================================================================
// TESTS
// ============================================================================
