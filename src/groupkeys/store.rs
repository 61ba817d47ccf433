//! Local per-channel key storage.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::ChannelKey;
use crate::crypto::SymmetricKey;
use crate::error::Result;
use crate::storage::{keys, SecureStore};

/// Channel keys held by this device
///
/// Reads are served from memory; writes go through to the secure store so
/// keys survive a restart.
pub struct ChannelKeyStore {
    storage: Arc<SecureStore>,
    cache: RwLock<HashMap<String, ChannelKey>>,
}

impl ChannelKeyStore {
    /// Create a key store over device storage
    pub fn new(storage: Arc<SecureStore>) -> Self {
        if storage.is_plaintext_on_disk() {
            tracing::warn!("Channel keys will be written to disk unencrypted");
        }
        Self {
            storage,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Key for a channel, if this device has one
    pub fn get(&self, channel_id: &str) -> Result<Option<ChannelKey>> {
        if let Some(key) = self.cache.read().get(channel_id) {
            return Ok(Some(key.clone()));
        }

        let Some(bytes) = self.storage.retrieve(&keys::channel_key(channel_id))? else {
            return Ok(None);
        };
        let key = ChannelKey(SymmetricKey::from_slice(&bytes)?);
        self.cache
            .write()
            .insert(channel_id.to_string(), key.clone());
        Ok(Some(key))
    }

    /// Store a channel key, replacing any previous one
    pub fn insert(&self, channel_id: &str, key: ChannelKey) -> Result<()> {
        self.storage
            .store(&keys::channel_key(channel_id), key.as_symmetric().as_bytes())?;
        self.cache.write().insert(channel_id.to_string(), key);
        Ok(())
    }

    /// Evict a channel key from memory and storage
    pub fn remove(&self, channel_id: &str) -> Result<bool> {
        let cached = self.cache.write().remove(channel_id).is_some();
        let stored = self.storage.delete(&keys::channel_key(channel_id))?;
        Ok(cached || stored)
    }
}
