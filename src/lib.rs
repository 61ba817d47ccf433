//! # Murmur E2EE
//!
//! End-to-end encryption core for a real-time chat and voice platform. The
//! server that stores and routes data only ever sees ciphertext for message
//! text, file contents and live media.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        MURMUR E2EE MODULES                              │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────┐  ┌──────────────┐   │
//! │  │  Messaging  │  │    Files    │  │    Media    │  │  Group Keys  │   │
//! │  │             │  │             │  │             │  │              │   │
//! │  │ - Envelope  │  │ - Chunked   │  │ - Per-frame │  │ - Channel    │   │
//! │  │ - Payload   │  │   records   │  │   AES-GCM   │  │   keys       │   │
//! │  │ - Edits     │  │ - File keys │  │ - voice_key │  │ - Seals      │   │
//! │  │             │  │             │  │ - Health    │  │ - Deletion   │   │
//! │  └──────┬──────┘  └──────┬──────┘  └──────┬──────┘  └──────┬───────┘   │
//! │         │                │                │                │           │
//! │         └────────────────┴────────────────┴────────────────┘           │
//! │                                   │                                     │
//! │  ┌─────────────┐  ┌─────────────┐ │ ┌─────────────────────────────────┐│
//! │  │   Crypto    │  │   Storage   │ │ │           Identity              ││
//! │  │             │  │             │ │ │                                 ││
//! │  │ - X25519    │  │ - Secure    │◄┘ │ - Keypairs (X25519 + Ed25519)   ││
//! │  │ - AES-GCM   │  │   store     │   │ - Password lock (PBKDF2)        ││
//! │  │ - Ed25519   │  │ - Dir/mem   │   │ - Session cache                 ││
//! │  └─────────────┘  └─────────────┘   └─────────────────────────────────┘│
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Hierarchy
//!
//! - [`error`] - Error types for the entire library
//! - [`config`] - Tunables (PBKDF2 rounds, file chunk size, media health)
//! - [`crypto`] - Primitives (keys, symmetric codec, KDFs, signing)
//! - [`storage`] - Device-local secret storage
//! - [`identity`] - Identity keypair, locking and caching
//! - [`groupkeys`] - Channel key creation, sealing and deletion proofs
//! - [`messaging`] - Message envelopes
//! - [`files`] - Chunked file encryption
//! - [`media`] - Live audio/video frame encryption
//!
//! ## Security Model
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          SECURITY LAYERS                                │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Identity: X25519 + Ed25519 keypairs, generated on device, stored     │
//! │  only as a password-locked blob. Only public keys are published.       │
//! │                                                                         │
//! │  Channels: one random AES-256 key per channel, sealed to each member  │
//! │  with X25519 ECDH. The server relays seals it cannot open.            │
//! │                                                                         │
//! │  Content: messages, file chunks and media frames are AES-256-GCM      │
//! │  with a fresh random IV per call. Any failure is "unable to           │
//! │  decrypt", never partial plaintext.                                    │
//! │                                                                         │
//! │  Not covered: membership decisions, forward secrecy across channel    │
//! │  history, metadata (who talks to whom, when, how much).                │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

// ============================================================================
// MODULE DECLARATIONS
// ============================================================================

pub mod config;
pub mod crypto;
pub mod error;
pub mod files;
pub mod groupkeys;
pub mod identity;
pub mod media;
pub mod messaging;
pub mod storage;
/// Wall-clock helpers.
pub mod time;

// ============================================================================
// RE-EXPORTS
// ============================================================================

pub use config::E2eeConfig;
pub use crypto::{KeyPair, PublicKeyBundle};
pub use error::{Error, ErrorCategory, Result};
pub use groupkeys::{ChannelKey, GroupKeyDistributor, PublicKeyDirectory};
pub use identity::{generate_identity, Identity, IdentityStore};

// ============================================================================
// CONTEXT
// ============================================================================

use std::sync::Arc;

use files::FileKey;
use groupkeys::ChannelKeyStore;
use media::MediaSession;
use storage::SecureStore;

/// Per-device encryption context
///
/// Holds the stores every pipeline needs. There is no process-wide
/// instance: create one at login, drop it (or call `shutdown`) at logout.
///
/// ```text
/// open()/in_memory()  ──► identities().unlock_persisted(password)
///                     ──► distributor(directory)   (needs unlocked identity)
///                     ──► new_media_session()      (per call)
/// shutdown()          ──► identity cache cleared
/// ```
pub struct E2eeContext {
    config: E2eeConfig,
    identities: Arc<IdentityStore>,
    channel_keys: Arc<ChannelKeyStore>,
}

impl E2eeContext {
    /// Create a context over existing storage
    pub fn new(config: E2eeConfig, storage: Arc<SecureStore>) -> Result<Self> {
        config.validate()?;
        tracing::info!("Initializing murmur-e2ee {}", version());
        Ok(Self {
            identities: Arc::new(IdentityStore::new(Arc::clone(&storage), config.clone())?),
            channel_keys: Arc::new(ChannelKeyStore::new(storage)),
            config,
        })
    }

    /// Context with in-memory storage only
    pub fn in_memory(config: E2eeConfig) -> Result<Self> {
        Self::new(config, Arc::new(SecureStore::new()))
    }

    /// Active configuration
    pub fn config(&self) -> &E2eeConfig {
        &self.config
    }

    /// The identity key store
    pub fn identities(&self) -> &IdentityStore {
        &self.identities
    }

    /// Locally held channel keys
    pub fn channel_keys(&self) -> &Arc<ChannelKeyStore> {
        &self.channel_keys
    }

    /// Group key distributor for the unlocked identity
    ///
    /// The distributor stops working once `shutdown` clears the identity.
    pub fn distributor(&self, directory: Arc<dyn PublicKeyDirectory>) -> Result<GroupKeyDistributor> {
        if self.identities.get_cached().is_none() {
            return Err(Error::NoIdentity);
        }
        Ok(GroupKeyDistributor::new(
            Arc::clone(&self.identities),
            directory,
            Arc::clone(&self.channel_keys),
        ))
    }

    /// Encrypt a file using the configured chunk size
    pub fn encrypt_file(&self, key: &FileKey, data: &[u8]) -> Result<Vec<u8>> {
        files::encrypt_file_with_chunk_size(key, data, self.config.file_chunk_size)
    }

    /// Fresh media session for one call
    pub fn new_media_session(&self) -> MediaSession {
        MediaSession::new(&self.config)
    }

    /// Drop the unlocked identity
    pub fn shutdown(&self) {
        self.identities.clear_cache();
        tracing::info!("E2EE context shut down");
    }
}

// ============================================================================
// VERSION INFO
// ============================================================================

/// Returns the crate version
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Returns build information for debugging
pub fn build_info() -> BuildInfo {
    BuildInfo {
        version: env!("CARGO_PKG_VERSION"),
        target: std::env::consts::OS,
        profile: if cfg!(debug_assertions) {
            "debug"
        } else {
            "release"
        },
    }
}

/// Build information for debugging
#[derive(Debug, Clone)]
pub struct BuildInfo {
    /// Crate version
    pub version: &'static str,
    /// Target operating system
    pub target: &'static str,
    /// Build profile (debug/release)
    pub profile: &'static str,
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use config::MIN_PBKDF2_ITERATIONS;
    use parking_lot::RwLock;
    use std::collections::HashMap;

    #[derive(Default)]
    struct Directory(RwLock<HashMap<String, PublicKeyBundle>>);

    #[async_trait]
    impl PublicKeyDirectory for Directory {
        async fn fetch_public_keys(&self, user_id: &str) -> Result<Option<PublicKeyBundle>> {
            Ok(self.0.read().get(user_id).copied())
        }
    }

    fn context() -> E2eeContext {
        E2eeContext::in_memory(E2eeConfig {
            pbkdf2_iterations: MIN_PBKDF2_ITERATIONS,
            ..E2eeConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }

    #[test]
    fn test_build_info() {
        let info = build_info();
        assert_eq!(info.version, version());
    }

    #[test]
    fn test_distributor_requires_identity() {
        let ctx = context();
        let directory: Arc<dyn PublicKeyDirectory> = Arc::new(Directory::default());
        assert!(matches!(ctx.distributor(directory), Err(Error::NoIdentity)));
    }

    #[tokio::test]
    async fn test_end_to_end_channel_message() {
        let directory = Arc::new(Directory::default());
        let alice = context();
        let bob = context();

        for (name, ctx) in [("alice", &alice), ("bob", &bob)] {
            let identity = generate_identity().unwrap();
            let blob = ctx.identities().lock(&identity, "correct-horse-42!").unwrap();
            ctx.identities().persist(&blob).unwrap();
            directory
                .0
                .write()
                .insert(name.to_string(), identity.public_keys());
            ctx.identities().unlock_persisted("correct-horse-42!").unwrap();
        }

        let alice_dist = alice.distributor(directory.clone()).unwrap();
        let bob_dist = bob.distributor(directory.clone()).unwrap();

        let dist = alice_dist
            .create_and_distribute("general", &["bob".to_string()])
            .await
            .unwrap();
        let alice_pk = alice.identities().get_cached().unwrap().public_keys().encryption;
        bob_dist.receive("general", &dist.seals[0], &alice_pk).unwrap();

        let alice_key = alice.channel_keys().get("general").unwrap();
        let envelope = messaging::prepare_outgoing(alice_key.as_ref(), "hi bob").unwrap();

        let bob_key = bob.channel_keys().get("general").unwrap();
        assert_eq!(
            messaging::MessageView::render(bob_key.as_ref(), &envelope),
            messaging::MessageView::Text("hi bob".into())
        );

        bob.shutdown();
        assert!(bob.identities().get_cached().is_none());
        assert!(matches!(
            bob_dist.sign_deletion("m-1", "general"),
            Err(Error::NoIdentity)
        ));
        assert!(matches!(
            bob_dist.receive("general", &dist.seals[0], &alice_pk),
            Err(Error::NoIdentity)
        ));
        assert!(alice_dist.sign_deletion("m-1", "general").is_ok());
    }

    #[test]
    fn test_encrypt_file_uses_configured_chunk_size() {
        let ctx = E2eeContext::in_memory(E2eeConfig {
            pbkdf2_iterations: MIN_PBKDF2_ITERATIONS,
            file_chunk_size: 16,
            ..E2eeConfig::default()
        })
        .unwrap();
        let key = FileKey::generate().unwrap();
        let data = vec![7u8; 40];

        let blob = ctx.encrypt_file(&key, &data).unwrap();
        let overhead = 4 + crypto::NONCE_SIZE + crypto::TAG_SIZE;
        assert_eq!(blob.len(), data.len() + 3 * overhead);
        assert_eq!(files::decrypt_file(&key, &blob).unwrap(), data);
    }
}
