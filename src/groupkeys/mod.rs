//! # Group Key Distribution
//!
//! One random symmetric key per channel, delivered to each member as a
//! per-recipient seal.
//!
//! ## Distribution Flow
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    CHANNEL KEY DISTRIBUTION                             │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Creator                              Directory          Recipient     │
//! │  ───────                              ─────────          ─────────     │
//! │                                                                         │
//! │  channel_key ← 32 random bytes                                         │
//! │  store locally                                                          │
//! │                                                                         │
//! │  for each recipient (concurrently):                                    │
//! │    fetch_public_keys(id) ───────────►  {encPublicKey,                  │
//! │                          ◄───────────   signPublicKey}                 │
//! │    dh   = X25519(our_sk, their_pk)                                     │
//! │    k    = HKDF(dh, salt = channel_id)                                  │
//! │    seal = AES-GCM(k, fresh iv, channel_key, aad = channel_id)          │
//! │                                                                         │
//! │  KeySeal {userId, encryptedKey, nonce, senderPublicKey} ─────────────► │
//! │                                                                         │
//! │                                      receive(): same dh from the other │
//! │                                      side, open, store locally         │
//! │                                                                         │
//! │  No published key or failed lookup → recipient reported as skipped,   │
//! │  the rest of the distribution still succeeds.                          │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

mod deletion;
mod store;

pub use deletion::{sign_deletion, verify_deletion, DeletionProof};
pub use store::ChannelKeyStore;

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};

use crate::crypto::{
    decrypt_with_aad, derive_seal_key, encrypt_with_aad, Nonce, PublicKeyBundle, SymmetricKey,
};
use crate::error::{Error, Result};
use crate::identity::{Identity, IdentityStore};

/// A channel's shared symmetric key
///
/// Random, never derived. Zeroized on drop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelKey(SymmetricKey);

impl ChannelKey {
    /// Generate a fresh random channel key
    pub fn generate() -> Result<Self> {
        Ok(Self(SymmetricKey::generate()?))
    }

    /// Wrap raw key bytes
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(SymmetricKey::from_bytes(bytes))
    }

    /// The underlying codec key
    pub fn as_symmetric(&self) -> &SymmetricKey {
        &self.0
    }
}

/// A channel key sealed to one recipient
///
/// Wire form: `{userId, encryptedKey, nonce, senderPublicKey}`, byte fields
/// in standard base64.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeySeal {
    /// Recipient user id
    pub user_id: String,
    /// Sealed channel key with tag
    #[serde(with = "crate::crypto::b64_vec")]
    pub encrypted_key: Vec<u8>,
    /// Nonce used for the seal
    #[serde(with = "crate::crypto::b64_vec")]
    pub nonce: Vec<u8>,
    /// Sender's X25519 public key
    #[serde(with = "crate::crypto::b64_32")]
    pub sender_public_key: [u8; 32],
}

/// External public key lookup
///
/// Implemented by the host over its REST client. `Ok(None)` means the user
/// has not published keys yet.
#[async_trait]
pub trait PublicKeyDirectory: Send + Sync {
    /// Fetch a user's published public keys
    async fn fetch_public_keys(&self, user_id: &str) -> Result<Option<PublicKeyBundle>>;
}

/// Why a recipient was left out of a distribution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The user has not published keys
    NoPublicKey,
    /// The directory lookup failed
    LookupFailed(String),
    /// The published key could not be used for sealing
    InvalidPublicKey(String),
}

/// A recipient that did not receive a seal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedRecipient {
    /// Recipient user id
    pub user_id: String,
    /// Why no seal was produced
    pub reason: SkipReason,
}

/// Result of one distribution round
#[derive(Debug, Clone)]
pub struct Distribution {
    /// Channel the key belongs to
    pub channel_id: String,
    /// One seal per served recipient
    pub seals: Vec<KeySeal>,
    /// Recipients that must be retried later with `reseal_for`
    pub skipped: Vec<SkippedRecipient>,
}

/// Seal a channel key to one recipient's X25519 public key
pub fn seal_channel_key(
    identity: &Identity,
    channel_id: &str,
    channel_key: &ChannelKey,
    recipient_id: &str,
    recipient_public: &[u8; 32],
) -> Result<KeySeal> {
    let dh = identity
        .keypair()
        .encryption
        .diffie_hellman(recipient_public)?;
    let seal_key = derive_seal_key(&dh, channel_id.as_bytes())?;
    let sealed = encrypt_with_aad(
        &seal_key,
        channel_key.as_symmetric().as_bytes(),
        channel_id.as_bytes(),
    )?;

    Ok(KeySeal {
        user_id: recipient_id.to_string(),
        encrypted_key: sealed.ciphertext,
        nonce: sealed.nonce.as_bytes().to_vec(),
        sender_public_key: identity.keypair().encryption.public_bytes(),
    })
}

/// Open a seal addressed to `identity`
///
/// Any failure (wrong recipient, wrong sender key, tampering) is reported as
/// `AuthenticationFailed`.
pub fn open_channel_key(
    identity: &Identity,
    channel_id: &str,
    seal: &KeySeal,
    sender_public: &[u8; 32],
) -> Result<ChannelKey> {
    let nonce = Nonce::from_slice(&seal.nonce)?;
    let dh = identity
        .keypair()
        .encryption
        .diffie_hellman(sender_public)
        .map_err(|_| Error::AuthenticationFailed("Invalid sender public key".into()))?;
    let seal_key = derive_seal_key(&dh, channel_id.as_bytes())?;

    let plaintext = zeroize::Zeroizing::new(
        decrypt_with_aad(&seal_key, &nonce, &seal.encrypted_key, channel_id.as_bytes())
            .ok_or_else(|| Error::AuthenticationFailed("Channel key seal failed to open".into()))?,
    );

    Ok(ChannelKey(SymmetricKey::from_slice(&plaintext).map_err(|_| {
        Error::AuthenticationFailed("Channel key seal has wrong length".into())
    })?))
}

/// Creates, distributes and receives channel keys for the unlocked identity
///
/// The identity is read from the store's cache on every call and never held
/// between calls. Once the cache is cleared every operation returns
/// `NoIdentity`.
pub struct GroupKeyDistributor {
    identities: Arc<IdentityStore>,
    directory: Arc<dyn PublicKeyDirectory>,
    keys: Arc<ChannelKeyStore>,
}

impl GroupKeyDistributor {
    /// Create a distributor
    pub fn new(
        identities: Arc<IdentityStore>,
        directory: Arc<dyn PublicKeyDirectory>,
        keys: Arc<ChannelKeyStore>,
    ) -> Self {
        Self {
            identities,
            directory,
            keys,
        }
    }

    fn identity(&self) -> Result<Arc<Identity>> {
        self.identities.get_cached().ok_or(Error::NoIdentity)
    }

    /// Local channel key storage
    pub fn keys(&self) -> &Arc<ChannelKeyStore> {
        &self.keys
    }

    /// Create a new channel key, store it and seal it to every recipient
    pub async fn create_and_distribute(
        &self,
        channel_id: &str,
        recipient_ids: &[String],
    ) -> Result<Distribution> {
        let identity = self.identity()?;
        let channel_key = ChannelKey::generate()?;
        self.keys.insert(channel_id, channel_key.clone())?;
        tracing::info!(
            "Created key for channel {} ({} recipients)",
            channel_id,
            recipient_ids.len()
        );
        Ok(self
            .distribute(&identity, channel_id, &channel_key, recipient_ids)
            .await)
    }

    /// Seal the already-stored key for specific recipients
    ///
    /// Used to retry recipients skipped earlier, or to add new members.
    pub async fn reseal_for(&self, channel_id: &str, recipient_ids: &[String]) -> Result<Distribution> {
        let identity = self.identity()?;
        let channel_key = self.keys.get(channel_id)?.ok_or_else(|| {
            Error::KeyUnavailable(format!("No key stored for channel {}", channel_id))
        })?;
        Ok(self
            .distribute(&identity, channel_id, &channel_key, recipient_ids)
            .await)
    }

    /// Open a seal addressed to us and store the channel key
    pub fn receive(
        &self,
        channel_id: &str,
        seal: &KeySeal,
        sender_public_key: &[u8; 32],
    ) -> Result<ChannelKey> {
        let identity = self.identity()?;
        let key = match open_channel_key(&identity, channel_id, seal, sender_public_key) {
            Ok(key) => key,
            Err(e) => {
                tracing::warn!("Rejected key seal for channel {}: {}", channel_id, e);
                return Err(e);
            }
        };
        self.keys.insert(channel_id, key.clone())?;
        tracing::debug!("Stored received key for channel {}", channel_id);
        Ok(key)
    }

    /// Sign a deletion of one of our messages
    pub fn sign_deletion(&self, message_id: &str, channel_id: &str) -> Result<DeletionProof> {
        let identity = self.identity()?;
        sign_deletion(&identity.keypair().signing, message_id, channel_id)
    }

    async fn distribute(
        &self,
        identity: &Identity,
        channel_id: &str,
        channel_key: &ChannelKey,
        recipient_ids: &[String],
    ) -> Distribution {
        let lookups = recipient_ids.iter().map(|user_id| async move {
            let outcome = match self.directory.fetch_public_keys(user_id).await {
                Ok(Some(bundle)) => seal_channel_key(
                    identity,
                    channel_id,
                    channel_key,
                    user_id,
                    &bundle.encryption,
                )
                .map_err(|e| SkipReason::InvalidPublicKey(e.to_string())),
                Ok(None) => Err(SkipReason::NoPublicKey),
                Err(e) => Err(SkipReason::LookupFailed(e.to_string())),
            };
            (user_id, outcome)
        });

        let mut seals = Vec::new();
        let mut skipped = Vec::new();
        for (user_id, outcome) in join_all(lookups).await {
            match outcome {
                Ok(seal) => seals.push(seal),
                Err(reason) => {
                    tracing::warn!("Skipping {} for channel {}: {:?}", user_id, channel_id, reason);
                    skipped.push(SkippedRecipient {
                        user_id: user_id.clone(),
                        reason,
                    });
                }
            }
        }

        Distribution {
            channel_id: channel_id.to_string(),
            seals,
            skipped,
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::E2eeConfig;
    use crate::identity::generate_identity;
    use crate::storage::SecureStore;
    use parking_lot::RwLock;
    use std::collections::HashMap;

    #[derive(Default)]
    struct MockDirectory {
        bundles: RwLock<HashMap<String, PublicKeyBundle>>,
        offline: Vec<String>,
    }

    impl MockDirectory {
        fn publish(&self, user_id: &str, identity: &Identity) {
            self.bundles
                .write()
                .insert(user_id.to_string(), identity.public_keys());
        }
    }

    #[async_trait]
    impl PublicKeyDirectory for MockDirectory {
        async fn fetch_public_keys(&self, user_id: &str) -> Result<Option<PublicKeyBundle>> {
            if self.offline.iter().any(|u| u == user_id) {
                return Err(Error::DirectoryError("connection refused".into()));
            }
            Ok(self.bundles.read().get(user_id).copied())
        }
    }

    struct Member {
        public: PublicKeyBundle,
        identities: Arc<IdentityStore>,
        distributor: GroupKeyDistributor,
    }

    fn member(directory: &Arc<MockDirectory>, user_id: &str) -> Member {
        let storage = Arc::new(SecureStore::new());
        let identities =
            Arc::new(IdentityStore::new(Arc::clone(&storage), E2eeConfig::default()).unwrap());
        let identity = generate_identity().unwrap();
        directory.publish(user_id, &identity);
        let public = identity.public_keys();
        identities.cache(identity);

        let keys = Arc::new(ChannelKeyStore::new(storage));
        let distributor = GroupKeyDistributor::new(
            Arc::clone(&identities),
            Arc::clone(directory) as Arc<dyn PublicKeyDirectory>,
            keys,
        );
        Member {
            public,
            identities,
            distributor,
        }
    }

    fn ids(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_members_receive_identical_keys() {
        let directory = Arc::new(MockDirectory::default());
        let owner = member(&directory, "owner");
        let a = member(&directory, "user-a");
        let b = member(&directory, "user-b");

        let dist = owner
            .distributor
            .create_and_distribute("c-1", &ids(&["user-a", "user-b"]))
            .await
            .unwrap();
        assert_eq!(dist.seals.len(), 2);
        assert!(dist.skipped.is_empty());

        let sender_pk = owner.public.encryption;
        let seal_a = dist.seals.iter().find(|s| s.user_id == "user-a").unwrap();
        let seal_b = dist.seals.iter().find(|s| s.user_id == "user-b").unwrap();

        let key_a = a.distributor.receive("c-1", seal_a, &sender_pk).unwrap();
        let key_b = b.distributor.receive("c-1", seal_b, &sender_pk).unwrap();

        assert_eq!(key_a, key_b);
        assert_eq!(owner.distributor.keys().get("c-1").unwrap().unwrap(), key_a);
        assert_eq!(a.distributor.keys().get("c-1").unwrap().unwrap(), key_a);
    }

    #[tokio::test]
    async fn test_seal_for_other_recipient_fails() {
        let directory = Arc::new(MockDirectory::default());
        let owner = member(&directory, "owner");
        let _a = member(&directory, "user-a");
        let b = member(&directory, "user-b");

        let dist = owner
            .distributor
            .create_and_distribute("c-1", &ids(&["user-a"]))
            .await
            .unwrap();
        let sender_pk = owner.public.encryption;

        let result = b.distributor.receive("c-1", &dist.seals[0], &sender_pk);
        assert!(matches!(result, Err(Error::AuthenticationFailed(_))));
        assert!(b.distributor.keys().get("c-1").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_seal_bound_to_channel_and_tamper_evident() {
        let directory = Arc::new(MockDirectory::default());
        let owner = member(&directory, "owner");
        let a = member(&directory, "user-a");

        let dist = owner
            .distributor
            .create_and_distribute("c-1", &ids(&["user-a"]))
            .await
            .unwrap();
        let sender_pk = owner.public.encryption;

        assert!(a.distributor.receive("c-2", &dist.seals[0], &sender_pk).is_err());

        let mut tampered = dist.seals[0].clone();
        tampered.encrypted_key[0] ^= 0x01;
        assert!(a.distributor.receive("c-1", &tampered, &sender_pk).is_err());
    }

    #[tokio::test]
    async fn test_missing_and_failed_lookups_are_skipped() {
        let directory = Arc::new(MockDirectory {
            offline: ids(&["user-down"]),
            ..MockDirectory::default()
        });
        let owner = member(&directory, "owner");
        let _a = member(&directory, "user-a");

        let dist = owner
            .distributor
            .create_and_distribute("c-1", &ids(&["user-a", "user-new", "user-down"]))
            .await
            .unwrap();

        assert_eq!(dist.seals.len(), 1);
        assert_eq!(dist.skipped.len(), 2);
        assert!(dist
            .skipped
            .iter()
            .any(|s| s.user_id == "user-new" && s.reason == SkipReason::NoPublicKey));
        assert!(dist
            .skipped
            .iter()
            .any(|s| s.user_id == "user-down" && matches!(s.reason, SkipReason::LookupFailed(_))));
    }

    #[tokio::test]
    async fn test_reseal_uses_stored_key() {
        let directory = Arc::new(MockDirectory::default());
        let owner = member(&directory, "owner");

        let first = owner
            .distributor
            .create_and_distribute("c-1", &ids(&["late"]))
            .await
            .unwrap();
        assert_eq!(first.skipped.len(), 1);

        let late = member(&directory, "late");
        let retry = owner
            .distributor
            .reseal_for("c-1", &ids(&["late"]))
            .await
            .unwrap();
        assert_eq!(retry.seals.len(), 1);

        let sender_pk = owner.public.encryption;
        let key = late.distributor.receive("c-1", &retry.seals[0], &sender_pk).unwrap();
        assert_eq!(owner.distributor.keys().get("c-1").unwrap().unwrap(), key);
    }

    #[test]
    fn test_reseal_unknown_channel() {
        let directory = Arc::new(MockDirectory::default());
        let owner = member(&directory, "owner");

        let missing =
            tokio_test::block_on(owner.distributor.reseal_for("c-unknown", &ids(&["late"])));
        assert!(matches!(missing, Err(Error::KeyUnavailable(_))));
    }

    #[test]
    fn test_key_seal_wire_format() {
        let owner = generate_identity().unwrap();
        let recipient = generate_identity().unwrap();
        let key = ChannelKey::generate().unwrap();

        let seal = seal_channel_key(
            &owner,
            "c-1",
            &key,
            "user-a",
            &recipient.public_keys().encryption,
        )
        .unwrap();

        let json = serde_json::to_value(&seal).unwrap();
        for field in ["userId", "encryptedKey", "nonce", "senderPublicKey"] {
            assert!(json.get(field).is_some(), "missing {}", field);
        }

        let parsed: KeySeal = serde_json::from_value(json).unwrap();
        let opened =
            open_channel_key(&recipient, "c-1", &parsed, &owner.public_keys().encryption).unwrap();
        assert_eq!(opened, key);
    }

    #[test]
    fn test_distributor_signs_deletions() {
        let directory = Arc::new(MockDirectory::default());
        let owner = member(&directory, "owner");

        let proof = owner.distributor.sign_deletion("m-1", "c-1").unwrap();
        assert!(verify_deletion(&owner.public.signing, "m-1", "c-1", &proof).is_ok());
    }

    #[tokio::test]
    async fn test_cleared_identity_disables_distributor() {
        let directory = Arc::new(MockDirectory::default());
        let owner = member(&directory, "owner");
        let a = member(&directory, "user-a");

        let dist = owner
            .distributor
            .create_and_distribute("c-1", &ids(&["user-a"]))
            .await
            .unwrap();

        owner.identities.clear_cache();
        a.identities.clear_cache();

        assert!(matches!(
            owner.distributor.sign_deletion("m-1", "c-1"),
            Err(Error::NoIdentity)
        ));
        assert!(matches!(
            owner.distributor.reseal_for("c-1", &ids(&["user-a"])).await,
            Err(Error::NoIdentity)
        ));
        assert!(matches!(
            owner.distributor.create_and_distribute("c-2", &ids(&["user-a"])).await,
            Err(Error::NoIdentity)
        ));
        assert!(matches!(
            a.distributor.receive("c-1", &dist.seals[0], &owner.public.encryption),
            Err(Error::NoIdentity)
        ));
        assert!(a.distributor.keys().get("c-1").unwrap().is_none());
    }
}
