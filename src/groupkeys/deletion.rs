//! # Deletion Proofs
//!
//! A signed statement that the sender deleted a message, carried out of band
//! in a request header.
//!
//! ```text
//! canonical = "<messageId>:<channelId>:<timestamp ms>"
//! proof     = { timestamp, Ed25519(sign_sk, canonical) }
//! header    = "<timestamp>.<hex signature>"
//! ```
//!
//! Ids containing `:` are rejected on both sides, so the canonical string
//! maps back to exactly one `(messageId, channelId)` pair.

use serde::{Deserialize, Serialize};

use crate::crypto::{sign, verify, Signature, SigningKeyPair};
use crate::error::{Error, Result};
use crate::time;

/// Signed proof of a message deletion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletionProof {
    /// Milliseconds since the Unix epoch, generated by the signer
    pub timestamp: i64,
    /// Signature over the canonical string
    pub signature: Signature,
}

impl DeletionProof {
    /// Encode for the deletion request header
    pub fn to_header_value(&self) -> String {
        format!("{}.{}", self.timestamp, self.signature.to_hex())
    }

    /// Parse a header value produced by [`DeletionProof::to_header_value`]
    pub fn from_header_value(value: &str) -> Result<Self> {
        let (ts, sig) = value
            .split_once('.')
            .ok_or_else(|| Error::MalformedInput("Deletion proof header missing '.'".into()))?;
        let timestamp = ts
            .parse::<i64>()
            .map_err(|e| Error::MalformedInput(format!("Invalid deletion timestamp: {}", e)))?;
        Ok(Self {
            timestamp,
            signature: Signature::from_hex(sig)?,
        })
    }
}

fn canonical(message_id: &str, channel_id: &str, timestamp: i64) -> Result<String> {
    for (field, id) in [("message", message_id), ("channel", channel_id)] {
        if id.contains(':') {
            return Err(Error::MalformedInput(format!(
                "Deletion proof {} id must not contain ':'",
                field
            )));
        }
    }
    Ok(format!("{}:{}:{}", message_id, channel_id, timestamp))
}

/// Sign a deletion with the local identity's signing key
pub fn sign_deletion(
    signer: &SigningKeyPair,
    message_id: &str,
    channel_id: &str,
) -> Result<DeletionProof> {
    let timestamp = time::now_timestamp_millis();
    let signature = sign(signer, canonical(message_id, channel_id, timestamp)?.as_bytes());
    Ok(DeletionProof {
        timestamp,
        signature,
    })
}

/// Verify a deletion proof against the signer's published key
pub fn verify_deletion(
    signer_public: &[u8; 32],
    message_id: &str,
    channel_id: &str,
    proof: &DeletionProof,
) -> Result<()> {
    verify(
        signer_public,
        canonical(message_id, channel_id, proof.timestamp)?.as_bytes(),
        &proof.signature,
    )
}
