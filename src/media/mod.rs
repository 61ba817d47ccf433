//! # Live Media Pipeline
//!
//! Per-frame encryption of encoded audio/video between the encoder and the
//! packetizer, so the SFU/relay forwards ciphertext only.
//!
//! ## Key Exchange and Track States
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      LIVE MEDIA E2EE                                    │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Alice joins                         Bob (already in call)             │
//! │  ───────────                         ─────────────────────             │
//! │  key_A ← 32 random bytes                                               │
//! │  {"type":"voice_key","key":[..]} ──────────►  store key_A for Alice    │
//! │                                  ◄──────────  reply with key_B         │
//! │  store key_B for Bob                                                    │
//! │                                                                         │
//! │  Alice → Bob frames: encrypted with key_A, decrypted with key_A       │
//! │  Bob → Alice frames: encrypted with key_B, decrypted with key_B       │
//! │                                                                         │
//! │  Track state:                                                          │
//! │                                                                         │
//! │    NoKey ──key──► KeyEstablished ──frame──► Active ──leave──► TornDown │
//! │                                                                         │
//! │  Encrypted payload: 0x01 ‖ iv (12) ‖ ciphertext ‖ tag (16)            │
//! │  Frame metadata (kind, timestamp, ssrc, codec header) stays clear;    │
//! │  kind and codec header are authenticated.                              │
//! │                                                                         │
//! │  A frame that fails to decrypt is passed through as Unverified, and   │
//! │  a streak of failures raises a DecryptionStalled health event.         │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

mod frame;
mod session;

pub use frame::{
    transform_incoming_frame, transform_outgoing_frame, EncodedFrame, FrameKind, IncomingFrame,
    UnverifiedReason, FRAME_FORMAT_TAG, FRAME_OVERHEAD,
};
pub use session::{MediaHealthEvent, MediaSession, TrackState};

use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::SymmetricKey;
use crate::error::Result;

/// Ephemeral key for one participant's outgoing media in one call
///
/// Never persisted. Zeroized on drop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaSessionKey(SymmetricKey);

impl MediaSessionKey {
    /// Generate a fresh random key
    pub fn generate() -> Result<Self> {
        Ok(Self(SymmetricKey::generate()?))
    }

    pub(crate) fn as_symmetric(&self) -> &SymmetricKey {
        &self.0
    }
}

/// Key announcement sent over the signaling channel
///
/// Wire form: `{"type": "voice_key", "key": [32 numbers]}`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct VoiceKeyMessage {
    #[serde(rename = "type")]
    #[zeroize(skip)]
    kind: VoiceKeyTag,
    key: [u8; 32],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
enum VoiceKeyTag {
    #[serde(rename = "voice_key")]
    VoiceKey,
}

impl VoiceKeyMessage {
    /// Announce `key`
    pub fn from_key(key: &MediaSessionKey) -> Self {
        Self {
            kind: VoiceKeyTag::VoiceKey,
            key: *key.as_symmetric().as_bytes(),
        }
    }

    /// The announced key
    pub fn to_key(&self) -> MediaSessionKey {
        MediaSessionKey(SymmetricKey::from_bytes(self.key))
    }

    /// Serialize for the signaling channel
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse from the signaling channel
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl std::fmt::Debug for VoiceKeyMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("VoiceKeyMessage(<redacted>)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_voice_key_wire_format() {
        let key = MediaSessionKey::generate().unwrap();
        let message = VoiceKeyMessage::from_key(&key);

        let json: serde_json::Value = serde_json::from_str(&message.to_json().unwrap()).unwrap();
        assert_eq!(json["type"], "voice_key");
        assert_eq!(json["key"].as_array().unwrap().len(), 32);

        let parsed = VoiceKeyMessage::from_json(&json.to_string()).unwrap();
        assert_eq!(parsed.to_key(), key);
    }

    #[test]
    fn test_voice_key_rejects_other_types() {
        let json = format!(r#"{{"type":"chat","key":{:?}}}"#, [0u8; 32]);
        assert!(matches!(
            VoiceKeyMessage::from_json(&json),
            Err(Error::SerializationError(_))
        ));
        assert!(VoiceKeyMessage::from_json(r#"{"type":"voice_key","key":[1,2,3]}"#).is_err());
    }
}
