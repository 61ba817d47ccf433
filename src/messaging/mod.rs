//! # Message Pipeline
//!
//! Encrypts outgoing chat text under the channel key and decrypts incoming
//! envelopes.
//!
//! ## Envelope Format
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      MESSAGE ENVELOPE                                   │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │   base64( iv (12) ‖ ciphertext ‖ tag (16) )                            │
//! │                                                                         │
//! │   Plaintext is either raw UTF-8 text or a JSON MessagePayload:         │
//! │   {                                                                    │
//! │     "text": "see attached",                                            │
//! │     "attachments": [                                                   │
//! │       { "fileId": "...", "name": "...", "size": 1234,                  │
//! │         "mimeType": "image/png", "key": "base64 file key" }            │
//! │     ]                                                                  │
//! │   }                                                                    │
//! │                                                                         │
//! │   Sending without a channel key is an error, never a plaintext send.  │
//! │   A receive failure renders as Unreadable, not as empty text.          │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};

use crate::crypto::{encrypt, Sealed};
use crate::error::{Error, Result};
use crate::files::FileAttachment;
use crate::groupkeys::ChannelKey;

/// An encrypted message as carried by the transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageEnvelope(String);

impl MessageEnvelope {
    /// Wrap a received base64 envelope
    pub fn from_base64(encoded: impl Into<String>) -> Self {
        Self(encoded.into())
    }

    /// The base64 wire form
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume into the base64 wire form
    pub fn into_string(self) -> String {
        self.0
    }

    fn seal(key: &ChannelKey, plaintext: &[u8]) -> Result<Self> {
        let sealed = encrypt(key.as_symmetric(), plaintext)?;
        Ok(Self(BASE64.encode(sealed.to_bytes())))
    }

    fn open(&self, key: &ChannelKey) -> Option<Vec<u8>> {
        let bytes = BASE64.decode(&self.0).ok()?;
        Sealed::from_bytes(&bytes).ok()?.open(key.as_symmetric())
    }
}

/// Encrypt chat text
pub fn encrypt_message(key: &ChannelKey, text: &str) -> Result<MessageEnvelope> {
    MessageEnvelope::seal(key, text.as_bytes())
}

/// Decrypt chat text
///
/// `None` on any failure: bad base64, truncation, wrong key, tampering or
/// non-UTF-8 plaintext.
pub fn decrypt_message(key: &ChannelKey, envelope: &MessageEnvelope) -> Option<String> {
    String::from_utf8(envelope.open(key)?).ok()
}

/// Encrypt replacement text for an edit
///
/// Same key, fresh IV: the edited envelope shares nothing with the original.
pub fn edit_message(key: &ChannelKey, new_text: &str) -> Result<MessageEnvelope> {
    encrypt_message(key, new_text)
}

/// Encrypt text for sending, refusing when the channel has no key
pub fn prepare_outgoing(key: Option<&ChannelKey>, text: &str) -> Result<MessageEnvelope> {
    let key = key.ok_or_else(|| {
        tracing::warn!("Refusing to send: no channel key");
        Error::KeyUnavailable("Channel key not available; message not sent".into())
    })?;
    encrypt_message(key, text)
}

/// What the UI should render for a received message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageView {
    /// Decrypted text
    Text(String),
    /// Could not be decrypted
    Unreadable,
}

impl MessageView {
    /// Decrypt an envelope for display
    pub fn render(key: Option<&ChannelKey>, envelope: &MessageEnvelope) -> Self {
        match key.and_then(|k| decrypt_message(k, envelope)) {
            Some(text) => Self::Text(text),
            None => Self::Unreadable,
        }
    }

    /// Whether decryption failed
    pub fn is_unreadable(&self) -> bool {
        matches!(self, Self::Unreadable)
    }
}

impl std::fmt::Display for MessageView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text(text) => f.write_str(text),
            Self::Unreadable => f.write_str("[unable to decrypt message]"),
        }
    }
}

/// Structured message plaintext
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePayload {
    /// Message text
    #[serde(default)]
    pub text: String,
    /// Encrypted files referenced by this message
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<FileAttachment>,
}

impl MessagePayload {
    /// A text-only payload
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            attachments: Vec::new(),
        }
    }
}

/// Encrypt a structured payload
pub fn encrypt_payload(key: &ChannelKey, payload: &MessagePayload) -> Result<MessageEnvelope> {
    let json = zeroize::Zeroizing::new(serde_json::to_vec(payload)?);
    MessageEnvelope::seal(key, &json)
}

/// Decrypt a structured payload
///
/// Plain text envelopes (not JSON) decode as a text-only payload.
pub fn decrypt_payload(key: &ChannelKey, envelope: &MessageEnvelope) -> Option<MessagePayload> {
    let plaintext = envelope.open(key)?;
    match serde_json::from_slice::<MessagePayload>(&plaintext) {
        Ok(payload) => Some(payload),
        Err(_) => String::from_utf8(plaintext).ok().map(MessagePayload::text),
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::files::{decrypt_file, encrypt_file, FileKey};

    #[test]
    fn test_message_round_trip() {
        let key = ChannelKey::generate().unwrap();
        let envelope = encrypt_message(&key, "hello, channel").unwrap();

        assert_eq!(decrypt_message(&key, &envelope).unwrap(), "hello, channel");
        assert!(!envelope.as_str().contains("hello"));
    }

    #[test]
    fn test_bit_flip_in_26_byte_message() {
        let key = ChannelKey::generate().unwrap();
        let text = "abcdefghijklmnopqrstuvwxyz";
        assert_eq!(text.len(), 26);

        let envelope = encrypt_message(&key, text).unwrap();
        let mut bytes = BASE64.decode(envelope.as_str()).unwrap();
        bytes[12 + 7] ^= 0x04;
        let tampered = MessageEnvelope::from_base64(BASE64.encode(&bytes));

        assert!(decrypt_message(&key, &tampered).is_none());
        assert!(MessageView::render(Some(&key), &tampered).is_unreadable());
    }

    #[test]
    fn test_wrong_key_and_garbage() {
        let key = ChannelKey::generate().unwrap();
        let other = ChannelKey::generate().unwrap();
        let envelope = encrypt_message(&key, "secret").unwrap();

        assert!(decrypt_message(&other, &envelope).is_none());
        assert!(decrypt_message(&key, &MessageEnvelope::from_base64("not base64!")).is_none());
        assert!(decrypt_message(&key, &MessageEnvelope::from_base64("AAAA")).is_none());
    }

    #[test]
    fn test_no_key_refuses_send() {
        let result = prepare_outgoing(None, "would be plaintext");
        assert!(matches!(result, Err(Error::KeyUnavailable(_))));

        let key = ChannelKey::generate().unwrap();
        let envelope = prepare_outgoing(Some(&key), "ok").unwrap();
        assert_eq!(decrypt_message(&key, &envelope).unwrap(), "ok");
    }

    #[test]
    fn test_view_distinguishes_empty_from_unreadable() {
        let key = ChannelKey::generate().unwrap();
        let empty = encrypt_message(&key, "").unwrap();

        assert_eq!(MessageView::render(Some(&key), &empty), MessageView::Text(String::new()));
        assert_eq!(MessageView::render(None, &empty), MessageView::Unreadable);
        assert_eq!(MessageView::Unreadable.to_string(), "[unable to decrypt message]");
    }

    #[test]
    fn test_edit_produces_fresh_envelope() {
        let key = ChannelKey::generate().unwrap();
        let original = encrypt_message(&key, "same").unwrap();
        let edited = edit_message(&key, "same").unwrap();

        assert_ne!(original, edited);
        assert_eq!(decrypt_message(&key, &edited).unwrap(), "same");
    }

    #[test]
    fn test_payload_carries_file_key() {
        let channel_key = ChannelKey::generate().unwrap();
        let file_key = FileKey::generate().unwrap();
        let blob = encrypt_file(&file_key, b"file contents").unwrap();

        let payload = MessagePayload {
            text: "see attached".into(),
            attachments: vec![FileAttachment {
                file_id: "f-1".into(),
                name: "notes.txt".into(),
                size: 13,
                mime_type: None,
                key: file_key,
            }],
        };

        let envelope = encrypt_payload(&channel_key, &payload).unwrap();
        let received = decrypt_payload(&channel_key, &envelope).unwrap();
        assert_eq!(received, payload);

        let opened = decrypt_file(&received.attachments[0].key, &blob).unwrap();
        assert_eq!(opened, b"file contents");
    }

    #[test]
    fn test_plain_text_decodes_as_payload() {
        let key = ChannelKey::generate().unwrap();
        let envelope = encrypt_message(&key, "just text").unwrap();
        assert_eq!(
            decrypt_payload(&key, &envelope).unwrap(),
            MessagePayload::text("just text")
        );
    }
}
