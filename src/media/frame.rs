//! Per-frame transforms for encoded audio/video.
//!
//! Only the payload is encrypted. Frame metadata stays readable so the
//! media stack can still route, jitter-buffer and depacketize.

use super::MediaSessionKey;
use crate::crypto::{decrypt_with_aad, encrypt_with_aad, Nonce, NONCE_SIZE, TAG_SIZE};
use crate::error::Result;

/// Leading byte of an encrypted payload
pub const FRAME_FORMAT_TAG: u8 = 0x01;

/// Bytes added to every encrypted payload
pub const FRAME_OVERHEAD: usize = 1 + NONCE_SIZE + TAG_SIZE;

/// Media type of a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    /// Audio frame
    Audio,
    /// Video frame
    Video,
}

impl FrameKind {
    fn code(self) -> u8 {
        match self {
            Self::Audio => 0x01,
            Self::Video => 0x02,
        }
    }
}

/// An encoded media frame as handed over by the media stack
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedFrame {
    /// Audio or video
    pub kind: FrameKind,
    /// RTP timestamp
    pub timestamp: u32,
    /// Synchronization source
    pub ssrc: u32,
    /// Codec header bytes that must stay in the clear
    pub codec_header: Vec<u8>,
    /// Encoded payload
    pub payload: Vec<u8>,
}

/// Why an incoming frame was passed through without decryption
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnverifiedReason {
    /// No key is known for the sender
    NoKey,
    /// Payload does not start with the encrypted-frame tag
    NotEncrypted,
    /// Payload shorter than the encryption overhead
    Truncated,
    /// Tag mismatch: wrong key or tampered frame
    AuthenticationFailed,
}

/// Outcome of an incoming transform
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IncomingFrame {
    /// Payload authenticated and decrypted
    Decrypted(EncodedFrame),
    /// Original frame, unchanged, not authenticated
    Unverified {
        /// The frame exactly as received
        frame: EncodedFrame,
        /// Why decryption did not happen
        reason: UnverifiedReason,
    },
}

impl IncomingFrame {
    /// Whether the payload was authenticated
    pub fn is_verified(&self) -> bool {
        matches!(self, Self::Decrypted(_))
    }

    /// The frame to hand to the decoder
    pub fn into_frame(self) -> EncodedFrame {
        match self {
            Self::Decrypted(frame) | Self::Unverified { frame, .. } => frame,
        }
    }
}

fn frame_aad(frame: &EncodedFrame) -> Vec<u8> {
    let mut aad = Vec::with_capacity(1 + frame.codec_header.len());
    aad.push(frame.kind.code());
    aad.extend_from_slice(&frame.codec_header);
    aad
}

/// Encrypt an outgoing frame's payload
///
/// Payload becomes `0x01 ‖ iv ‖ ciphertext ‖ tag`. Kind and codec header are
/// bound as associated data.
pub fn transform_outgoing_frame(key: &MediaSessionKey, frame: EncodedFrame) -> Result<EncodedFrame> {
    let sealed = encrypt_with_aad(key.as_symmetric(), &frame.payload, &frame_aad(&frame))?;

    let mut payload = Vec::with_capacity(FRAME_OVERHEAD + frame.payload.len());
    payload.push(FRAME_FORMAT_TAG);
    payload.extend_from_slice(sealed.nonce.as_bytes());
    payload.extend_from_slice(&sealed.ciphertext);

    Ok(EncodedFrame { payload, ..frame })
}

/// Decrypt an incoming frame's payload
///
/// Never fails: a frame that cannot be authenticated is returned unchanged
/// as `Unverified` so the call keeps flowing.
pub fn transform_incoming_frame(key: &MediaSessionKey, frame: EncodedFrame) -> IncomingFrame {
    if frame.payload.first() != Some(&FRAME_FORMAT_TAG) {
        return IncomingFrame::Unverified {
            frame,
            reason: UnverifiedReason::NotEncrypted,
        };
    }
    if frame.payload.len() < FRAME_OVERHEAD {
        return IncomingFrame::Unverified {
            frame,
            reason: UnverifiedReason::Truncated,
        };
    }

    let body = &frame.payload[1..];
    let Ok(nonce) = Nonce::from_slice(&body[..NONCE_SIZE]) else {
        return IncomingFrame::Unverified {
            frame,
            reason: UnverifiedReason::Truncated,
        };
    };

    let aad = frame_aad(&frame);
    let opened = decrypt_with_aad(key.as_symmetric(), &nonce, &body[NONCE_SIZE..], &aad);

    match opened {
        Some(payload) => IncomingFrame::Decrypted(EncodedFrame { payload, ..frame }),
        None => IncomingFrame::Unverified {
            frame,
            reason: UnverifiedReason::AuthenticationFailed,
        },
    }
}
