//! Media session: key exchange state, per-peer keys and decrypt health.

use std::collections::HashMap;

use parking_lot::Mutex;
use tokio::sync::broadcast;

use super::frame::{transform_incoming_frame, transform_outgoing_frame, UnverifiedReason};
use super::{EncodedFrame, IncomingFrame, MediaSessionKey, VoiceKeyMessage};
use crate::config::E2eeConfig;
use crate::error::{Error, Result};

/// Lifecycle of one direction of a media track
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackState {
    /// No key yet; frames cannot be encrypted or authenticated
    NoKey,
    /// Key known, no frame processed yet
    KeyEstablished,
    /// Frames are flowing through the transform
    Active,
    /// Session ended and keys dropped
    TornDown,
}

/// Decrypt health signal for one peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaHealthEvent {
    /// Consecutive incoming failures reached the configured threshold
    DecryptionStalled {
        /// Peer whose frames fail
        peer_id: String,
        /// Failures in the current streak
        consecutive_failures: u32,
    },
    /// A frame from a stalled peer decrypted again
    Recovered {
        /// Peer whose frames recovered
        peer_id: String,
    },
}

struct PeerTrack {
    key: MediaSessionKey,
    // Bumped on every key install; outcomes from an older key are ignored
    generation: u64,
    state: TrackState,
    failures: u32,
    stalled: bool,
}

struct Inner {
    local_key: Option<MediaSessionKey>,
    outgoing: TrackState,
    peers: HashMap<String, PeerTrack>,
    next_generation: u64,
}

/// End-to-end media encryption for one call
///
/// Outgoing frames use the local key. Incoming frames from a peer use the
/// key that peer announced. Keys live in memory only and are zeroized on
/// teardown.
pub struct MediaSession {
    inner: Mutex<Inner>,
    failure_threshold: u32,
    events: broadcast::Sender<MediaHealthEvent>,
}

impl MediaSession {
    /// Create a session with no keys
    pub fn new(config: &E2eeConfig) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            inner: Mutex::new(Inner {
                local_key: None,
                outgoing: TrackState::NoKey,
                peers: HashMap::new(),
                next_generation: 0,
            }),
            failure_threshold: config.media_failure_threshold.max(1),
            events,
        }
    }

    /// Subscribe to health events
    pub fn subscribe(&self) -> broadcast::Receiver<MediaHealthEvent> {
        self.events.subscribe()
    }

    /// Generate our key for this call and return the announcement to send
    /// to every peer
    pub fn join(&self) -> Result<VoiceKeyMessage> {
        let mut inner = self.inner.lock();
        if inner.outgoing == TrackState::TornDown {
            return Err(Error::KeyUnavailable("Media session was torn down".into()));
        }
        if inner.local_key.is_none() {
            inner.local_key = Some(MediaSessionKey::generate()?);
            inner.outgoing = TrackState::KeyEstablished;
            tracing::info!("Joined media session with a fresh key");
        }
        inner
            .local_key
            .as_ref()
            .map(VoiceKeyMessage::from_key)
            .ok_or_else(|| Error::KeyUnavailable("No local media key".into()))
    }

    /// Record a peer's announced key
    ///
    /// Returns our own announcement when this is the first key seen from the
    /// peer, so the caller can reply. A changed key replaces the old one
    /// without a reply.
    pub fn handle_voice_key(
        &self,
        peer_id: &str,
        message: &VoiceKeyMessage,
    ) -> Result<Option<VoiceKeyMessage>> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        if inner.outgoing == TrackState::TornDown {
            return Err(Error::KeyUnavailable("Media session was torn down".into()));
        }

        let key = message.to_key();
        let generation = inner.next_generation;
        let is_new = match inner.peers.get_mut(peer_id) {
            Some(track) => {
                if track.key != key {
                    tracing::debug!("Peer {} replaced its media key", peer_id);
                    track.key = key;
                    track.generation = generation;
                    track.state = TrackState::KeyEstablished;
                    track.failures = 0;
                    track.stalled = false;
                    inner.next_generation += 1;
                }
                false
            }
            None => {
                inner.next_generation += 1;
                inner.peers.insert(
                    peer_id.to_string(),
                    PeerTrack {
                        key,
                        generation,
                        state: TrackState::KeyEstablished,
                        failures: 0,
                        stalled: false,
                    },
                );
                tracing::debug!("Received media key from {}", peer_id);
                true
            }
        };

        Ok(if is_new {
            inner.local_key.as_ref().map(VoiceKeyMessage::from_key)
        } else {
            None
        })
    }

    /// Encrypt a frame we are sending
    pub fn encrypt_frame(&self, frame: EncodedFrame) -> Result<EncodedFrame> {
        let key = {
            let mut inner = self.inner.lock();
            let key = inner
                .local_key
                .clone()
                .ok_or_else(|| Error::KeyUnavailable("No local media key".into()))?;
            inner.outgoing = TrackState::Active;
            key
        };
        transform_outgoing_frame(&key, frame)
    }

    /// Decrypt a frame received from `peer_id`
    pub fn decrypt_frame(&self, peer_id: &str, frame: EncodedFrame) -> IncomingFrame {
        let Some((key, generation)) = self.peer_key(peer_id) else {
            return IncomingFrame::Unverified {
                frame,
                reason: UnverifiedReason::NoKey,
            };
        };

        let result = transform_incoming_frame(&key, frame);
        self.record_outcome(peer_id, generation, &result);
        result
    }

    fn peer_key(&self, peer_id: &str) -> Option<(MediaSessionKey, u64)> {
        self.inner
            .lock()
            .peers
            .get(peer_id)
            .map(|track| (track.key.clone(), track.generation))
    }

    fn record_outcome(&self, peer_id: &str, generation: u64, result: &IncomingFrame) {
        let event = {
            let mut inner = self.inner.lock();
            let Some(track) = inner.peers.get_mut(peer_id) else {
                return;
            };
            if track.generation != generation {
                return;
            }

            if result.is_verified() {
                track.state = TrackState::Active;
                track.failures = 0;
                if track.stalled {
                    track.stalled = false;
                    Some(MediaHealthEvent::Recovered {
                        peer_id: peer_id.to_string(),
                    })
                } else {
                    None
                }
            } else {
                track.failures = track.failures.saturating_add(1);
                if !track.stalled && track.failures >= self.failure_threshold {
                    track.stalled = true;
                    Some(MediaHealthEvent::DecryptionStalled {
                        peer_id: peer_id.to_string(),
                        consecutive_failures: track.failures,
                    })
                } else {
                    None
                }
            }
        };

        if let Some(event) = event {
            tracing::warn!("Media health: {:?}", event);
            // No subscribers is fine
            let _ = self.events.send(event);
        }
    }

    /// State of our outgoing track
    pub fn outgoing_state(&self) -> TrackState {
        self.inner.lock().outgoing
    }

    /// State of the incoming track from a peer
    pub fn incoming_state(&self, peer_id: &str) -> TrackState {
        let inner = self.inner.lock();
        match inner.peers.get(peer_id) {
            Some(track) => track.state,
            None if inner.outgoing == TrackState::TornDown => TrackState::TornDown,
            None => TrackState::NoKey,
        }
    }

    /// Forget a peer that left; its key is zeroized
    pub fn remove_peer(&self, peer_id: &str) -> bool {
        self.inner.lock().peers.remove(peer_id).is_some()
    }

    /// End the session, dropping every key
    pub fn teardown(&self) {
        let mut inner = self.inner.lock();
        inner.local_key = None;
        inner.peers.clear();
        inner.outgoing = TrackState::TornDown;
        tracing::info!("Media session torn down");
    }
}
