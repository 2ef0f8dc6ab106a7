//! Authenticated framing: sequence state plus HMAC under the PSK.
//!
//! Send and receive state are deliberately separate types. Each link owns
//! exactly one [`FrameSender`] on its send path and one [`FrameReceiver`] on
//! its receive path; the two never share mutable state, so the locking
//! discipline stays local to each half.
//!
//! # Security
//!
//! - The tag covers `seq_be || payload`, binding the sequence number to the
//!   content. A replayed frame cannot be re-tagged with a fresh sequence
//!   number without the key.
//! - Tag verification is constant-time (`Mac::verify_slice`), so a forger
//!   learns nothing from timing.
//! - Failed verification never advances `last_accepted_seq`: an attacker
//!   cannot burn sequence space with garbage frames.

use std::sync::{Arc, Mutex};

use bytes::Bytes;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::{
    errors::{FrameError, Result},
    frame::{Frame, MAX_FRAME_SIZE, TAG_SIZE},
    psk::Psk,
};

type HmacSha256 = Hmac<Sha256>;

/// Compute the authentication tag for `(seq, payload)` under `psk`.
fn compute_tag(psk: &Psk, seq: u64, payload: &[u8]) -> [u8; TAG_SIZE] {
    // INVARIANT: HMAC accepts keys of any length; 32 bytes cannot fail.
    #[allow(clippy::expect_used)]
    let mut mac = HmacSha256::new_from_slice(psk.as_bytes())
        .expect("invariant: HMAC-SHA256 accepts a 32-byte key");

    mac.update(&seq.to_be_bytes());
    mac.update(payload);

    let mut tag = [0u8; TAG_SIZE];
    tag.copy_from_slice(&mac.finalize().into_bytes());
    tag
}

/// Send half of the framer: assigns sequence numbers and tags frames.
///
/// # Ordering
///
/// `build` calls are totally ordered: the sequence increment and the emitted
/// frame happen under one lock, so concurrent builders cannot interleave a
/// sequence number with the wrong payload. The 64-bit counter does not wrap
/// in any realistic deployment.
pub struct FrameSender {
    psk: Arc<Psk>,
    next_seq: Mutex<u64>,
}

impl FrameSender {
    /// Create a sender with `next_seq = 0`.
    #[must_use]
    pub fn new(psk: Arc<Psk>) -> Self {
        Self { psk, next_seq: Mutex::new(0) }
    }

    /// Build a wire-ready authenticated frame around `payload`.
    ///
    /// # Errors
    ///
    /// - [`FrameError::FrameTooLarge`] if the payload exceeds
    ///   [`MAX_FRAME_SIZE`]. The sequence counter is not consumed on failure.
    pub fn build(&self, payload: impl Into<Bytes>) -> Result<Bytes> {
        let payload = payload.into();

        if payload.len() > MAX_FRAME_SIZE {
            return Err(FrameError::FrameTooLarge { size: payload.len(), max: MAX_FRAME_SIZE });
        }

        // INVARIANT: a poisoned lock means a builder panicked mid-frame;
        // sequence state is unrecoverable and continuing would break
        // monotonicity. Lint-checked code cannot panic here in practice.
        #[allow(clippy::expect_used)]
        let mut next_seq = self.next_seq.lock().expect("framer send lock poisoned");

        let seq = *next_seq;
        let tag = compute_tag(&self.psk, seq, &payload);
        let frame = Frame { seq, tag, payload };

        let mut wire = Vec::with_capacity(frame.encoded_len());
        frame.encode(&mut wire)?;

        *next_seq += 1;
        Ok(Bytes::from(wire))
    }

    /// Reset the sequence counter for a fresh connection.
    ///
    /// Called on establishment so the peer's fresh receive state accepts the
    /// stream from zero.
    pub fn reset(&self) {
        #[allow(clippy::expect_used)]
        let mut next_seq = self.next_seq.lock().expect("framer send lock poisoned");
        *next_seq = 0;
    }
}

impl std::fmt::Debug for FrameSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameSender").finish_non_exhaustive()
    }
}

/// Receive half of the framer: verifies tags and rejects replays.
///
/// Owned exclusively by one receive loop, so it takes `&mut self` rather
/// than locking internally.
pub struct FrameReceiver {
    psk: Arc<Psk>,
    last_accepted_seq: Option<u64>,
}

impl FrameReceiver {
    /// Create a receiver with no accepted sequence yet.
    ///
    /// A fresh receiver accepts any sequence number on its first valid
    /// frame, which is what lets a reconnecting peer restart from zero.
    #[must_use]
    pub fn new(psk: Arc<Psk>) -> Self {
        Self { psk, last_accepted_seq: None }
    }

    /// Verify a complete wire frame and accept its payload.
    ///
    /// Checks, in order: structural parse (length limit, truncation),
    /// constant-time tag verification, strict sequence monotonicity. Only a
    /// frame passing all three advances `last_accepted_seq`.
    ///
    /// # Errors
    ///
    /// - [`FrameError::FrameTooLarge`] / [`FrameError::Truncated`] from the
    ///   structural parse
    /// - [`FrameError::AuthFailure`] if the tag does not verify (state
    ///   unchanged)
    /// - [`FrameError::Replay`] if `seq` is not above the last accepted
    ///   sequence (state unchanged)
    pub fn verify(&mut self, wire: &[u8]) -> Result<(u64, Bytes)> {
        let frame = Frame::parse(wire)?;

        let mut mac = {
            // INVARIANT: 32-byte key, cannot fail.
            #[allow(clippy::expect_used)]
            HmacSha256::new_from_slice(self.psk.as_bytes())
                .expect("invariant: HMAC-SHA256 accepts a 32-byte key")
        };
        mac.update(&frame.seq.to_be_bytes());
        mac.update(&frame.payload);

        // Constant-time comparison; a mismatch reveals nothing about how
        // close the forged tag was.
        if mac.verify_slice(&frame.tag).is_err() {
            return Err(FrameError::AuthFailure);
        }

        if let Some(last) = self.last_accepted_seq {
            if frame.seq <= last {
                return Err(FrameError::Replay { seq: frame.seq, last_accepted: last });
            }
        }

        self.last_accepted_seq = Some(frame.seq);
        Ok((frame.seq, frame.payload))
    }

    /// Highest sequence number accepted so far, if any.
    #[must_use]
    pub fn last_accepted_seq(&self) -> Option<u64> {
        self.last_accepted_seq
    }

    /// Clear replay state so a new connection's sequence starts fresh.
    ///
    /// Called exactly once per connection accept/establishment, never
    /// mid-stream: resetting while a connection is live would reopen the
    /// replay window.
    pub fn reset(&mut self) {
        self.last_accepted_seq = None;
    }
}

impl std::fmt::Debug for FrameReceiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameReceiver")
            .field("last_accepted_seq", &self.last_accepted_seq)
            .finish_non_exhaustive()
    }
}
