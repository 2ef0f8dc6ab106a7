//! Frame wire layout: parse and encode without key material.
//!
//! On-wire layout, all integers big-endian, no padding:
//!
//! ```text
//! [length: u32] [seq: u64] [tag: 32 bytes] [payload: length bytes]
//! ```
//!
//! `length` counts payload bytes only. Frames are written back-to-back on a
//! TCP byte stream; the reader in [`crate::io`] handles short reads and
//! arbitrary segmentation before handing a complete buffer to
//! [`Frame::parse`].
//!
//! This module is structural only: it guarantees layout validity (length
//! limit, no truncation) but says nothing about authenticity. The tag is
//! verified separately by [`crate::FrameReceiver`], which owns the key and
//! the replay state.

use bytes::{BufMut, Bytes};

use crate::errors::{FrameError, Result};

/// Maximum payload length in bytes (16 KiB).
///
/// Sized for the link: control and telemetry objects are small JSON records,
/// and a tight ceiling bounds allocation on the receive path before the tag
/// is checked.
pub const MAX_FRAME_SIZE: usize = 16 * 1024;

/// Width of the length prefix.
pub const LEN_SIZE: usize = 4;

/// Width of the sequence number.
pub const SEQ_SIZE: usize = 8;

/// Width of the HMAC-SHA256 tag.
pub const TAG_SIZE: usize = 32;

/// Fixed bytes preceding the payload (44).
pub const HEADER_SIZE: usize = LEN_SIZE + SEQ_SIZE + TAG_SIZE;

/// A parsed frame: sequence number, authentication tag, payload.
///
/// # Invariants
///
/// - `payload.len() <= MAX_FRAME_SIZE`, enforced by [`Frame::parse`] and
///   [`Frame::encode`].
/// - The `tag` is carried verbatim; nothing here checks it. A `Frame` is
///   untrusted until [`crate::FrameReceiver::verify`] accepts it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Sender-assigned sequence number, strictly monotonic per sender role.
    pub seq: u64,

    /// HMAC-SHA256 over `seq_be || payload` under the PSK.
    pub tag: [u8; TAG_SIZE],

    /// Opaque payload bytes (JSON command or telemetry object).
    pub payload: Bytes,
}

impl Frame {
    /// Total encoded size of this frame.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }

    /// Encode to wire bytes.
    ///
    /// # Errors
    ///
    /// - [`FrameError::FrameTooLarge`] if the payload exceeds
    ///   [`MAX_FRAME_SIZE`]. This is the enforcement point on the send path.
    pub fn encode(&self, dst: &mut impl BufMut) -> Result<()> {
        if self.payload.len() > MAX_FRAME_SIZE {
            return Err(FrameError::FrameTooLarge {
                size: self.payload.len(),
                max: MAX_FRAME_SIZE,
            });
        }

        // INVARIANT: payload.len() <= MAX_FRAME_SIZE < u32::MAX, checked above.
        dst.put_u32(self.payload.len() as u32);
        dst.put_u64(self.seq);
        dst.put_slice(&self.tag);
        dst.put_slice(&self.payload);

        Ok(())
    }

    /// Parse a complete frame from wire bytes.
    ///
    /// Validation order is cheapest-first: length prefix present, claimed
    /// size within limit, full frame present. Trailing bytes are ignored so
    /// a larger read buffer can be handed in directly.
    ///
    /// # Errors
    ///
    /// - [`FrameError::Truncated`] if the buffer ends before the header or
    ///   the claimed payload
    /// - [`FrameError::FrameTooLarge`] if the length prefix exceeds
    ///   [`MAX_FRAME_SIZE`]
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let Some(len_bytes) = bytes.get(..LEN_SIZE) else {
            return Err(FrameError::Truncated { expected: HEADER_SIZE, actual: bytes.len() });
        };

        // INVARIANT: slice is exactly LEN_SIZE, checked above.
        let mut len_arr = [0u8; LEN_SIZE];
        len_arr.copy_from_slice(len_bytes);
        let payload_len = u32::from_be_bytes(len_arr) as usize;

        if payload_len > MAX_FRAME_SIZE {
            return Err(FrameError::FrameTooLarge { size: payload_len, max: MAX_FRAME_SIZE });
        }

        let total = HEADER_SIZE + payload_len;
        if bytes.len() < total {
            return Err(FrameError::Truncated { expected: total, actual: bytes.len() });
        }

        let mut seq_arr = [0u8; SEQ_SIZE];
        let mut tag = [0u8; TAG_SIZE];

        // INVARIANT: bytes.len() >= total > HEADER_SIZE, checked above; all
        // ranges below are in bounds.
        seq_arr.copy_from_slice(&bytes[LEN_SIZE..LEN_SIZE + SEQ_SIZE]);
        tag.copy_from_slice(&bytes[LEN_SIZE + SEQ_SIZE..HEADER_SIZE]);

        let payload = Bytes::copy_from_slice(&bytes[HEADER_SIZE..total]);

        debug_assert_eq!(payload.len(), payload_len);

        Ok(Self { seq: u64::from_be_bytes(seq_arr), tag, payload })
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    impl Arbitrary for Frame {
        type Parameters = ();
        type Strategy = BoxedStrategy<Self>;

        fn arbitrary_with((): Self::Parameters) -> Self::Strategy {
            (
                any::<u64>(),
                prop::collection::vec(any::<u8>(), TAG_SIZE),
                prop::collection::vec(any::<u8>(), 0..512),
            )
                .prop_map(|(seq, tag_vec, payload)| {
                    let mut tag = [0u8; TAG_SIZE];
                    tag.copy_from_slice(&tag_vec);
                    Self { seq, tag, payload: Bytes::from(payload) }
                })
                .boxed()
        }
    }

    proptest! {
        #[test]
        fn frame_round_trip(frame in any::<Frame>()) {
            let mut wire = Vec::new();
            frame.encode(&mut wire).expect("should encode");

            let parsed = Frame::parse(&wire).expect("should parse");
            prop_assert_eq!(frame, parsed);
        }

        #[test]
        fn trailing_bytes_ignored(frame in any::<Frame>(), junk in prop::collection::vec(any::<u8>(), 0..64)) {
            let mut wire = Vec::new();
            frame.encode(&mut wire).expect("should encode");
            wire.extend_from_slice(&junk);

            let parsed = Frame::parse(&wire).expect("should parse");
            prop_assert_eq!(frame, parsed);
        }
    }

    #[test]
    fn empty_payload_is_valid() {
        let frame = Frame { seq: 7, tag: [0xAA; TAG_SIZE], payload: Bytes::new() };
        let mut wire = Vec::new();
        frame.encode(&mut wire).unwrap();

        assert_eq!(wire.len(), HEADER_SIZE);
        assert_eq!(Frame::parse(&wire).unwrap(), frame);
    }

    #[test]
    fn max_payload_is_valid() {
        let frame = Frame {
            seq: 1,
            tag: [0; TAG_SIZE],
            payload: Bytes::from(vec![0x55; MAX_FRAME_SIZE]),
        };
        let mut wire = Vec::new();
        frame.encode(&mut wire).unwrap();

        assert_eq!(Frame::parse(&wire).unwrap().payload.len(), MAX_FRAME_SIZE);
    }

    #[test]
    fn oversized_payload_rejected_on_encode() {
        let frame = Frame {
            seq: 1,
            tag: [0; TAG_SIZE],
            payload: Bytes::from(vec![0; MAX_FRAME_SIZE + 1]),
        };
        let mut wire = Vec::new();

        let result = frame.encode(&mut wire);
        assert!(matches!(result, Err(FrameError::FrameTooLarge { size, .. }) if size == MAX_FRAME_SIZE + 1));
    }

    #[test]
    fn oversized_length_prefix_rejected_on_parse() {
        let mut wire = Vec::new();
        wire.extend_from_slice(&u32::try_from(MAX_FRAME_SIZE + 1).unwrap().to_be_bytes());
        wire.extend_from_slice(&[0u8; HEADER_SIZE - LEN_SIZE]);

        let result = Frame::parse(&wire);
        assert!(matches!(result, Err(FrameError::FrameTooLarge { .. })));
    }

    #[test]
    fn truncated_header_rejected() {
        let result = Frame::parse(&[0u8; HEADER_SIZE - 1]);
        assert!(matches!(result, Err(FrameError::Truncated { .. })));
    }

    #[test]
    fn truncated_payload_rejected() {
        let frame = Frame { seq: 3, tag: [1; TAG_SIZE], payload: Bytes::from_static(b"abcdef") };
        let mut wire = Vec::new();
        frame.encode(&mut wire).unwrap();
        wire.truncate(wire.len() - 2);

        let result = Frame::parse(&wire);
        assert!(matches!(result, Err(FrameError::Truncated { expected, actual })
            if expected == HEADER_SIZE + 6 && actual == HEADER_SIZE + 4));
    }
}
