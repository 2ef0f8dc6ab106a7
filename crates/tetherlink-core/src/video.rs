//! Video stream capabilities and JPEG reassembly.
//!
//! Video rides an unauthenticated, best-effort byte stream of raw
//! concatenated JPEGs, delimited only by the standard SOI/EOI markers. The
//! receiving side reassembles frames from arbitrary TCP segmentation with a
//! hard buffer bound; on overflow it resynchronizes at the next SOI rather
//! than growing.
//!
//! Nothing in this module touches safety state, by construction: the types
//! here have no reference to `SafetyCore` and share no lock with it.

use bytes::{Bytes, BytesMut};

use crate::constants::MAX_VIDEO_BUFFER;

/// JPEG start-of-image marker.
pub const SOI: [u8; 2] = [0xFF, 0xD8];

/// JPEG end-of-image marker.
pub const EOI: [u8; 2] = [0xFF, 0xD9];

/// Frame producer on the robot: "acquire latest" semantics, old frames may
/// be discarded by the source.
pub trait VideoSource: Send {
    /// The most recent complete JPEG, if one is ready. Never blocks.
    fn latest_jpeg(&mut self) -> Option<Bytes>;
}

/// Frame consumer on the base (republisher, recorder, UI feed).
pub trait VideoSink: Send {
    /// Hand over one complete JPEG.
    fn push_jpeg(&mut self, frame: Bytes);
}

/// Reassembles JPEG frames from an unframed byte stream.
///
/// # Invariants
///
/// - The internal buffer never exceeds [`MAX_VIDEO_BUFFER`] after a `push`
///   returns; overflow discards up to the next SOI and counts a resync.
/// - Partial frame tails are carried forward between pushes.
#[derive(Debug, Default)]
pub struct JpegAssembler {
    buf: BytesMut,
    resyncs: u64,
}

impl JpegAssembler {
    /// Create an empty assembler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append received bytes and extract every complete frame now available.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Bytes> {
        self.buf.extend_from_slice(chunk);

        let mut frames = Vec::new();
        loop {
            // Drop garbage before the first SOI; without one the buffer
            // holds no decodable data (keep a trailing 0xFF in case the
            // marker was split across reads).
            match find_marker(&self.buf, SOI) {
                Some(0) => {},
                Some(start) => {
                    let _ = self.buf.split_to(start);
                },
                None => {
                    let keep = usize::from(self.buf.last() == Some(&0xFF));
                    let tail_start = self.buf.len() - keep;
                    let _ = self.buf.split_to(tail_start);
                    break;
                },
            }

            // Frame runs SOI..=EOI; EOI search starts past the SOI so the
            // 0xD8 byte cannot be misread as part of an EOI.
            let Some(eoi) = find_marker_from(&self.buf, EOI, SOI.len()) else {
                break;
            };

            let frame_len = eoi + EOI.len();
            if frame_len > MAX_VIDEO_BUFFER {
                // A frame larger than the whole buffer bound is never
                // emitted, however the bytes were segmented.
                self.resync();
                continue;
            }

            let frame = self.buf.split_to(frame_len);
            frames.push(frame.freeze());
        }

        // Each resync drops at least up to the next SOI (or clears), so
        // this terminates with the buffer back under its bound.
        while self.buf.len() > MAX_VIDEO_BUFFER {
            self.resync();
        }

        frames
    }

    /// Resync events since creation.
    #[must_use]
    pub fn resyncs(&self) -> u64 {
        self.resyncs
    }

    /// Bytes currently buffered (partial tail).
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Discard up to the next SOI after the current (oversized, headless)
    /// frame start, or everything if none is present.
    fn resync(&mut self) {
        self.resyncs += 1;

        match find_marker_from(&self.buf, SOI, SOI.len()) {
            Some(next) => {
                let _ = self.buf.split_to(next);
            },
            None => self.buf.clear(),
        }

        tracing::warn!(
            event = "buffer_overflow",
            channel = "video",
            resyncs = self.resyncs,
            buffered = self.buf.len(),
            "video buffer overflow, resynchronized at next SOI"
        );
    }
}

fn find_marker(haystack: &[u8], marker: [u8; 2]) -> Option<usize> {
    find_marker_from(haystack, marker, 0)
}

fn find_marker_from(haystack: &[u8], marker: [u8; 2], start: usize) -> Option<usize> {
    haystack
        .get(start..)?
        .windows(2)
        .position(|w| w == marker)
        .map(|pos| pos + start)
}
