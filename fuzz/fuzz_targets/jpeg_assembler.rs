//! Fuzz target for the video reassembly buffer.
//!
//! The assembler consumes an unauthenticated byte stream in arbitrary
//! segmentation. Whatever arrives, the buffer must stay bounded and every
//! emitted frame must be a well-formed SOI..EOI envelope.
//!
//! # Invariants
//!
//! - push never panics
//! - buffered bytes never exceed the video buffer bound after a push
//! - every emitted frame starts with SOI and ends with EOI

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use tetherlink_core::JpegAssembler;
use tetherlink_core::constants::MAX_VIDEO_BUFFER;

#[derive(Debug, Arbitrary)]
struct Input {
    chunks: Vec<Vec<u8>>,
}

fuzz_target!(|input: Input| {
    let mut assembler = JpegAssembler::new();

    for chunk in input.chunks.into_iter().take(64) {
        let frames = assembler.push(&chunk);

        assert!(assembler.buffered() <= MAX_VIDEO_BUFFER);

        for frame in frames {
            assert!(frame.len() >= 4);
            assert_eq!(&frame[..2], &[0xFF, 0xD8]);
            assert_eq!(&frame[frame.len() - 2..], &[0xFF, 0xD9]);
            assert!(frame.len() <= MAX_VIDEO_BUFFER);
        }
    }
});
