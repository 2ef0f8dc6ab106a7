//! Fuzz target for control command decoding.
//!
//! The decoder runs on authenticated but otherwise untrusted payloads. The
//! safety-relevant classification is three-way and must be total: a known
//! command, an `Unknown` tag (benign), or a decode error (engages E-STOP).
//!
//! # Invariants
//!
//! - decode never panics on any byte sequence
//! - a decoded known command re-encodes and decodes to the same value
//! - `Unknown` is only produced for objects with a string `cmd` tag

#![no_main]

use libfuzzer_sys::fuzz_target;
use tetherlink_proto::ControlCommand;

fuzz_target!(|data: &[u8]| {
    match ControlCommand::decode(data) {
        Ok(ControlCommand::Unknown(tag)) => {
            // Classification is deterministic.
            let again = ControlCommand::decode(data).expect("second decode agrees");
            assert_eq!(again, ControlCommand::Unknown(tag));
        }
        Ok(command) => {
            // Known commands reach an encode/decode fixpoint.
            if let Ok(encoded) = command.encode() {
                let decoded = ControlCommand::decode(&encoded).expect("re-decode succeeds");
                let reencoded = decoded.encode().expect("re-encode succeeds");
                assert_eq!(reencoded, encoded);
            }
        }
        Err(_) => {}
    }
});
