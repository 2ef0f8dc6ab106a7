//! Protocol error types.

use thiserror::Error;

/// Convenience alias for protocol results.
pub type Result<T> = std::result::Result<T, FrameError>;

/// Errors from frame construction, parsing, and verification.
///
/// On the control channel every variant is safety-relevant: the receive
/// loop closes the socket and engages E-STOP with a reason derived from the
/// variant. An unrecognized command tag is deliberately NOT an error here;
/// it decodes to [`crate::ControlCommand::Unknown`] (unknown is not
/// malformed) and is logged and dropped by the dispatcher.
#[derive(Debug, Error)]
pub enum FrameError {
    /// Payload exceeds [`crate::MAX_FRAME_SIZE`].
    #[error("frame too large: {size} bytes exceeds maximum {max}")]
    FrameTooLarge {
        /// Claimed or actual payload size.
        size: usize,
        /// Maximum permitted payload size.
        max: usize,
    },

    /// Buffer ended before the full frame arrived.
    #[error("frame truncated: expected {expected} bytes, got {actual}")]
    Truncated {
        /// Bytes the header claims.
        expected: usize,
        /// Bytes actually present.
        actual: usize,
    },

    /// HMAC tag did not verify against the pre-shared key.
    ///
    /// The frame was forged, corrupted, or built with a different PSK. The
    /// receiver's sequence state is not advanced.
    #[error("frame authentication failed")]
    AuthFailure,

    /// Sequence number at or below the last accepted one.
    ///
    /// Indicates redelivery of an already-accepted frame (a replay) or an
    /// out-of-order duplicate. State is unchanged.
    #[error("replayed frame: seq {seq} not above last accepted {last_accepted}")]
    Replay {
        /// Sequence number of the offending frame.
        seq: u64,
        /// Highest sequence number accepted so far.
        last_accepted: u64,
    },

    /// Payload was not a well-formed command or telemetry object.
    #[error("payload decode failed: {reason}")]
    Decode {
        /// Parser diagnostic.
        reason: String,
    },

    /// Underlying byte stream failed.
    #[error("stream error: {0}")]
    Io(#[from] std::io::Error),
}
