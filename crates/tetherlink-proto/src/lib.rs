//! Wire protocol for the Tetherlink robot/base bridge.
//!
//! The authenticated channels (control and telemetry) share one on-wire unit,
//! the [`Frame`]: a length-prefixed, HMAC-SHA256-authenticated record with a
//! strictly monotonic sequence number for replay protection. The video channel
//! is raw concatenated JPEG and does not use frames.
//!
//! Layering:
//!
//! - [`frame`]: wire layout, encode/parse (no key material)
//! - [`framer`]: [`FrameSender`]/[`FrameReceiver`], authentication and
//!   sequence state
//! - [`io`]: length-prefixed frame reads/writes over any async byte stream
//! - [`command`] / [`telemetry`]: JSON payload schemas carried inside frames
//!
//! Frames provide integrity and authenticity only. Payloads are not
//! encrypted; confidentiality is out of scope for this link.

pub mod command;
pub mod errors;
pub mod frame;
pub mod framer;
pub mod io;
pub mod psk;
pub mod telemetry;

pub use command::ControlCommand;
pub use errors::{FrameError, Result};
pub use frame::{Frame, HEADER_SIZE, MAX_FRAME_SIZE, TAG_SIZE};
pub use framer::{FrameReceiver, FrameSender};
pub use io::FrameReader;
pub use psk::Psk;
pub use telemetry::Telemetry;
