//! Robot-side Tetherlink node.
//!
//! The robot owns the command ingress: it serves the control channel (the
//! operator connects in), dials out for telemetry and video, and runs the
//! watchdog on a scheduling unit of its own so no amount of stuck I/O can
//! keep E-STOP from firing.
//!
//! Per-connection logic is generic over the byte stream; the accept and
//! connect loops in this crate bind it to `tokio::net`, while the
//! simulation harness binds the same functions to `turmoil::net`.

pub mod control;
pub mod coordinator;
pub mod peripherals;
pub mod telemetry_link;
pub mod video_link;
pub mod watchdog;

pub use coordinator::RobotCoordinator;
pub use peripherals::Peripherals;
