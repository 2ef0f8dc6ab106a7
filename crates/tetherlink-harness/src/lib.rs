//! Deterministic simulation harness for the Tetherlink bridge.
//!
//! Runs the real link code (the same per-connection functions the
//! production accept/connect loops drive) over turmoil's simulated network
//! and virtual clock. Thirty-five simulated seconds of watchdog behavior
//! run in milliseconds, bit-for-bit reproducibly.
//!
//! The end-to-end scenario suite lives in `tests/`: boot latch, happy-path
//! release, rejected release, watchdog trip, replay injection, and
//! video/control isolation.

pub mod sim_env;
pub mod sim_robot;

pub use sim_env::SimEnv;
pub use sim_robot::{RobotHandles, RobotSlot, SIM_PSK, handles, serve_robot, sim_psk};
