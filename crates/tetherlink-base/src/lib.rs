//! Base-side (operator station) Tetherlink node.
//!
//! The base dials the robot's control ingress and serves the telemetry and
//! video channels. It never holds safety state: there is no `SafetyCore` on
//! this side, structurally. The only way the base affects the robot's latch
//! is by sending authenticated commands, or by disappearing, which the
//! robot's own watchdog turns into an engagement.

pub mod control;
pub mod coordinator;
pub mod rtt;
pub mod telemetry_srv;
pub mod video_rx;

pub use control::CommandSink;
pub use coordinator::BaseCoordinator;
pub use rtt::RttTracker;
pub use telemetry_srv::TelemetryStore;
