//! Safety core for the Tetherlink robot/base bridge.
//!
//! Owns the parts of the system where the fail-safe property lives: the
//! latched E-STOP state machine ([`safety::SafetyCore`]), the dispatcher
//! that routes authenticated commands into it ([`dispatch`]), the telemetry
//! composer, and the reconnect policy shared by every link.
//!
//! Everything here is sans-IO in the state-machine sense: methods take the
//! current instant and mutate local state. The robot and base crates drive
//! these machines from their socket loops; the harness drives them under
//! deterministic simulation.

pub mod actuator;
pub mod compose;
pub mod config;
pub mod constants;
pub mod dispatch;
pub mod env;
pub mod link;
pub mod policy;
pub mod safety;
pub mod sim;
pub mod sockets;
pub mod video;

#[cfg(test)]
pub(crate) mod testutil;

pub use actuator::{Actuator, ActuatorError, SensorError, SensorReading, Sensors};
pub use compose::TelemetryComposer;
pub use config::{ConfigError, NodeConfig, RawNodeConfig};
pub use dispatch::CommandDispatcher;
pub use env::{Environment, SystemEnv};
pub use link::{LinkMonitor, LinkState};
pub use policy::{ConnectDecision, KeepaliveConfig, ReconnectPolicy};
pub use safety::{ClearRejected, EstopReason, GateOutcome, SafetyCore, SafetySnapshot};
pub use video::{JpegAssembler, VideoSink, VideoSource};
