//! Collaborator interfaces for hardware peripherals.
//!
//! The core never talks to motor controllers or sensor buses directly; it
//! consumes these capabilities. Implementations must be immediate: both
//! traits are called from inside `SafetyCore`'s critical section or the
//! composer's tick, so nothing here may block on I/O beyond a bounded
//! register read.

use thiserror::Error;

use tetherlink_proto::telemetry::{BaroReading, ImuReading};
use tetherlink_proto::ControlCommand;

/// Actuator failure (bus fault, driver rejection, out-of-range command).
///
/// A failure inside the safety gate engages E-STOP defensively: a drive
/// train in an unknown state is treated like a lost operator.
#[derive(Debug, Error)]
#[error("actuator fault: {0}")]
pub struct ActuatorError(pub String);

/// Sensor read failure.
#[derive(Debug, Error)]
#[error("sensor fault: {0}")]
pub struct SensorError(pub String);

/// One snapshot of everything the robot can sense about itself.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorReading {
    /// Battery voltage in volts.
    pub battery_v: f64,
    /// Inertial sample.
    pub imu: ImuReading,
    /// Barometric sample.
    pub baro: BaroReading,
    /// Per-motor current draw in amperes.
    pub motor_currents_a: Vec<f64>,
}

/// Drive-train capability consumed by the safety core.
pub trait Actuator: Send {
    /// Stop all motion immediately. Side-effecting; must not defer.
    ///
    /// # Errors
    ///
    /// - [`ActuatorError`] if the hardware refuses; the E-STOP latch is
    ///   already engaged when this is called, so the caller only logs.
    fn stop_all(&mut self) -> Result<(), ActuatorError>;

    /// Apply a routed command (clamp, camera, input event, setpoint).
    ///
    /// Only ever invoked through [`crate::SafetyCore::gate`], never
    /// directly.
    ///
    /// # Errors
    ///
    /// - [`ActuatorError`] on hardware rejection; the gate responds by
    ///   engaging E-STOP defensively.
    fn apply(&mut self, command: &ControlCommand) -> Result<(), ActuatorError>;
}

/// Sensing capability consumed by the telemetry composer.
pub trait Sensors: Send {
    /// Take one bounded-duration, non-blocking sample.
    ///
    /// # Errors
    ///
    /// - [`SensorError`] if a bus read fails; the composer logs and reuses
    ///   nothing (the tick is skipped), safety state is untouched.
    fn sample(&mut self) -> Result<SensorReading, SensorError>;
}
