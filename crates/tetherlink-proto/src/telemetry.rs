//! Telemetry payload schema.
//!
//! One record per frame, composed on the robot at a fixed cadence and
//! discarded rather than queued when the link is down: the operator either
//! sees fresh numbers or a stale-link indicator, never a backlog replay.

use serde::{Deserialize, Serialize};

use crate::errors::{FrameError, Result};

/// E-STOP block inside a telemetry record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EstopStatus {
    /// Whether the latch is engaged.
    pub engaged: bool,
    /// Reason tag for the current or most recent engagement.
    pub reason: String,
}

/// Echo of the most recent operator ping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pong {
    /// Timestamp copied from the ping.
    pub ping_ts: f64,
    /// Sequence number copied from the ping.
    pub ping_seq: u64,
}

/// Inertial measurement sample.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ImuReading {
    /// Linear acceleration, m/s², body frame.
    pub accel: [f64; 3],
    /// Angular rate, rad/s, body frame.
    pub gyro: [f64; 3],
}

/// Barometric sample.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BaroReading {
    /// Static pressure in hPa.
    pub pressure_hpa: f64,
    /// Derived altitude in meters.
    pub altitude_m: f64,
}

/// One robot-to-operator telemetry record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Telemetry {
    /// Battery voltage in volts.
    pub battery_v: f64,

    /// Current E-STOP state.
    pub estop: EstopStatus,

    /// Echo of the most recent ping, if any was received.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pong: Option<Pong>,

    /// Milliseconds since the last accepted control frame.
    pub control_age_ms: u64,

    /// Last observed control round-trip in milliseconds, if measured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rtt_ms: Option<f64>,

    /// Inertial sample.
    pub imu: ImuReading,

    /// Barometric sample.
    pub baro: BaroReading,

    /// Per-motor current draw in amperes.
    pub motor_currents_a: Vec<f64>,

    /// Wall-clock seconds since the Unix epoch at composition time.
    ///
    /// The only wall-clock field in the system; every timeout and age is
    /// measured on the monotonic clock.
    pub timestamp: u64,
}

impl Telemetry {
    /// Encode to JSON payload bytes.
    ///
    /// # Errors
    ///
    /// - [`FrameError::Decode`] if serialization fails
    pub fn encode(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| FrameError::Decode { reason: e.to_string() })
    }

    /// Decode from payload bytes.
    ///
    /// # Errors
    ///
    /// - [`FrameError::Decode`] on malformed JSON or schema mismatch
    pub fn decode(payload: &[u8]) -> Result<Self> {
        serde_json::from_slice(payload).map_err(|e| FrameError::Decode { reason: e.to_string() })
    }
}
