//! Deterministic peripheral simulants.
//!
//! Selected by `SIM_MODE`: the safety machinery is bit-for-bit the same, only
//! the hardware edges are replaced. The simulants are deterministic functions
//! of their call counts (no clocks, no RNG), which makes them equally useful
//! as test doubles for the unit suites and the simulation harness.

use std::sync::{Mutex, PoisonError, atomic::{AtomicU64, Ordering}};

use bytes::Bytes;

use tetherlink_proto::ControlCommand;
use tetherlink_proto::telemetry::{BaroReading, ImuReading};

use crate::{
    actuator::{Actuator, ActuatorError, SensorError, SensorReading, Sensors},
    video::{EOI, SOI, VideoSink, VideoSource},
};

/// One entry in the simulated actuator's ledger.
#[derive(Debug, Clone, PartialEq)]
pub enum SimActuatorEvent {
    /// `stop_all` was invoked.
    Stop,
    /// `apply` was invoked with this command.
    Apply(ControlCommand),
}

/// Recording actuator: every call lands in an ordered ledger.
#[derive(Debug, Default)]
pub struct SimActuator {
    ledger: Mutex<Vec<SimActuatorEvent>>,
}

impl SimActuator {
    /// Number of `stop_all` calls so far.
    pub fn stop_count(&self) -> usize {
        self.ledger().iter().filter(|e| matches!(e, SimActuatorEvent::Stop)).count()
    }

    /// Commands applied so far, in order.
    pub fn applied(&self) -> Vec<ControlCommand> {
        self.ledger()
            .iter()
            .filter_map(|e| match e {
                SimActuatorEvent::Apply(cmd) => Some(cmd.clone()),
                SimActuatorEvent::Stop => None,
            })
            .collect()
    }

    /// True when no `apply` appears after the first `stop_all`.
    ///
    /// The ordering witness for the engage/gate atomicity property.
    pub fn stop_recorded_after_all_applies(&self) -> bool {
        let ledger = self.ledger();
        match ledger.iter().position(|e| matches!(e, SimActuatorEvent::Stop)) {
            Some(first_stop) => ledger
                .iter()
                .skip(first_stop)
                .all(|e| !matches!(e, SimActuatorEvent::Apply(_))),
            None => true,
        }
    }

    fn ledger(&self) -> std::sync::MutexGuard<'_, Vec<SimActuatorEvent>> {
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Actuator for std::sync::Arc<SimActuator> {
    fn stop_all(&mut self) -> Result<(), ActuatorError> {
        self.ledger().push(SimActuatorEvent::Stop);
        Ok(())
    }

    fn apply(&mut self, command: &ControlCommand) -> Result<(), ActuatorError> {
        self.ledger().push(SimActuatorEvent::Apply(command.clone()));
        Ok(())
    }
}

/// Deterministic sensor pack: a slowly draining battery, a level IMU, and
/// a gentle pressure ramp, all pure functions of the sample count.
#[derive(Debug, Default)]
pub struct SimSensors {
    samples: AtomicU64,
}

impl Sensors for SimSensors {
    fn sample(&mut self) -> Result<SensorReading, SensorError> {
        let n = self.samples.fetch_add(1, Ordering::Relaxed);

        // 16.0 V draining 1 mV per sample, floored at 12.0 V.
        let battery_v = (16.0 - n as f64 * 0.001).max(12.0);
        let pressure_hpa = 1013.25 - (n % 100) as f64 * 0.01;

        Ok(SensorReading {
            battery_v,
            imu: ImuReading { accel: [0.0, 0.0, 9.81], gyro: [0.0, 0.0, 0.0] },
            baro: BaroReading { pressure_hpa, altitude_m: (n % 100) as f64 * 0.08 },
            motor_currents_a: vec![0.2 + (n % 10) as f64 * 0.01, 0.2],
        })
    }
}

/// Synthetic JPEG producer: well-formed SOI/EOI envelopes around a counter
/// pattern. Bodies avoid `0xFF` so no accidental markers appear.
#[derive(Debug)]
pub struct SimVideoSource {
    frame_count: u64,
    body_len: usize,
}

impl SimVideoSource {
    /// Source producing frames with `body_len` body bytes each.
    #[must_use]
    pub fn new(body_len: usize) -> Self {
        Self { frame_count: 0, body_len }
    }
}

impl Default for SimVideoSource {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl VideoSource for SimVideoSource {
    fn latest_jpeg(&mut self) -> Option<Bytes> {
        let n = self.frame_count;
        self.frame_count += 1;

        let mut frame = Vec::with_capacity(self.body_len + 4);
        frame.extend_from_slice(&SOI);
        frame.extend((0..self.body_len).map(|i| ((n as usize + i) % 0x7F) as u8));
        frame.extend_from_slice(&EOI);

        Some(Bytes::from(frame))
    }
}

/// Counting sink for received JPEG frames.
#[derive(Debug, Default)]
pub struct SimVideoSink {
    frames: AtomicU64,
    bytes: AtomicU64,
}

impl SimVideoSink {
    /// Frames consumed so far.
    pub fn frame_count(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    /// Total bytes consumed so far.
    pub fn byte_count(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }
}

impl VideoSink for std::sync::Arc<SimVideoSink> {
    fn push_jpeg(&mut self, frame: Bytes) {
        self.frames.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(frame.len() as u64, Ordering::Relaxed);
    }
}
