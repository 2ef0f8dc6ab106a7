//! Peripheral bundle handed to the coordinator.
//!
//! Hardware drivers are integration collaborators: an integration build
//! implements [`Actuator`], [`Sensors`], and [`VideoSource`] for its motor
//! controllers and cameras and constructs this bundle itself. The shipped
//! binary runs with the deterministic simulants (`SIM_MODE`).

use std::sync::Arc;

use tetherlink_core::sim::{SimActuator, SimSensors, SimVideoSource};
use tetherlink_core::{Actuator, Sensors, VideoSource};

/// The robot's hardware edges.
pub struct Peripherals {
    /// Drive train, clamp, camera mux.
    pub actuator: Box<dyn Actuator>,
    /// Battery, IMU, barometer, motor current sensing.
    pub sensors: Box<dyn Sensors>,
    /// JPEG frame source.
    pub video: Box<dyn VideoSource>,
}

impl Peripherals {
    /// Deterministic simulants for `SIM_MODE` and tests.
    #[must_use]
    pub fn sim() -> Self {
        Self {
            actuator: Box::new(Arc::new(SimActuator::default())),
            sensors: Box::new(SimSensors::default()),
            video: Box::new(SimVideoSource::default()),
        }
    }

    /// Simulants with an externally held actuator handle, so a test can
    /// inspect the actuation ledger.
    #[must_use]
    pub fn sim_with_actuator(actuator: Arc<SimActuator>) -> Self {
        Self {
            actuator: Box::new(actuator),
            sensors: Box::new(SimSensors::default()),
            video: Box::new(SimVideoSource::default()),
        }
    }
}

impl std::fmt::Debug for Peripherals {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Peripherals").finish_non_exhaustive()
    }
}
