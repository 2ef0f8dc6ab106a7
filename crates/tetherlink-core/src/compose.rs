//! Telemetry composition.
//!
//! One record per tick: sample the sensors, snapshot the safety state, fold
//! in the latest pong echo and round trip. The composer never queues; the
//! driver discards the record when the telemetry link is down, and a missed
//! tick is never "caught up" by sending two in a row.

use std::sync::Mutex;
use std::sync::PoisonError;

use tetherlink_proto::Telemetry;
use tetherlink_proto::telemetry::EstopStatus;

use crate::{
    actuator::{SensorError, Sensors},
    dispatch::CommandDispatcher,
    env::Environment,
    safety::SafetyCore,
};

/// Builds telemetry records from the robot's current state.
pub struct TelemetryComposer<E: Environment> {
    env: E,
    safety: std::sync::Arc<SafetyCore<E>>,
    dispatcher: std::sync::Arc<CommandDispatcher<E>>,
    sensors: Mutex<Box<dyn Sensors>>,
}

impl<E: Environment> TelemetryComposer<E> {
    /// New composer over the given sensors.
    pub fn new(
        env: E,
        safety: std::sync::Arc<SafetyCore<E>>,
        dispatcher: std::sync::Arc<CommandDispatcher<E>>,
        sensors: Box<dyn Sensors>,
    ) -> Self {
        Self { env, safety, dispatcher, sensors: Mutex::new(sensors) }
    }

    /// Compose one record.
    ///
    /// Bounded: one sensor sample plus lock-protected snapshot reads.
    ///
    /// # Errors
    ///
    /// - [`SensorError`] if sampling fails; the caller logs and skips this
    ///   tick (safety state untouched; the robot has local senses, and a
    ///   telemetry gap is not a control failure)
    pub fn compose(&self) -> Result<Telemetry, SensorError> {
        let reading = self
            .sensors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .sample()?;

        let now = self.env.now();
        let snapshot = self.safety.snapshot(now);
        let (pong, rtt_ms) = self.dispatcher.latest_echo();

        Ok(Telemetry {
            battery_v: reading.battery_v,
            estop: EstopStatus { engaged: snapshot.engaged, reason: snapshot.reason },
            pong,
            control_age_ms: snapshot.control_age.as_millis() as u64,
            rtt_ms,
            imu: reading.imu,
            baro: reading.baro,
            motor_currents_a: reading.motor_currents_a,
            timestamp: self.env.wall_clock_secs(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::constants::ESTOP_CLEAR_CONFIRM;
    use crate::sim::{SimActuator, SimSensors};
    use crate::testutil::ManualEnv;

    struct Fixture {
        composer: TelemetryComposer<ManualEnv>,
        dispatcher: Arc<CommandDispatcher<ManualEnv>>,
        safety: Arc<SafetyCore<ManualEnv>>,
        env: ManualEnv,
    }

    fn fixture() -> Fixture {
        let env = ManualEnv::new();
        let actuator = Arc::new(SimActuator::default());
        let safety = Arc::new(SafetyCore::new(env.clone(), Box::new(actuator)));
        let dispatcher = Arc::new(CommandDispatcher::new(env.clone(), Arc::clone(&safety)));
        let composer = TelemetryComposer::new(
            env.clone(),
            Arc::clone(&safety),
            Arc::clone(&dispatcher),
            Box::new(SimSensors::default()),
        );
        Fixture { composer, dispatcher, safety, env }
    }

    #[test]
    fn embeds_boot_estop_state() {
        let fx = fixture();

        let telemetry = fx.composer.compose().unwrap();
        assert!(telemetry.estop.engaged);
        assert_eq!(telemetry.estop.reason, "boot_default");
        assert_eq!(telemetry.pong, None);
        assert_eq!(telemetry.rtt_ms, None);
    }

    #[test]
    fn embeds_echo_and_control_age() {
        let fx = fixture();

        let ping = tetherlink_proto::ControlCommand::Ping { ts: 2.5, seq: 4, rtt_ms: Some(60.0) };
        fx.dispatcher.dispatch(&ping.encode().unwrap()).unwrap();
        fx.env.advance(Duration::from_millis(150));

        let telemetry = fx.composer.compose().unwrap();
        assert_eq!(telemetry.control_age_ms, 150);
        assert_eq!(telemetry.rtt_ms, Some(60.0));
        let pong = telemetry.pong.unwrap();
        assert_eq!(pong.ping_seq, 4);
    }

    #[test]
    fn reflects_release_and_reengage() {
        let fx = fixture();

        fx.safety.note_control(fx.env.now());
        fx.safety.clear(ESTOP_CLEAR_CONFIRM, true, Duration::ZERO).unwrap();
        assert!(!fx.composer.compose().unwrap().estop.engaged);

        fx.safety.engage(crate::safety::EstopReason::Disconnect);
        let telemetry = fx.composer.compose().unwrap();
        assert!(telemetry.estop.engaged);
        assert_eq!(telemetry.estop.reason, "disconnect");
    }

    #[test]
    fn record_round_trips_through_wire_encoding() {
        let fx = fixture();

        let telemetry = fx.composer.compose().unwrap();
        let decoded = Telemetry::decode(&telemetry.encode().unwrap()).unwrap();
        assert_eq!(decoded, telemetry);
    }
}
