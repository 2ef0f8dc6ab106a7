//! Routing of verified control payloads into the safety core.
//!
//! The dispatcher runs after frame authentication: by the time a payload
//! reaches [`CommandDispatcher::dispatch`], the frame's tag verified and its
//! sequence number advanced. The dispatcher decodes the command and routes
//! it as a match over the variants; the only paths to actuation are
//! through [`crate::SafetyCore`].
//!
//! Failure policy at this layer:
//!
//! - Decode error → propagated; the receive loop closes the socket and
//!   engages E-STOP (`decode_error`). An authenticated peer sending garbage
//!   is a peer we cannot reason about.
//! - Unknown tag → logged and dropped. No actuation, no E-STOP. Unknown is
//!   not malformed; a newer operator station may speak to an older robot.

use std::sync::{Mutex, PoisonError, atomic::{AtomicU64, Ordering}};
use std::time::Duration;

use tetherlink_proto::{ControlCommand, FrameError, telemetry::Pong};

use crate::{env::Environment, safety::{EstopReason, SafetyCore}};

/// Echo state shared between the dispatcher and the telemetry composer.
#[derive(Debug, Clone, Default, PartialEq)]
struct EchoState {
    pong: Option<Pong>,
    rtt_ms: Option<f64>,
}

/// Decodes and routes control commands on the robot.
pub struct CommandDispatcher<E: Environment> {
    env: E,
    safety: std::sync::Arc<SafetyCore<E>>,
    echo: Mutex<EchoState>,
    unknown_count: AtomicU64,
}

impl<E: Environment> CommandDispatcher<E> {
    /// New dispatcher routing into `safety`.
    pub fn new(env: E, safety: std::sync::Arc<SafetyCore<E>>) -> Self {
        Self { env, safety, echo: Mutex::new(EchoState::default()), unknown_count: AtomicU64::new(0) }
    }

    /// Process one verified control payload.
    ///
    /// Marks control freshness, then routes. E-STOP release carries
    /// `control_age = 0` by construction: the command being processed *is*
    /// the most recent control frame.
    ///
    /// # Errors
    ///
    /// - [`FrameError::Decode`] if the payload is malformed; the caller
    ///   must close the connection and engage E-STOP
    pub fn dispatch(&self, payload: &[u8]) -> Result<(), FrameError> {
        let command = ControlCommand::decode(payload)?;
        self.safety.note_control(self.env.now());

        match command {
            ControlCommand::EmergencyStop { engage: true, reason, .. } => {
                tracing::warn!(operator_reason = reason.as_deref(), "operator engage");
                self.safety.engage(EstopReason::OperatorEngage);
            },

            ControlCommand::EmergencyStop { engage: false, confirm, .. } => {
                let confirm = confirm.unwrap_or_default();
                match self.safety.clear(&confirm, true, Duration::ZERO) {
                    Ok(()) => {
                        tracing::info!(event = "clear_accepted", "estop release accepted");
                    },
                    Err(rejection) => {
                        tracing::warn!(event = "clear_rejected", code = %rejection, "estop release refused");
                    },
                }
            },

            ControlCommand::Ping { ts, seq, rtt_ms } => {
                let mut echo = self.echo.lock().unwrap_or_else(PoisonError::into_inner);
                echo.pong = Some(Pong { ping_ts: ts, ping_seq: seq });
                if rtt_ms.is_some() {
                    echo.rtt_ms = rtt_ms;
                }
            },

            ControlCommand::Unknown(tag) => {
                self.unknown_count.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(%tag, "unknown command tag dropped");
            },

            routed @ (ControlCommand::ClampOpen
            | ControlCommand::ClampClose
            | ControlCommand::CameraSelect { .. }
            | ControlCommand::InputEvent { .. }
            | ControlCommand::Setpoint { .. }) => {
                let outcome = self.safety.gate(|actuator| actuator.apply(&routed));
                tracing::debug!(?outcome, "routed actuation");
            },
        }

        Ok(())
    }

    /// Most recent pong echo and reported round trip, for composition.
    pub fn latest_echo(&self) -> (Option<Pong>, Option<f64>) {
        let echo = self.echo.lock().unwrap_or_else(PoisonError::into_inner);
        (echo.pong.clone(), echo.rtt_ms)
    }

    /// Unknown-tag commands dropped since start.
    pub fn unknown_count(&self) -> u64 {
        self.unknown_count.load(Ordering::Relaxed)
    }
}
