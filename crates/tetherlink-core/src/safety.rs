//! Latched E-STOP state machine and actuation gate.
//!
//! `SafetyCore` owns the single latched safety flag and the actuator behind
//! it. Every actuation in the system passes through [`SafetyCore::gate`],
//! which re-checks the latch *inside* the critical section immediately
//! before touching hardware; there is no time-of-check/time-of-use window
//! between "is E-STOP clear?" and "command the motor".
//!
//! # State machine
//!
//! ```text
//!            engage(r)                      clear(confirm, conn, age)
//!          ┌───────────┐                  all guards pass
//!          ↓           │      ┌──────────────────────────────┐
//!      ┌─────────┐─────┘      │                              ↓
//!      │ Engaged │←───────────┴──────────────────────┐  ┌─────────┐
//!      └─────────┘  watchdog / disconnect / auth /   └──│ Cleared │
//!           ↑        decode / overflow / engage(r)       └─────────┘
//!        initial (reason: boot_default)
//! ```
//!
//! The latch starts engaged at process creation and the process exits with
//! it engaged. Release requires all three guards at once: the exact confirm
//! string, a live control connection, and control traffic fresher than
//! [`ESTOP_CLEAR_MAX_AGE`]. There is no toggle, and the watchdog path is
//! structurally unable to call [`SafetyCore::clear`].
//!
//! # Locking
//!
//! One `std::sync::Mutex` guards the flag, the freshness bookkeeping, and
//! the actuator itself. The watchdog's read of `last_control_time` and the
//! dispatcher's update of it are serialized by the same lock, and an
//! `engage` is atomic with respect to any concurrent `gate`: once `engage`
//! returns, no actuation can begin.

use std::sync::{
    Mutex, PoisonError,
    atomic::{AtomicU64, Ordering},
};
use std::time::Duration;

use thiserror::Error;

use crate::{
    actuator::{Actuator, ActuatorError},
    constants::{ESTOP_CLEAR_CONFIRM, ESTOP_CLEAR_MAX_AGE, ESTOP_DEBOUNCE_WINDOW, STARTUP_GRACE, WATCHDOG_TIMEOUT},
    env::Environment,
};

/// Why the E-STOP latch is (or was last) engaged.
///
/// A closed set: operator-supplied free text is logged but never becomes a
/// reason tag, so downstream consumers can match on the tag exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EstopReason {
    /// Initial latch at process start.
    Boot,
    /// No control frame accepted for [`WATCHDOG_TIMEOUT`].
    WatchdogTimeout,
    /// Frame failed authentication or was replayed.
    AuthFailure,
    /// Authenticated payload did not decode.
    DecodeError,
    /// Operator commanded an engage.
    OperatorEngage,
    /// A frame exceeded the size limit.
    BufferOverflow,
    /// The control connection dropped.
    Disconnect,
    /// No operator ever connected within [`STARTUP_GRACE`].
    StartupTimeout,
    /// Process is shutting down.
    Shutdown,
    /// An actuator call failed inside the gate.
    ActuatorFault,
}

impl EstopReason {
    /// Stable tag used on the wire and in logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Boot => "boot_default",
            Self::WatchdogTimeout => "watchdog_timeout",
            Self::AuthFailure => "auth_failure",
            Self::DecodeError => "decode_error",
            Self::OperatorEngage => "operator_engage",
            Self::BufferOverflow => "buffer_overflow",
            Self::Disconnect => "disconnect",
            Self::StartupTimeout => "startup_timeout",
            Self::Shutdown => "shutdown",
            Self::ActuatorFault => "actuator_fault",
        }
    }
}

impl std::fmt::Display for EstopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an E-STOP release was refused. The latch is unchanged in every case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ClearRejected {
    /// Confirmation string did not match byte-for-byte.
    #[error("wrong_confirm")]
    WrongConfirm,
    /// Control link is not connected.
    #[error("disconnected")]
    Disconnected,
    /// Last accepted control frame is older than [`ESTOP_CLEAR_MAX_AGE`].
    #[error("stale_control")]
    StaleControl,
}

/// Result of routing an actuation through the gate.
#[derive(Debug)]
pub enum GateOutcome {
    /// Latch was clear; the action ran.
    Applied,
    /// Latch was engaged; the action never ran.
    Suppressed,
    /// The action ran and failed; E-STOP is now engaged defensively.
    Fault(ActuatorError),
}

/// Point-in-time view of the safety state for telemetry and status.
///
/// This is the read-only handle offered to observers; nothing reachable
/// from it can mutate the latch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafetySnapshot {
    /// Whether the latch is engaged.
    pub engaged: bool,
    /// Reason tag; empty when cleared.
    pub reason: String,
    /// Whether any control frame was ever accepted.
    pub control_established: bool,
    /// Time since the last accepted control frame.
    pub control_age: Duration,
    /// Actuations suppressed by the gate since start.
    pub gated_out: u64,
}

struct SafetyInner<I> {
    engaged: bool,
    reason: Option<EstopReason>,
    last_control_time: I,
    control_established: bool,
    last_event_emitted: Option<I>,
    actuator: Box<dyn Actuator>,
}

/// The latched E-STOP flag, its guards, and the actuator it protects.
pub struct SafetyCore<E: Environment> {
    env: E,
    process_start: E::Instant,
    inner: Mutex<SafetyInner<E::Instant>>,
    gated_out: AtomicU64,
}

impl<E: Environment> SafetyCore<E> {
    /// Create the core with the latch engaged (`boot_default`).
    ///
    /// No actuator call is made here: the latch starts engaged, and
    /// `stop_all` fires only on a cleared-to-engaged edge. A robot that
    /// never hears from an operator never has its actuators touched.
    pub fn new(env: E, actuator: Box<dyn Actuator>) -> Self {
        let now = env.now();
        Self {
            env,
            process_start: now,
            inner: Mutex::new(SafetyInner {
                engaged: true,
                reason: Some(EstopReason::Boot),
                last_control_time: now,
                control_established: false,
                last_event_emitted: None,
                actuator,
            }),
            gated_out: AtomicU64::new(0),
        }
    }

    /// Engage the latch.
    ///
    /// Idempotent: on a cleared-to-engaged edge the actuator is stopped
    /// inside the critical section; while already engaged, a new reason is
    /// recorded but nothing is re-stopped. Returns whether this call caused
    /// the edge.
    pub fn engage(&self, reason: EstopReason) -> bool {
        let mut inner = self.lock();
        self.engage_locked(&mut inner, reason)
    }

    fn engage_locked(&self, inner: &mut SafetyInner<E::Instant>, reason: EstopReason) -> bool {
        let edge = !inner.engaged;
        let reason_changed = inner.reason != Some(reason);

        if edge {
            inner.engaged = true;
            // The stop happens inside the critical section: a concurrent
            // gate() either completed before we took the lock or will
            // observe engaged == true.
            if let Err(error) = inner.actuator.stop_all() {
                tracing::error!(event = "actuator_fault", %error, "stop_all failed while engaging");
            }
        }

        if reason_changed {
            inner.reason = Some(reason);
        }

        if edge || reason_changed {
            tracing::warn!(event = reason.as_str(), engaged_edge = edge, "estop engage");
            self.emit_estop_changed(inner);
        }

        edge
    }

    /// Release the latch. All guards must hold; any failure leaves the
    /// state untouched and reports why.
    ///
    /// # Errors
    ///
    /// - [`ClearRejected::WrongConfirm`] unless `confirm` equals
    ///   [`ESTOP_CLEAR_CONFIRM`] byte-for-byte
    /// - [`ClearRejected::Disconnected`] unless the control link is up
    /// - [`ClearRejected::StaleControl`] unless `control_age` is within
    ///   [`ESTOP_CLEAR_MAX_AGE`]
    pub fn clear(
        &self,
        confirm: &str,
        control_connected: bool,
        control_age: Duration,
    ) -> Result<(), ClearRejected> {
        if confirm.as_bytes() != ESTOP_CLEAR_CONFIRM.as_bytes() {
            return Err(ClearRejected::WrongConfirm);
        }
        if !control_connected {
            return Err(ClearRejected::Disconnected);
        }
        if control_age > ESTOP_CLEAR_MAX_AGE {
            return Err(ClearRejected::StaleControl);
        }

        let mut inner = self.lock();
        if inner.engaged {
            inner.engaged = false;
            inner.reason = None;
            self.emit_estop_changed(&mut inner);
        }
        Ok(())
    }

    /// Run an actuation if and only if the latch is clear.
    ///
    /// The check and the action share one critical section, so an `engage`
    /// that returns before this call observes no later actuation, and an
    /// `engage` that blocks on the lock stops the hardware only after the
    /// in-flight action finished. A failing action engages E-STOP
    /// defensively (`actuator_fault`).
    pub fn gate(
        &self,
        action: impl FnOnce(&mut dyn Actuator) -> Result<(), ActuatorError>,
    ) -> GateOutcome {
        let mut inner = self.lock();

        if inner.engaged {
            self.gated_out.fetch_add(1, Ordering::Relaxed);
            return GateOutcome::Suppressed;
        }

        match action(inner.actuator.as_mut()) {
            Ok(()) => GateOutcome::Applied,
            Err(error) => {
                tracing::error!(event = "actuator_fault", %error, "engaging defensively");
                self.engage_locked(&mut inner, EstopReason::ActuatorFault);
                GateOutcome::Fault(error)
            },
        }
    }

    /// Watchdog tick; call at ≥ 1 Hz from a scheduling unit that I/O
    /// cannot starve.
    ///
    /// Two checks, in order: before any control was ever accepted, the
    /// startup grace applies; afterwards, the freshness watchdog applies.
    pub fn tick(&self, now: E::Instant) {
        let mut inner = self.lock();

        if !inner.control_established {
            if now - self.process_start > STARTUP_GRACE {
                self.engage_locked(&mut inner, EstopReason::StartupTimeout);
            }
            return;
        }

        if now - inner.last_control_time > WATCHDOG_TIMEOUT {
            self.engage_locked(&mut inner, EstopReason::WatchdogTimeout);
        }
    }

    /// Record an accepted, authenticated control frame.
    ///
    /// Serialized with the watchdog's observation under the same lock.
    /// `control_established` is sticky once set.
    pub fn note_control(&self, now: E::Instant) {
        let mut inner = self.lock();
        inner.last_control_time = now;
        inner.control_established = true;
    }

    /// Time since the last accepted control frame.
    pub fn control_age(&self, now: E::Instant) -> Duration {
        let inner = self.lock();
        now - inner.last_control_time
    }

    /// Read-only view for telemetry composition and status emission.
    pub fn snapshot(&self, now: E::Instant) -> SafetySnapshot {
        let inner = self.lock();
        SafetySnapshot {
            engaged: inner.engaged,
            reason: inner.reason.map(EstopReason::as_str).unwrap_or_default().to_string(),
            control_established: inner.control_established,
            control_age: now - inner.last_control_time,
            gated_out: self.gated_out.load(Ordering::Relaxed),
        }
    }

    /// Final engage on the way out; the process exits latched.
    pub fn shutdown(&self) {
        self.engage(EstopReason::Shutdown);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SafetyInner<E::Instant>> {
        // A panicked lock holder cannot have un-latched the flag (the latch
        // only releases through clear(), which cannot panic between the
        // guard checks and the store). Recover the guard and keep the
        // safety machinery running rather than taking the whole process
        // down mid-mission.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Debounced `estop_changed` notification.
    ///
    /// The flag has already transitioned (and the actuator already stopped,
    /// on an engage edge) by the time this runs; the debounce only spaces
    /// out subscriber notifications during transient storms.
    fn emit_estop_changed(&self, inner: &mut SafetyInner<E::Instant>) {
        let now = self.env.now();
        let due = inner
            .last_event_emitted
            .is_none_or(|last| now - last > ESTOP_DEBOUNCE_WINDOW);

        if due {
            inner.last_event_emitted = Some(now);
            tracing::warn!(
                event = "estop_changed",
                engaged = inner.engaged,
                reason = inner.reason.map(EstopReason::as_str).unwrap_or_default(),
            );
        }
    }
}

impl<E: Environment> std::fmt::Debug for SafetyCore<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("SafetyCore")
            .field("engaged", &inner.engaged)
            .field("reason", &inner.reason)
            .field("control_established", &inner.control_established)
            .finish_non_exhaustive()
    }
}
