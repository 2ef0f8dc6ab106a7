//! Immutable safety constants.
//!
//! Compile-time and not overridable by configuration: making any of these
//! tunable would turn a certified timing property into a deployment hazard.
//! Frame-size limits live in `tetherlink-proto` next to the wire format.

use std::time::Duration;

/// E-STOP engages when no control frame was accepted for this long.
pub const WATCHDOG_TIMEOUT: Duration = Duration::from_secs(5);

/// Grace period after process start before "no operator ever appeared"
/// becomes a `startup_timeout` engagement.
pub const STARTUP_GRACE: Duration = Duration::from_secs(30);

/// Maximum control-frame age at which an E-STOP release is accepted.
pub const ESTOP_CLEAR_MAX_AGE: Duration = Duration::from_millis(1500);

/// Exact confirmation string required to release the E-STOP latch.
pub const ESTOP_CLEAR_CONFIRM: &str = "ESTOP_CLEAR_CONFIRM";

/// Cadence of the operator station's ping probes.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1);

/// Minimum spacing of externally visible E-STOP change notifications.
///
/// Debounces notification storms from rapid transient triggers; the latch
/// itself and the actuator stop are never delayed.
pub const ESTOP_DEBOUNCE_WINDOW: Duration = Duration::from_millis(300);

/// Bound on the video reassembly buffer (256 KiB).
pub const MAX_VIDEO_BUFFER: usize = 256 * 1024;

/// Interval between watchdog ticks.
pub const WATCHDOG_TICK: Duration = Duration::from_secs(1);

/// Nominal telemetry cadence; overridable within [50, 1000] ms.
pub const DEFAULT_TELEMETRY_INTERVAL: Duration = Duration::from_millis(100);

/// Upper bound on the accept-loop poll so a shutdown signal is seen promptly.
pub const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Upper bound on one control receive attempt. Together with the accept
/// poll this defines the failover floor.
pub const CONTROL_READ_TIMEOUT: Duration = Duration::from_secs(1);

/// Upper bound on telemetry and video sends.
pub const SEND_TIMEOUT: Duration = Duration::from_millis(500);

/// Upper bound on one outbound connection attempt.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Periodic status emission while a receive loop is idle.
pub const STATUS_INTERVAL: Duration = Duration::from_secs(10);

/// Bounded deadline for draining links at shutdown.
pub const DRAIN_DEADLINE: Duration = Duration::from_secs(3);
