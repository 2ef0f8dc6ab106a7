//! Environment abstraction for deterministic testing.
//!
//! Decouples the safety machinery from system time so the same code runs
//! against the real clock in production and against virtual time in the
//! simulation harness. Every timeout in the system is measured on the
//! monotonic clock; wall-clock time appears only in telemetry timestamps.

use std::time::Duration;

/// Abstract source of monotonic time, async sleep, and wall-clock stamps.
///
/// # Invariants
///
/// - `now()` never goes backwards within one execution context.
/// - `sleep()` is the only suspension point the trait introduces; it is used
///   by driver loops, never inside the safety-critical state machines.
pub trait Environment: Clone + Send + Sync + 'static {
    /// The monotonic instant type of this environment.
    ///
    /// Production uses `std::time::Instant`; the harness uses the virtual
    /// `tokio::time::Instant` so simulated time drives the watchdog.
    type Instant: Copy + Ord + Send + Sync + std::ops::Sub<Output = Duration> + std::fmt::Debug;

    /// Current monotonic time.
    fn now(&self) -> Self::Instant;

    /// Sleep for the given duration.
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send;

    /// Wall-clock seconds since the Unix epoch, for telemetry timestamps only.
    fn wall_clock_secs(&self) -> u64;
}

/// Production environment on the system clock.
#[derive(Clone, Copy, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a new system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    type Instant = std::time::Instant;

    fn now(&self) -> Self::Instant {
        std::time::Instant::now()
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }

    #[allow(clippy::expect_used)]
    fn wall_clock_secs(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("invariant: system clock is after Unix epoch (1970-01-01)")
            .as_secs()
    }
}
