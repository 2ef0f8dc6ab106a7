//! Virtual-time environment for turmoil simulations.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tetherlink_core::Environment;

/// Environment on tokio's clock, which turmoil virtualizes inside a
/// simulation: sleeps advance simulated time instantly and `now()` is
/// deterministic.
///
/// The epoch is captured lazily on first use because the virtual clock only
/// exists once the simulation is running.
#[derive(Clone, Default)]
pub struct SimEnv {
    epoch: Arc<OnceLock<tokio::time::Instant>>,
}

impl SimEnv {
    /// New environment; epoch taken at first use.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn epoch(&self) -> tokio::time::Instant {
        *self.epoch.get_or_init(tokio::time::Instant::now)
    }
}

impl Environment for SimEnv {
    type Instant = tokio::time::Instant;

    fn now(&self) -> tokio::time::Instant {
        let _ = self.epoch();
        tokio::time::Instant::now()
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }

    fn wall_clock_secs(&self) -> u64 {
        // Simulations have no wall clock; report a fixed epoch plus
        // simulated elapsed time so telemetry timestamps stay monotonic.
        1_700_000_000 + (self.now() - self.epoch()).as_secs()
    }
}
