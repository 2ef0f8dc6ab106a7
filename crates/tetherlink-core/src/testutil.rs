//! Manually advanced clock for unit tests.

use std::sync::{Arc, atomic::{AtomicU64, Ordering}};
use std::time::Duration;

use crate::env::Environment;

/// Millisecond-resolution fake instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FakeInstant(pub u64);

impl std::ops::Sub for FakeInstant {
    type Output = Duration;

    fn sub(self, rhs: Self) -> Duration {
        Duration::from_millis(self.0.saturating_sub(rhs.0))
    }
}

/// Environment whose clock only moves when a test advances it.
#[derive(Clone, Default)]
pub struct ManualEnv {
    now_ms: Arc<AtomicU64>,
}

impl ManualEnv {
    /// Clock at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the clock.
    pub fn advance(&self, by: Duration) {
        self.now_ms.fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }
}

impl Environment for ManualEnv {
    type Instant = FakeInstant;

    fn now(&self) -> FakeInstant {
        FakeInstant(self.now_ms.load(Ordering::SeqCst))
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        // Unit tests drive time explicitly; a sleep just advances the clock.
        self.advance(duration);
        std::future::ready(())
    }

    fn wall_clock_secs(&self) -> u64 {
        self.now_ms.load(Ordering::SeqCst) / 1000
    }
}
