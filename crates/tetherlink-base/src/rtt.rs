//! Round-trip measurement over the ping/pong echo loop.
//!
//! The base stamps each ping with its own monotonic clock; the robot echoes
//! the stamp back inside telemetry. Both ends of the measurement are the
//! same clock, so the difference is a true round trip (control uplink plus
//! one telemetry downlink hop).

use std::sync::{Mutex, PoisonError};

use tetherlink_core::Environment;
use tetherlink_proto::telemetry::Pong;

#[derive(Debug, Default)]
struct RttInner {
    last_rtt_ms: Option<f64>,
    last_pong_seq: Option<u64>,
}

/// Tracks ping stamps and pong echoes.
pub struct RttTracker<E: Environment> {
    env: E,
    epoch: E::Instant,
    inner: Mutex<RttInner>,
}

impl<E: Environment> RttTracker<E> {
    /// Tracker with its epoch at "now".
    pub fn new(env: E) -> Self {
        let epoch = env.now();
        Self { env, epoch, inner: Mutex::new(RttInner::default()) }
    }

    /// Monotonic seconds since this tracker's epoch; the `ts` stamp for
    /// outgoing pings.
    pub fn now_secs(&self) -> f64 {
        (self.env.now() - self.epoch).as_secs_f64()
    }

    /// Fold in a pong carried by a telemetry record.
    ///
    /// Each pong sequence is measured once; telemetry repeats the latest
    /// pong at 10 Hz and re-measuring the same echo would report the age of
    /// the pong, not the round trip.
    pub fn note_pong(&self, pong: &Pong) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);

        if inner.last_pong_seq == Some(pong.ping_seq) {
            return;
        }
        inner.last_pong_seq = Some(pong.ping_seq);

        let rtt_s = self.now_secs() - pong.ping_ts;
        if rtt_s >= 0.0 {
            inner.last_rtt_ms = Some(rtt_s * 1000.0);
        }
    }

    /// Last measured round trip in milliseconds.
    pub fn last_rtt_ms(&self) -> Option<f64> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).last_rtt_ms
    }
}
