//! Shared per-link connection state and counters.
//!
//! Each link (control, telemetry, video) owns one [`LinkMonitor`]; the
//! driver loops update it and the coordinator's status emission reads it.
//! Transitions are logged as they happen.

use std::sync::{
    Mutex, PoisonError,
    atomic::{AtomicU64, Ordering},
};

/// Connection lifecycle of a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// No connection, not currently trying.
    Disconnected,
    /// Connection attempt in flight.
    Connecting,
    /// Connection up and carrying traffic.
    Established,
    /// Shutting down; flushing final frames.
    Draining,
}

impl LinkState {
    /// Stable lowercase tag for logs and status emission.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Established => "established",
            Self::Draining => "draining",
        }
    }
}

/// Counter snapshot for status emission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkCounters {
    /// Frames successfully sent.
    pub frames_sent: u64,
    /// Frames received and accepted.
    pub frames_received: u64,
    /// Frames dropped (send timeout or fresh-or-nothing discard).
    pub frames_dropped: u64,
    /// Receive-buffer resync events (video only).
    pub resyncs: u64,
}

/// State and counters for one link.
#[derive(Debug)]
pub struct LinkMonitor {
    name: &'static str,
    state: Mutex<LinkState>,
    frames_sent: AtomicU64,
    frames_received: AtomicU64,
    frames_dropped: AtomicU64,
    resyncs: AtomicU64,
}

impl LinkMonitor {
    /// Monitor starting in [`LinkState::Disconnected`].
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            state: Mutex::new(LinkState::Disconnected),
            frames_sent: AtomicU64::new(0),
            frames_received: AtomicU64::new(0),
            frames_dropped: AtomicU64::new(0),
            resyncs: AtomicU64::new(0),
        }
    }

    /// Record a state transition; logged when it actually changes.
    pub fn set_state(&self, next: LinkState) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state != next {
            tracing::info!(
                link = self.name,
                from = state.as_str(),
                to = next.as_str(),
                "link state change"
            );
            *state = next;
        }
    }

    /// Current state.
    pub fn state(&self) -> LinkState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// True when the link is carrying traffic.
    pub fn is_established(&self) -> bool {
        self.state() == LinkState::Established
    }

    /// Count one sent frame.
    pub fn count_sent(&self) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one accepted received frame.
    pub fn count_received(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one dropped frame.
    pub fn count_dropped(&self) {
        self.frames_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one receive-buffer resync.
    pub fn count_resync(&self) {
        self.resyncs.fetch_add(1, Ordering::Relaxed);
    }

    /// Counter snapshot.
    pub fn counters(&self) -> LinkCounters {
        LinkCounters {
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            resyncs: self.resyncs.load(Ordering::Relaxed),
        }
    }

    /// Link name for log context.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }
}
