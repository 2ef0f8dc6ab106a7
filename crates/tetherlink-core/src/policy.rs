//! Reconnect scheduling: exponential backoff and a circuit breaker.
//!
//! Pure state machine in the action style: the driver asks
//! [`ReconnectPolicy::decide`] what to do, sleeps, attempts, and reports the
//! outcome back. No I/O, no clock reads; the current instant is always an
//! argument, so the machine tests exhaustively under fake time.

use std::time::Duration;

/// First backoff delay after a failure.
pub const BACKOFF_INITIAL: Duration = Duration::from_secs(1);

/// Backoff ceiling.
pub const BACKOFF_MAX: Duration = Duration::from_secs(32);

/// Consecutive failures that trip the breaker.
pub const BREAKER_FAILURE_THRESHOLD: u32 = 5;

/// How long the breaker stays open before probing.
pub const BREAKER_OPEN_DURATION: Duration = Duration::from_secs(30);

/// TCP keepalive parameters applied to every authenticated-channel socket.
///
/// 60 s idle, 10 s probe interval, 3 probes: a zombie peer is detected
/// within roughly 90 s even when no traffic flows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeepaliveConfig {
    /// Idle time before the first probe.
    pub idle: Duration,
    /// Interval between probes.
    pub interval: Duration,
    /// Unanswered probes before the connection is declared dead.
    pub count: u32,
}

impl Default for KeepaliveConfig {
    fn default() -> Self {
        Self { idle: Duration::from_secs(60), interval: Duration::from_secs(10), count: 3 }
    }
}

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Breaker<I> {
    /// Normal operation; attempts follow the backoff schedule.
    Closed,
    /// Attempts suppressed until the open window elapses.
    Open {
        /// When the breaker opened.
        since: I,
    },
    /// One probe attempt allowed.
    HalfOpen,
}

/// What the connect loop should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectDecision {
    /// Sleep this long, then attempt.
    AttemptAfter(Duration),
    /// Breaker is open; check back after this long. Do not attempt.
    Defer(Duration),
}

/// Per-link reconnect scheduler: exponential backoff with reset on success,
/// plus a breaker that stops hammering an unreachable peer.
#[derive(Debug)]
pub struct ReconnectPolicy<I> {
    next_delay: Duration,
    consecutive_failures: u32,
    breaker: Breaker<I>,
    first_attempt: bool,
}

impl<I> ReconnectPolicy<I>
where
    I: Copy + Ord + std::ops::Sub<Output = Duration>,
{
    /// Fresh policy: first attempt is immediate, backoff starts at 1 s.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_delay: BACKOFF_INITIAL,
            consecutive_failures: 0,
            breaker: Breaker::Closed,
            first_attempt: true,
        }
    }

    /// Decide what the connect loop does next.
    ///
    /// While the breaker is open this returns [`ConnectDecision::Defer`]
    /// with the remaining open time; when the window has elapsed the breaker
    /// moves to half-open and one probe attempt is allowed.
    pub fn decide(&mut self, now: I) -> ConnectDecision {
        match self.breaker {
            Breaker::Open { since } => {
                let elapsed = now - since;
                if elapsed >= BREAKER_OPEN_DURATION {
                    self.breaker = Breaker::HalfOpen;
                    ConnectDecision::AttemptAfter(Duration::ZERO)
                } else {
                    ConnectDecision::Defer(BREAKER_OPEN_DURATION - elapsed)
                }
            },
            Breaker::HalfOpen => ConnectDecision::AttemptAfter(Duration::ZERO),
            Breaker::Closed => {
                if self.first_attempt {
                    ConnectDecision::AttemptAfter(Duration::ZERO)
                } else {
                    ConnectDecision::AttemptAfter(self.next_delay)
                }
            },
        }
    }

    /// Record a successful establishment: backoff and breaker reset.
    pub fn on_success(&mut self) {
        self.next_delay = BACKOFF_INITIAL;
        self.consecutive_failures = 0;
        self.breaker = Breaker::Closed;
        self.first_attempt = false;
    }

    /// Record a failed attempt (connect error or established link lost).
    pub fn on_failure(&mut self, now: I) {
        self.first_attempt = false;
        self.consecutive_failures += 1;

        match self.breaker {
            // A failed probe reopens the breaker with a fresh timer.
            Breaker::HalfOpen => {
                self.breaker = Breaker::Open { since: now };
            },
            Breaker::Closed if self.consecutive_failures >= BREAKER_FAILURE_THRESHOLD => {
                self.breaker = Breaker::Open { since: now };
            },
            _ => {},
        }

        // Schedule: 1, 2, 4, ..., 32 s. The first failure waits the initial
        // delay; doubling starts with the second.
        self.next_delay = if self.consecutive_failures == 1 {
            BACKOFF_INITIAL
        } else {
            (self.next_delay * 2).min(BACKOFF_MAX)
        };
    }

    /// Consecutive failures since the last success.
    #[must_use]
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }
}

impl<I> Default for ReconnectPolicy<I>
where
    I: Copy + Ord + std::ops::Sub<Output = Duration>,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{FakeInstant, ManualEnv};
    use crate::env::Environment;

    fn attempt_delay(policy: &mut ReconnectPolicy<FakeInstant>, now: FakeInstant) -> Duration {
        match policy.decide(now) {
            ConnectDecision::AttemptAfter(delay) => delay,
            ConnectDecision::Defer(_) => panic!("expected an attempt"),
        }
    }

    #[test]
    fn first_attempt_is_immediate() {
        let env = ManualEnv::new();
        let mut policy = ReconnectPolicy::new();

        assert_eq!(attempt_delay(&mut policy, env.now()), Duration::ZERO);
    }

    #[test]
    fn backoff_doubles_to_the_cap() {
        let env = ManualEnv::new();
        let mut policy = ReconnectPolicy::new();

        let mut observed = Vec::new();
        for _ in 0..7 {
            policy.on_failure(env.now());
            // Threshold failures open the breaker; wait it out so we can
            // observe the raw backoff sequence.
            if let ConnectDecision::Defer(remaining) = policy.decide(env.now()) {
                env.advance(remaining);
            }
            observed.push(attempt_delay(&mut policy, env.now()));
        }

        // Delays 1,2,4,8 then the breaker's half-open probes (immediate).
        assert_eq!(
            observed[..4],
            [
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
                Duration::from_secs(8),
            ]
        );
        assert_eq!(observed[4..], [Duration::ZERO, Duration::ZERO, Duration::ZERO]);
    }

    #[test]
    fn success_resets_backoff() {
        let env = ManualEnv::new();
        let mut policy = ReconnectPolicy::new();

        policy.on_failure(env.now());
        policy.on_failure(env.now());
        policy.on_success();
        policy.on_failure(env.now());

        assert_eq!(attempt_delay(&mut policy, env.now()), Duration::from_secs(1));
        assert_eq!(policy.consecutive_failures(), 1);
    }

    #[test]
    fn breaker_opens_after_threshold() {
        let env = ManualEnv::new();
        let mut policy = ReconnectPolicy::new();

        for _ in 0..BREAKER_FAILURE_THRESHOLD {
            policy.on_failure(env.now());
        }

        match policy.decide(env.now()) {
            ConnectDecision::Defer(remaining) => assert_eq!(remaining, BREAKER_OPEN_DURATION),
            ConnectDecision::AttemptAfter(_) => panic!("breaker should be open"),
        }
    }

    #[test]
    fn breaker_half_opens_after_window() {
        let env = ManualEnv::new();
        let mut policy = ReconnectPolicy::new();

        for _ in 0..BREAKER_FAILURE_THRESHOLD {
            policy.on_failure(env.now());
        }
        env.advance(BREAKER_OPEN_DURATION);

        // One probe allowed immediately.
        assert_eq!(attempt_delay(&mut policy, env.now()), Duration::ZERO);
    }

    #[test]
    fn failed_probe_reopens_with_fresh_timer() {
        let env = ManualEnv::new();
        let mut policy = ReconnectPolicy::new();

        for _ in 0..BREAKER_FAILURE_THRESHOLD {
            policy.on_failure(env.now());
        }
        env.advance(BREAKER_OPEN_DURATION);
        let _ = attempt_delay(&mut policy, env.now());

        policy.on_failure(env.now());
        match policy.decide(env.now()) {
            ConnectDecision::Defer(remaining) => assert_eq!(remaining, BREAKER_OPEN_DURATION),
            ConnectDecision::AttemptAfter(_) => panic!("failed probe must reopen the breaker"),
        }
    }

    #[test]
    fn successful_probe_closes_the_breaker() {
        let env = ManualEnv::new();
        let mut policy = ReconnectPolicy::new();

        for _ in 0..BREAKER_FAILURE_THRESHOLD {
            policy.on_failure(env.now());
        }
        env.advance(BREAKER_OPEN_DURATION);
        let _ = attempt_delay(&mut policy, env.now());
        policy.on_success();

        assert_eq!(attempt_delay(&mut policy, env.now()), Duration::ZERO);
        assert_eq!(policy.consecutive_failures(), 0);
    }

    #[test]
    fn defer_counts_down_the_open_window() {
        let env = ManualEnv::new();
        let mut policy = ReconnectPolicy::new();

        for _ in 0..BREAKER_FAILURE_THRESHOLD {
            policy.on_failure(env.now());
        }
        env.advance(Duration::from_secs(12));

        match policy.decide(env.now()) {
            ConnectDecision::Defer(remaining) => {
                assert_eq!(remaining, BREAKER_OPEN_DURATION - Duration::from_secs(12));
            },
            ConnectDecision::AttemptAfter(_) => panic!("still open"),
        }
    }
}
