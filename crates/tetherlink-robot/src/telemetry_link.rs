//! Telemetry channel client and composition timer.
//!
//! Two units of work: the composition timer samples and composes at the
//! configured cadence, and the client task owns the socket. They meet at a
//! depth-one channel; when the link is down or slow, composed records are
//! dropped on the floor. Telemetry is fresh or it is nothing; a backlog
//! replay would show the operator stale numbers as if they were live.
//!
//! Telemetry failures never touch the safety core: the robot has local
//! senses, and only *control* staleness is a reason to stop.

use std::sync::Arc;

use tokio::io::AsyncWrite;
use tokio::sync::{mpsc, watch};

use tetherlink_core::{
    Environment, LinkMonitor, LinkState, TelemetryComposer,
    constants::{CONNECT_TIMEOUT, SEND_TIMEOUT},
    policy::{ConnectDecision, ReconnectPolicy},
};
use tetherlink_proto::{FrameSender, Psk, Telemetry, io::write_frame};

/// Composition timer: one record per tick, fresh or nothing.
///
/// A missed tick is tolerated and never caught up; the interval timer skips
/// rather than bursting.
pub async fn run_composer_timer<E>(
    _env: E,
    composer: Arc<TelemetryComposer<E>>,
    monitor: Arc<LinkMonitor>,
    tx: mpsc::Sender<Telemetry>,
    interval: std::time::Duration,
    mut shutdown: watch::Receiver<bool>,
) where
    E: Environment,
{
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.changed() => return,
            _ = ticker.tick() => {},
        }

        if !monitor.is_established() {
            // Composed-and-discarded is indistinguishable from not composed;
            // skip the sensor work entirely while the link is down.
            continue;
        }

        match composer.compose() {
            Ok(record) => {
                if tx.try_send(record).is_err() {
                    // Send path is behind; this tick's record is stale by
                    // the time it would go out.
                    monitor.count_dropped();
                }
            },
            Err(error) => {
                tracing::warn!(%error, "sensor sample failed, skipping telemetry tick");
            },
        }
    }
}

/// Send composed records over one established connection.
///
/// Returns when the stream fails or shutdown is observed. Generic over the
/// stream for the simulation harness.
pub async fn run_telemetry_connection<S>(
    mut stream: S,
    sender: &FrameSender,
    monitor: &LinkMonitor,
    rx: &mut mpsc::Receiver<Telemetry>,
    shutdown: &mut watch::Receiver<bool>,
) where
    S: AsyncWrite + Unpin + Send,
{
    loop {
        let record = tokio::select! {
            _ = shutdown.changed() => return,
            received = rx.recv() => match received {
                Some(record) => record,
                None => return,
            },
        };

        let payload = match record.encode() {
            Ok(payload) => payload,
            Err(error) => {
                tracing::error!(%error, "telemetry record failed to encode");
                continue;
            },
        };

        let wire = match sender.build(payload) {
            Ok(wire) => wire,
            Err(error) => {
                tracing::error!(%error, "telemetry frame build failed");
                continue;
            },
        };

        match tokio::time::timeout(SEND_TIMEOUT, write_frame(&mut stream, &wire)).await {
            Ok(Ok(())) => monitor.count_sent(),
            Ok(Err(error)) => {
                tracing::info!(event = "disconnect", link = "telemetry", %error);
                return;
            },
            Err(_elapsed) => {
                tracing::info!(event = "disconnect", link = "telemetry", "send timed out");
                return;
            },
        }
    }
}

/// Telemetry client: dial the base on the backoff schedule, send until the
/// connection fails, reset the send sequence, repeat.
pub async fn run_telemetry_client<E>(
    env: E,
    addr: std::net::SocketAddr,
    psk: Arc<Psk>,
    monitor: Arc<LinkMonitor>,
    mut rx: mpsc::Receiver<Telemetry>,
    mut shutdown: watch::Receiver<bool>,
) where
    E: Environment,
{
    let sender = FrameSender::new(psk);
    let mut policy = ReconnectPolicy::new();

    loop {
        if *shutdown.borrow() {
            break;
        }

        let delay = match policy.decide(env.now()) {
            ConnectDecision::AttemptAfter(delay) | ConnectDecision::Defer(delay) => delay,
        };
        if !delay.is_zero() {
            tokio::select! {
                _ = shutdown.changed() => break,
                () = env.sleep(delay) => {},
            }
            if matches!(policy.decide(env.now()), ConnectDecision::Defer(_)) {
                continue;
            }
        }

        monitor.set_state(LinkState::Connecting);
        let connected =
            tokio::time::timeout(CONNECT_TIMEOUT, tokio::net::TcpStream::connect(addr)).await;

        let stream = match connected {
            Ok(Ok(stream)) => stream,
            Ok(Err(error)) => {
                tracing::debug!(%error, "telemetry connect failed");
                policy.on_failure(env.now());
                monitor.set_state(LinkState::Disconnected);
                continue;
            },
            Err(_elapsed) => {
                tracing::debug!("telemetry connect timed out");
                policy.on_failure(env.now());
                monitor.set_state(LinkState::Disconnected);
                continue;
            },
        };

        policy.on_success();
        // Fresh connection: the base's receive state starts over, so the
        // send sequence does too.
        sender.reset();
        monitor.set_state(LinkState::Established);
        tracing::info!(link = "telemetry", %addr, "connected");

        run_telemetry_connection(stream, &sender, &monitor, &mut rx, &mut shutdown).await;

        monitor.set_state(LinkState::Disconnected);
        policy.on_failure(env.now());
    }

    monitor.set_state(LinkState::Disconnected);
}
