//! Telemetry channel server.
//!
//! Mirror of the robot's control server role: the base listens, the robot
//! dials in, one connection at a time. Authentication matters here even
//! though nothing actuates: a spoofed peer must not be able to paint the
//! operator a healthy picture of a robot that is not.
//!
//! Failures on this channel never cascade: a lost or misbehaving telemetry
//! connection is closed and re-accepted, surfaced to the coordinator's
//! health block, and that is all. The base never mutates robot safety
//! state; if a deployment wants telemetry loss to stop the robot, the path
//! is to drop the control connection and let the robot's own watchdog act.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::io::AsyncRead;
use tokio::sync::watch;

use tetherlink_core::{
    Environment, LinkMonitor, LinkState,
    constants::{ACCEPT_POLL_INTERVAL, CONTROL_READ_TIMEOUT, STATUS_INTERVAL},
};
use tetherlink_proto::{FrameReader, FrameReceiver, Psk, Telemetry};

use crate::rtt::RttTracker;

/// Latest accepted telemetry record, shared with the health emission.
#[derive(Debug, Default)]
pub struct TelemetryStore {
    latest: Mutex<Option<Telemetry>>,
}

impl TelemetryStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the latest record.
    pub fn update(&self, record: Telemetry) {
        *self.latest.lock().unwrap_or_else(PoisonError::into_inner) = Some(record);
    }

    /// Most recent record, if any arrived yet.
    pub fn latest(&self) -> Option<Telemetry> {
        self.latest.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

/// Serve one accepted telemetry connection until it fails or shutdown.
///
/// Generic over the stream for the simulation harness. Each connection gets
/// a fresh [`FrameReceiver`]; the reconnecting robot restarts its sequence
/// from zero.
pub async fn run_telemetry_connection<E, S>(
    env: E,
    store: Arc<TelemetryStore>,
    rtt: Arc<RttTracker<E>>,
    monitor: Arc<LinkMonitor>,
    psk: Arc<Psk>,
    mut stream: S,
    mut shutdown: watch::Receiver<bool>,
) where
    E: Environment,
    S: AsyncRead + Unpin + Send,
{
    let mut receiver = FrameReceiver::new(psk);
    let mut reader = FrameReader::new();
    let mut last_status = env.now();

    loop {
        let read_attempt = tokio::select! {
            _ = shutdown.changed() => return,
            attempt = tokio::time::timeout(CONTROL_READ_TIMEOUT, reader.next_frame(&mut stream)) => attempt,
        };

        if env.now() - last_status > STATUS_INTERVAL {
            last_status = env.now();
            tracing::info!(
                event = "status",
                link = "telemetry",
                frames_received = monitor.counters().frames_received,
            );
        }

        let wire = match read_attempt {
            Err(_elapsed) => continue,
            Ok(Ok(wire)) => wire,
            Ok(Err(error)) => {
                tracing::info!(event = "disconnect", link = "telemetry", %error);
                return;
            },
        };

        let payload = match receiver.verify(&wire) {
            Ok((_, payload)) => payload,
            Err(error) => {
                // Close and re-accept; no safety action on this side.
                tracing::warn!(event = "auth_failure", link = "telemetry", %error);
                return;
            },
        };

        match Telemetry::decode(&payload) {
            Ok(record) => {
                monitor.count_received();
                if let Some(pong) = &record.pong {
                    rtt.note_pong(pong);
                }
                store.update(record);
            },
            Err(error) => {
                tracing::warn!(link = "telemetry", %error, "telemetry decode failed");
                return;
            },
        }
    }
}

/// Accept loop on the base's telemetry port; one connection at a time, a
/// new accept supersedes the old.
pub async fn run_telemetry_server<E>(
    env: E,
    store: Arc<TelemetryStore>,
    rtt: Arc<RttTracker<E>>,
    monitor: Arc<LinkMonitor>,
    psk: Arc<Psk>,
    listener: tokio::net::TcpListener,
    mut shutdown: watch::Receiver<bool>,
) where
    E: Environment,
{
    let mut active: Option<tokio::task::JoinHandle<()>> = None;

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        if let Some(previous) = active.take() {
                            tracing::info!(%peer, "new telemetry connection supersedes the old one");
                            previous.abort();
                        }

                        tracing::info!(%peer, "telemetry connection accepted");
                        monitor.set_state(LinkState::Established);

                        let task_monitor = Arc::clone(&monitor);
                        active = Some(tokio::spawn(run_telemetry_connection(
                            env.clone(),
                            Arc::clone(&store),
                            Arc::clone(&rtt),
                            task_monitor,
                            Arc::clone(&psk),
                            stream,
                            shutdown.clone(),
                        )));
                    },
                    Err(error) => {
                        tracing::warn!(%error, "telemetry accept failed");
                        env.sleep(ACCEPT_POLL_INTERVAL).await;
                    },
                }
            },
        }
    }

    if let Some(handle) = active.take() {
        handle.abort();
    }
    monitor.set_state(LinkState::Disconnected);
}
