//! Control channel server.
//!
//! The robot owns the command ingress endpoint: it listens, the operator
//! station connects in. Loss of the operator therefore never requires the
//! robot to dial out, and at most one control connection exists at a time:
//! a newly accepted connection supersedes the old one, which is closed
//! before the fresh receive state takes over.
//!
//! Failure policy on this channel is absolute: disconnects, oversized
//! frames, authentication failures, replays, and decode errors all close
//! the socket AND engage E-STOP with the specific reason. Nothing after a
//! failed verification is processed.

use std::sync::Arc;

use tokio::io::AsyncRead;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use tetherlink_core::{
    CommandDispatcher, Environment, EstopReason, KeepaliveConfig, LinkMonitor, LinkState,
    SafetyCore,
    constants::{CONTROL_READ_TIMEOUT, STATUS_INTERVAL},
};
use tetherlink_core::sockets;
use tetherlink_proto::{FrameError, FrameReader, FrameReceiver, Psk};

/// Why a control connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEnd {
    /// Shutdown signal observed; no E-STOP action here.
    Shutdown,
    /// The peer failed (disconnect or protocol violation); E-STOP engaged.
    PeerFailed,
}

/// E-STOP reason and log event for a control-channel failure.
fn classify_failure(error: &FrameError) -> (EstopReason, &'static str) {
    match error {
        FrameError::FrameTooLarge { .. } => (EstopReason::BufferOverflow, "buffer_overflow"),
        FrameError::AuthFailure => (EstopReason::AuthFailure, "auth_failure"),
        FrameError::Replay { .. } => (EstopReason::AuthFailure, "replay"),
        FrameError::Decode { .. } | FrameError::Truncated { .. } => {
            (EstopReason::DecodeError, "decode_error")
        },
        FrameError::Io(_) => (EstopReason::Disconnect, "disconnect"),
    }
}

/// Serve one accepted control connection until it fails or shutdown.
///
/// Generic over the byte stream so the simulation harness can drive it over
/// `turmoil::net`. Each connection gets a fresh [`FrameReceiver`], which is
/// what resets receive-side sequence state on a new accept.
///
/// Read attempts are bounded by [`CONTROL_READ_TIMEOUT`]; an idle timeout
/// is not an error (frame freshness belongs to the watchdog), it only
/// bounds the loop so periodic status still gets logged.
pub async fn run_control_connection<E, S>(
    env: E,
    safety: Arc<SafetyCore<E>>,
    dispatcher: Arc<CommandDispatcher<E>>,
    monitor: Arc<LinkMonitor>,
    psk: Arc<Psk>,
    mut stream: S,
    mut shutdown: watch::Receiver<bool>,
) -> ConnectionEnd
where
    E: Environment,
    S: AsyncRead + Unpin + Send,
{
    let mut receiver = FrameReceiver::new(psk);
    let mut reader = FrameReader::new();
    let mut last_status = env.now();

    loop {
        let read_attempt = tokio::select! {
            _ = shutdown.changed() => return ConnectionEnd::Shutdown,
            attempt = tokio::time::timeout(CONTROL_READ_TIMEOUT, reader.next_frame(&mut stream)) => attempt,
        };

        if env.now() - last_status > STATUS_INTERVAL {
            last_status = env.now();
            tracing::info!(
                event = "status",
                link = "control",
                frames_received = monitor.counters().frames_received,
                last_accepted_seq = receiver.last_accepted_seq(),
            );
        }

        let wire = match read_attempt {
            // Idle: no frame within the read bound. Not a failure.
            Err(_elapsed) => continue,
            Ok(Ok(wire)) => wire,
            Ok(Err(error)) => {
                return fail_connection(&safety, &monitor, &error);
            },
        };

        let payload = match receiver.verify(&wire) {
            Ok((seq, payload)) => {
                tracing::trace!(seq, len = payload.len(), "control frame accepted");
                monitor.count_received();
                payload
            },
            Err(error) => {
                return fail_connection(&safety, &monitor, &error);
            },
        };

        if let Err(error) = dispatcher.dispatch(&payload) {
            return fail_connection(&safety, &monitor, &error);
        }
    }
}

fn fail_connection<E: Environment>(
    safety: &SafetyCore<E>,
    monitor: &LinkMonitor,
    error: &FrameError,
) -> ConnectionEnd {
    let (reason, event) = classify_failure(error);
    tracing::warn!(event, %error, "control connection failed, engaging estop");
    safety.engage(reason);
    monitor.set_state(LinkState::Disconnected);
    ConnectionEnd::PeerFailed
}

/// Accept loop on the robot's control port.
///
/// At most one connection is live; a new accept closes the old connection
/// first. Shutdown is observed immediately through the watch channel, and
/// acceptance failures back off by one poll interval rather than spinning.
pub async fn run_control_server<E>(
    env: E,
    safety: Arc<SafetyCore<E>>,
    dispatcher: Arc<CommandDispatcher<E>>,
    monitor: Arc<LinkMonitor>,
    psk: Arc<Psk>,
    listener: tokio::net::TcpListener,
    mut shutdown: watch::Receiver<bool>,
) where
    E: Environment,
{
    let mut active: Option<JoinHandle<ConnectionEnd>> = None;

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        if let Some(previous) = active.take() {
                            tracing::info!(%peer, "new control connection supersedes the old one");
                            previous.abort();
                        }

                        if let Err(error) = sockets::apply_keepalive(&stream, KeepaliveConfig::default()) {
                            tracing::warn!(%error, "could not apply keepalive");
                        }

                        tracing::info!(%peer, "control connection accepted");
                        monitor.set_state(LinkState::Established);

                        active = Some(tokio::spawn(run_control_connection(
                            env.clone(),
                            Arc::clone(&safety),
                            Arc::clone(&dispatcher),
                            Arc::clone(&monitor),
                            Arc::clone(&psk),
                            stream,
                            shutdown.clone(),
                        )));
                    },
                    Err(error) => {
                        tracing::warn!(%error, "control accept failed");
                        env.sleep(tetherlink_core::constants::ACCEPT_POLL_INTERVAL).await;
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
