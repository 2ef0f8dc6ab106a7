//! Control channel client.
//!
//! Dials the robot's command ingress and multiplexes two producers onto the
//! authenticated stream: operator commands from the [`CommandSink`] and the
//! 1 Hz heartbeat ping. The heartbeat doubles as the watchdog feed: while
//! this loop is healthy, the robot sees control traffic at least once a
//! second, well inside its 5 s freshness deadline.
//!
//! Any send failure drops the connection; reconnection follows the shared
//! backoff/breaker policy and resets the send-side sequence for the robot's
//! fresh receive state.

use std::sync::Arc;

use tokio::io::AsyncWrite;
use tokio::sync::{mpsc, watch};

use tetherlink_core::{
    Environment, KeepaliveConfig, LinkMonitor, LinkState,
    constants::{CONNECT_TIMEOUT, HEARTBEAT_INTERVAL, SEND_TIMEOUT},
    policy::{ConnectDecision, ReconnectPolicy},
    sockets,
};
use tetherlink_proto::{ControlCommand, FrameSender, Psk, io::write_frame};

use crate::rtt::RttTracker;

/// Handle through which the operator UI submits commands.
///
/// Cloneable; the UI collaborator holds one, the binary keeps one alive.
#[derive(Debug, Clone)]
pub struct CommandSink {
    tx: mpsc::Sender<ControlCommand>,
}

impl CommandSink {
    /// Create a sink and its consuming end.
    #[must_use]
    pub fn new() -> (Self, mpsc::Receiver<ControlCommand>) {
        // Shallow on purpose: a stale queued command is worse than telling
        // the operator the link is congested.
        let (tx, rx) = mpsc::channel(8);
        (Self { tx }, rx)
    }

    /// Queue a command for sending.
    ///
    /// # Errors
    ///
    /// - The command back if the client is gone or the queue is full.
    pub fn submit(&self, command: ControlCommand) -> Result<(), ControlCommand> {
        self.tx.try_send(command).map_err(|rejected| match rejected {
            mpsc::error::TrySendError::Full(command)
            | mpsc::error::TrySendError::Closed(command) => command,
        })
    }
}

/// Drive one established control connection until it fails or shutdown.
pub async fn run_control_connection<E, S>(
    mut stream: S,
    sender: &FrameSender,
    monitor: &LinkMonitor,
    rx: &mut mpsc::Receiver<ControlCommand>,
    rtt: &RttTracker<E>,
    ping_seq: &mut u64,
    shutdown: &mut watch::Receiver<bool>,
) where
    E: Environment,
    S: AsyncWrite + Unpin + Send,
{
    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        let command = tokio::select! {
            _ = shutdown.changed() => return,
            received = rx.recv() => match received {
                Some(command) => command,
                None => return,
            },
            _ = heartbeat.tick() => {
                let seq = *ping_seq;
                *ping_seq += 1;
                ControlCommand::Ping { ts: rtt.now_secs(), seq, rtt_ms: rtt.last_rtt_ms() }
            },
        };

        let payload = match command.encode() {
            Ok(payload) => payload,
            Err(error) => {
                tracing::error!(%error, "command failed to encode, dropped");
                continue;
            },
        };

        let wire = match sender.build(payload) {
            Ok(wire) => wire,
            Err(error) => {
                tracing::error!(%error, "control frame build failed, dropped");
                continue;
            },
        };

        match tokio::time::timeout(SEND_TIMEOUT, write_frame(&mut stream, &wire)).await {
            Ok(Ok(())) => monitor.count_sent(),
            Ok(Err(error)) => {
                tracing::warn!(event = "disconnect", link = "control", %error);
                return;
            },
            Err(_elapsed) => {
                tracing::warn!(event = "disconnect", link = "control", "send timed out");
                return;
            },
        }
    }
}

/// Control client: connect on the backoff schedule, run the connection,
/// repeat. Never gives up while the process lives.
pub async fn run_control_client<E>(
    env: E,
    addr: std::net::SocketAddr,
    psk: Arc<Psk>,
    monitor: Arc<LinkMonitor>,
    mut rx: mpsc::Receiver<ControlCommand>,
    rtt: Arc<RttTracker<E>>,
    mut shutdown: watch::Receiver<bool>,
) where
    E: Environment,
{
    let sender = FrameSender::new(psk);
    let mut policy = ReconnectPolicy::new();
    let mut ping_seq: u64 = 0;

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
                tracing::debug!(%error, "control connect failed");
                policy.on_failure(env.now());
                monitor.set_state(LinkState::Disconnected);
                continue;
            },
            Err(_elapsed) => {
                tracing::debug!("control connect timed out");
                policy.on_failure(env.now());
                monitor.set_state(LinkState::Disconnected);
                continue;
            },
        };

        if let Err(error) = sockets::apply_keepalive(&stream, KeepaliveConfig::default()) {
            tracing::warn!(%error, "could not apply keepalive");
        }

        policy.on_success();
        sender.reset();
        monitor.set_state(LinkState::Established);
        tracing::info!(link = "control", %addr, "connected");

        run_control_connection(
            stream,
            &sender,
            &monitor,
            &mut rx,
            &rtt,
            &mut ping_seq,
            &mut shutdown,
        )
        .await;

        monitor.set_state(LinkState::Disconnected);
        policy.on_failure(env.now());
    }

    monitor.set_state(LinkState::Disconnected);
}
