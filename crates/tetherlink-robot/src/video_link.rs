//! Video channel sender.
//!
//! Best-effort JPEG relay: acquire the latest frame from the source, write
//! it with a hard send bound, and when the link cannot keep up, drop frames
//! instead of queueing. Back-pressure on video is absorbed here and only
//! here; nothing in this module can block a safety-critical path, and
//! nothing here references the safety core at all.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{Mutex, watch};

use tetherlink_core::{
    Environment, LinkMonitor, LinkState, VideoSource,
    constants::{CONNECT_TIMEOUT, SEND_TIMEOUT},
    policy::{ConnectDecision, ReconnectPolicy},
};

/// Pacing of source polls; roughly 30 fps when frames are available.
pub const FRAME_POLL_INTERVAL: Duration = Duration::from_millis(33);

/// Stream frames over one established connection until it fails.
///
/// A send that exceeds [`SEND_TIMEOUT`] drops the frame and counts it; the
/// connection itself survives (the receiver resynchronizes at the next SOI
/// marker). A stream error ends the connection.
pub async fn run_video_connection<S>(
    mut stream: S,
    source: Arc<Mutex<Box<dyn VideoSource>>>,
    monitor: &LinkMonitor,
    shutdown: &mut watch::Receiver<bool>,
) where
    S: AsyncWrite + Unpin + Send,
{
    loop {
        tokio::select! {
            _ = shutdown.changed() => return,
            () = tokio::time::sleep(FRAME_POLL_INTERVAL) => {},
        }

        let Some(frame) = source.lock().await.latest_jpeg() else {
            continue;
        };

        match tokio::time::timeout(SEND_TIMEOUT, stream.write_all(&frame)).await {
            Ok(Ok(())) => monitor.count_sent(),
            Ok(Err(error)) => {
                tracing::info!(event = "disconnect", link = "video", %error);
                return;
            },
            Err(_elapsed) => {
                // Dropped, not queued. The receiver sees a truncated frame
                // and resyncs; we move on to the next fresh frame.
                monitor.count_dropped();
                tracing::debug!(
                    frames_dropped = monitor.counters().frames_dropped,
                    "video send timed out, frame dropped"
                );
            },
        }
    }
}

/// Video client: dial the base on the shared backoff schedule and stream
/// until the connection fails.
pub async fn run_video_sender<E>(
    env: E,
    addr: std::net::SocketAddr,
    source: Arc<Mutex<Box<dyn VideoSource>>>,
    monitor: Arc<LinkMonitor>,
    mut shutdown: watch::Receiver<bool>,
) where
    E: Environment,
{
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
                tracing::debug!(%error, "video connect failed");
                policy.on_failure(env.now());
                monitor.set_state(LinkState::Disconnected);
                continue;
            },
            Err(_elapsed) => {
                policy.on_failure(env.now());
                monitor.set_state(LinkState::Disconnected);
                continue;
            },
        };

        policy.on_success();
        monitor.set_state(LinkState::Established);
        tracing::info!(link = "video", %addr, "connected");

        run_video_connection(stream, Arc::clone(&source), &monitor, &mut shutdown).await;

        monitor.set_state(LinkState::Disconnected);
        policy.on_failure(env.now());
    }

    monitor.set_state(LinkState::Disconnected);
}
