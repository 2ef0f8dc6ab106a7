//! Video channel receiver.
//!
//! Accepts the robot's unauthenticated JPEG stream, reassembles frames with
//! the bounded [`JpegAssembler`], and hands complete frames to the
//! [`VideoSink`] collaborator (the HTTP republisher, outside this crate).
//! Overflow resyncs are counted into the link monitor for the health block.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::{Mutex, watch};

use tetherlink_core::{
    Environment, JpegAssembler, LinkMonitor, LinkState, VideoSink,
    constants::ACCEPT_POLL_INTERVAL,
};

/// Read chunk size; small enough that the assembler's bound dominates.
const READ_CHUNK: usize = 16 * 1024;

/// Consume one accepted video connection until it ends.
pub async fn run_video_connection<S>(
    mut stream: S,
    sink: Arc<Mutex<Box<dyn VideoSink>>>,
    monitor: Arc<LinkMonitor>,
    mut shutdown: watch::Receiver<bool>,
) where
    S: AsyncRead + Unpin + Send,
{
    let mut assembler = JpegAssembler::new();
    let mut chunk = vec![0u8; READ_CHUNK];
    let mut reported_resyncs = 0u64;

    loop {
        let read = tokio::select! {
            _ = shutdown.changed() => return,
            read = stream.read(&mut chunk) => read,
        };

        let n = match read {
            Ok(0) => {
                tracing::info!(event = "disconnect", link = "video", "stream ended");
                return;
            },
            Ok(n) => n,
            Err(error) => {
                tracing::info!(event = "disconnect", link = "video", %error);
                return;
            },
        };

        let frames = assembler.push(&chunk[..n]);

        while reported_resyncs < assembler.resyncs() {
            reported_resyncs += 1;
            monitor.count_resync();
        }

        if !frames.is_empty() {
            let mut sink = sink.lock().await;
            for frame in frames {
                monitor.count_received();
                sink.push_jpeg(frame);
            }
        }
    }
}

/// Accept loop on the base's video port; one connection at a time.
pub async fn run_video_server<E>(
    env: E,
    sink: Arc<Mutex<Box<dyn VideoSink>>>,
    monitor: Arc<LinkMonitor>,
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
                            previous.abort();
                        }

                        tracing::info!(%peer, "video connection accepted");
                        monitor.set_state(LinkState::Established);

                        active = Some(tokio::spawn(run_video_connection(
                            stream,
                            Arc::clone(&sink),
                            Arc::clone(&monitor),
                            shutdown.clone(),
                        )));
                    },
                    Err(error) => {
                        tracing::warn!(%error, "video accept failed");
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
