//! Base process lifecycle.
//!
//! Construction order: RTT tracker and telemetry store first (pure state),
//! then the two listeners, then the link tasks. The base holds no safety
//! state; its job at the top level is the operator's health picture,
//! emitted at 1 Hz from whatever the links last reported.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};

use tetherlink_core::{
    Environment, LinkMonitor, NodeConfig, SystemEnv, VideoSink,
    constants::{DRAIN_DEADLINE, HEARTBEAT_INTERVAL},
    sockets,
};
use tetherlink_proto::ControlCommand;

use crate::{
    control::{self, CommandSink},
    rtt::RttTracker,
    telemetry_srv::{self, TelemetryStore},
    video_rx,
};

/// Attempts before a listener bind failure becomes fatal.
const BIND_RETRIES: u32 = 5;

/// Base-side process coordinator.
pub struct BaseCoordinator {
    config: NodeConfig,
    command_rx: mpsc::Receiver<ControlCommand>,
}

impl BaseCoordinator {
    /// Coordinator plus the [`CommandSink`] the operator UI submits through.
    #[must_use]
    pub fn new(config: NodeConfig) -> (Self, CommandSink) {
        let (sink, command_rx) = CommandSink::new();
        (Self { config, command_rx }, sink)
    }

    /// Run the base node until `shutdown` flips.
    ///
    /// # Errors
    ///
    /// - [`std::io::Error`] if a listener cannot bind after retries (fatal,
    ///   nonzero exit)
    pub async fn run(
        self,
        video_sink: Box<dyn VideoSink>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), std::io::Error> {
        let env = SystemEnv::new();

        let rtt = Arc::new(RttTracker::new(env));
        let store = Arc::new(TelemetryStore::new());
        let video_sink = Arc::new(tokio::sync::Mutex::new(video_sink));

        let control_monitor = Arc::new(LinkMonitor::new("control"));
        let telemetry_monitor = Arc::new(LinkMonitor::new("telemetry"));
        let video_monitor = Arc::new(LinkMonitor::new("video"));

        let telemetry_listener = sockets::bind_with_retries(
            &env,
            (std::net::Ipv4Addr::UNSPECIFIED, self.config.telemetry_port).into(),
            BIND_RETRIES,
        )
        .await?;
        let video_listener = sockets::bind_with_retries(
            &env,
            (std::net::Ipv4Addr::UNSPECIFIED, self.config.video_port).into(),
            BIND_RETRIES,
        )
        .await?;
        tracing::info!(
            telemetry_port = self.config.telemetry_port,
            video_port = self.config.video_port,
            video_http_port = self.config.video_http_port,
            "listeners bound"
        );

        let mut tasks = Vec::new();
        tasks.push(tokio::spawn(control::run_control_client(
            env,
            self.config.control_addr(),
            Arc::clone(&self.config.psk),
            Arc::clone(&control_monitor),
            self.command_rx,
            Arc::clone(&rtt),
            shutdown.clone(),
        )));
        tasks.push(tokio::spawn(telemetry_srv::run_telemetry_server(
            env,
            Arc::clone(&store),
            Arc::clone(&rtt),
            Arc::clone(&telemetry_monitor),
            Arc::clone(&self.config.psk),
            telemetry_listener,
            shutdown.clone(),
        )));
        tasks.push(tokio::spawn(video_rx::run_video_server(
            env,
            video_sink,
            Arc::clone(&video_monitor),
            video_listener,
            shutdown.clone(),
        )));
        tasks.push(tokio::spawn(run_health(
            env,
            Arc::clone(&store),
            Arc::clone(&rtt),
            [
                Arc::clone(&control_monitor),
                Arc::clone(&telemetry_monitor),
                Arc::clone(&video_monitor),
            ],
            shutdown.clone(),
        )));

        let _ = shutdown.changed().await;

        tracing::info!("shutting down");
        for monitor in [&control_monitor, &telemetry_monitor, &video_monitor] {
            monitor.set_state(tetherlink_core::LinkState::Draining);
        }
        let drain = async {
            for task in tasks {
                let _ = task.await;
            }
        };
        if tokio::time::timeout(DRAIN_DEADLINE, drain).await.is_err() {
            tracing::warn!("drain deadline exceeded, exiting hard");
        }

        Ok(())
    }
}

/// Operator-facing health block, once per second.
async fn run_health<E>(
    env: E,
    store: Arc<TelemetryStore>,
    rtt: Arc<RttTracker<E>>,
    monitors: [Arc<LinkMonitor>; 3],
    mut shutdown: watch::Receiver<bool>,
) where
    E: Environment,
{
    loop {
        tokio::select! {
            _ = shutdown.changed() => return,
            () = env.sleep(HEARTBEAT_INTERVAL) => {},
        }

        let latest = store.latest();
        let [control, telemetry, video] = [&monitors[0], &monitors[1], &monitors[2]];

        tracing::info!(
            event = "status",
            control_state = control.state().as_str(),
            telemetry_state = telemetry.state().as_str(),
            video_state = video.state().as_str(),
            engaged = latest.as_ref().map(|t| t.estop.engaged),
            reason = latest.as_ref().map(|t| t.estop.reason.as_str()),
            control_age_ms = latest.as_ref().map(|t| t.control_age_ms),
            battery_v = latest.as_ref().map(|t| t.battery_v),
            rtt_ms = rtt.last_rtt_ms(),
            commands_sent = control.counters().frames_sent,
            telemetry_received = telemetry.counters().frames_received,
            video_frames = video.counters().frames_received,
            video_resyncs = video.counters().resyncs,
        );
    }
}
