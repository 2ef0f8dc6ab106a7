//! Robot process lifecycle.
//!
//! Construction order follows the dependency chain: safety core first (it
//! owns the actuator), then the dispatcher and composer that feed it, then
//! the link tasks, with the watchdog on its own thread before any socket
//! exists. Shutdown runs the other way: engage the latch, stop intake,
//! drain with a bounded deadline, exit.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};

use tetherlink_core::{
    CommandDispatcher, Environment, LinkMonitor, NodeConfig, SafetyCore, SystemEnv,
    TelemetryComposer,
    constants::{DRAIN_DEADLINE, STATUS_INTERVAL},
    sockets,
};

use crate::{control, peripherals::Peripherals, telemetry_link, video_link, watchdog};

/// Attempts before a listener bind failure becomes fatal.
const BIND_RETRIES: u32 = 5;

/// Robot-side process coordinator.
#[derive(Debug)]
pub struct RobotCoordinator {
    config: NodeConfig,
}

impl RobotCoordinator {
    /// Coordinator for a validated configuration.
    #[must_use]
    pub fn new(config: NodeConfig) -> Self {
        Self { config }
    }

    /// Run the robot node until `shutdown` flips.
    ///
    /// # Errors
    ///
    /// - [`std::io::Error`] if the control listener cannot bind after
    ///   retries (fatal, nonzero exit). Link losses at runtime never error;
    ///   they reconnect.
    pub async fn run(
        self,
        peripherals: Peripherals,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), std::io::Error> {
        let env = SystemEnv::new();

        let safety = Arc::new(SafetyCore::new(env, peripherals.actuator));
        let dispatcher = Arc::new(CommandDispatcher::new(env, Arc::clone(&safety)));
        let composer = Arc::new(TelemetryComposer::new(
            env,
            Arc::clone(&safety),
            Arc::clone(&dispatcher),
            peripherals.sensors,
        ));
        let video_source = Arc::new(tokio::sync::Mutex::new(peripherals.video));

        let control_monitor = Arc::new(LinkMonitor::new("control"));
        let telemetry_monitor = Arc::new(LinkMonitor::new("telemetry"));
        let video_monitor = Arc::new(LinkMonitor::new("video"));

        // Watchdog first: the fail-safe property must hold before any
        // socket is live.
        let watchdog_thread = watchdog::spawn_watchdog_thread(Arc::clone(&safety), shutdown.clone())?;

        let listen_addr = std::net::SocketAddr::new(
            std::net::Ipv4Addr::UNSPECIFIED.into(),
            self.config.control_port,
        );
        let listener = sockets::bind_with_retries(&env, listen_addr, BIND_RETRIES).await?;
        tracing::info!(%listen_addr, "control listener bound");

        let (telemetry_tx, telemetry_rx) = mpsc::channel(1);

        let mut tasks = Vec::new();
        tasks.push(tokio::spawn(control::run_control_server(
            env,
            Arc::clone(&safety),
            Arc::clone(&dispatcher),
            Arc::clone(&control_monitor),
            Arc::clone(&self.config.psk),
            listener,
            shutdown.clone(),
        )));
        tasks.push(tokio::spawn(telemetry_link::run_composer_timer(
            env,
            Arc::clone(&composer),
            Arc::clone(&telemetry_monitor),
            telemetry_tx,
            self.config.telemetry_interval,
            shutdown.clone(),
        )));
        tasks.push(tokio::spawn(telemetry_link::run_telemetry_client(
            env,
            self.config.telemetry_addr(),
            Arc::clone(&self.config.psk),
            Arc::clone(&telemetry_monitor),
            telemetry_rx,
            shutdown.clone(),
        )));
        tasks.push(tokio::spawn(video_link::run_video_sender(
            env,
            self.config.video_addr(),
            video_source,
            Arc::clone(&video_monitor),
            shutdown.clone(),
        )));
        tasks.push(tokio::spawn(run_status(
            env,
            Arc::clone(&safety),
            Arc::clone(&dispatcher),
            [
                Arc::clone(&control_monitor),
                Arc::clone(&telemetry_monitor),
                Arc::clone(&video_monitor),
            ],
            shutdown.clone(),
        )));

        // Park until shutdown. A changed() error means every sender is
        // gone, which is shutdown too.
        let _ = shutdown.changed().await;

        tracing::info!("shutting down");
        safety.shutdown();
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

        let _ = watchdog_thread.join();
        Ok(())
    }
}

/// Periodic structured status snapshot.
async fn run_status<E>(
    env: E,
    safety: Arc<SafetyCore<E>>,
    dispatcher: Arc<CommandDispatcher<E>>,
    monitors: [Arc<LinkMonitor>; 3],
    mut shutdown: watch::Receiver<bool>,
) where
    E: Environment,
{
    loop {
        tokio::select! {
            _ = shutdown.changed() => return,
            () = env.sleep(STATUS_INTERVAL) => {},
        }

        let snapshot = safety.snapshot(env.now());
        let [control, telemetry, video] = [&monitors[0], &monitors[1], &monitors[2]];
        let (_, rtt_ms) = dispatcher.latest_echo();

        tracing::info!(
            event = "status",
            engaged = snapshot.engaged,
            reason = %snapshot.reason,
            control_established = snapshot.control_established,
            control_age_ms = snapshot.control_age.as_millis() as u64,
            gated_out = snapshot.gated_out,
            rtt_ms,
            control_state = control.state().as_str(),
            telemetry_state = telemetry.state().as_str(),
            video_state = video.state().as_str(),
            telemetry_sent = telemetry.counters().frames_sent,
            video_sent = video.counters().frames_sent,
            video_dropped = video.counters().frames_dropped,
            unknown_commands = dispatcher.unknown_count(),
        );
    }
}
