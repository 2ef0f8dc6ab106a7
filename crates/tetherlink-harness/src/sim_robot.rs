//! Robot stack wired to turmoil's simulated network.
//!
//! Builds the real safety core, dispatcher, and control connection handler
//! and serves them over `turmoil::net`. The handles are published through a
//! shared slot so the simulated operator can assert on robot-side state:
//! turmoil hosts run in one process, so an `Arc` crosses the "network".

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;

use tetherlink_core::sim::SimActuator;
use tetherlink_core::{CommandDispatcher, LinkMonitor, LinkState, SafetyCore};
use tetherlink_proto::Psk;
use tetherlink_robot::control::run_control_connection;
use tetherlink_robot::watchdog::run_watchdog;

use crate::sim_env::SimEnv;

/// PSK shared by every simulation peer.
pub const SIM_PSK: [u8; 32] = [0x42; 32];

/// Robot-side state exposed to the simulated operator.
#[derive(Clone)]
pub struct RobotHandles {
    /// Virtual-clock environment the robot runs on.
    pub env: SimEnv,
    /// The latched safety core.
    pub safety: Arc<SafetyCore<SimEnv>>,
    /// Dispatcher (for echo inspection).
    pub dispatcher: Arc<CommandDispatcher<SimEnv>>,
    /// Actuation ledger.
    pub actuator: Arc<SimActuator>,
    /// Control link monitor.
    pub control_monitor: Arc<LinkMonitor>,
}

/// Handoff slot the host fills once its stack is built.
pub type RobotSlot = Arc<Mutex<Option<RobotHandles>>>;

/// Take the published handles; `None` until the host has booted.
///
/// Simulation clients call this after at least one sleep.
#[must_use]
pub fn handles(slot: &RobotSlot) -> Option<RobotHandles> {
    slot.lock().unwrap_or_else(PoisonError::into_inner).clone()
}

/// Serve the robot's control channel on `port`, with the watchdog running.
///
/// Connections are handled one at a time: each accepted connection gets the
/// real [`run_control_connection`] with a fresh receive state, exactly like
/// the production accept loop.
pub async fn serve_robot(slot: RobotSlot, port: u16) -> turmoil::Result {
    let env = SimEnv::new();
    let actuator = Arc::new(SimActuator::default());
    let safety = Arc::new(SafetyCore::new(env.clone(), Box::new(Arc::clone(&actuator))));
    let dispatcher = Arc::new(CommandDispatcher::new(env.clone(), Arc::clone(&safety)));
    let control_monitor = Arc::new(LinkMonitor::new("control"));

    let (_shutdown_guard, shutdown) = watch::channel(false);
    tokio::spawn(run_watchdog(env.clone(), Arc::clone(&safety), shutdown.clone()));

    *slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(RobotHandles {
        env: env.clone(),
        safety: Arc::clone(&safety),
        dispatcher: Arc::clone(&dispatcher),
        actuator,
        control_monitor: Arc::clone(&control_monitor),
    });

    let listener = turmoil::net::TcpListener::bind(("0.0.0.0", port)).await?;
    loop {
        let (stream, _peer) = listener.accept().await?;
        control_monitor.set_state(LinkState::Established);

        run_control_connection(
            env.clone(),
            Arc::clone(&safety),
            Arc::clone(&dispatcher),
            Arc::clone(&control_monitor),
            Arc::new(Psk::new(SIM_PSK)),
            stream,
            shutdown.clone(),
        )
        .await;
    }
}

/// Keep `psk` naming symmetric for operator-side senders.
#[must_use]
pub fn sim_psk() -> Arc<Psk> {
    Arc::new(Psk::new(SIM_PSK))
}
