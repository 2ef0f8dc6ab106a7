//! Watchdog driver.
//!
//! The watchdog must fire within one tick of the control-freshness deadline
//! even if every socket task is wedged in I/O. In production it therefore
//! runs on its own OS thread with its own single-threaded runtime: no
//! shared executor, no shared worker pool, nothing to starve it.
//!
//! The async loop itself is exported separately so the simulation harness
//! can drive it on virtual time.

use std::sync::Arc;

use tokio::sync::watch;

use tetherlink_core::{Environment, SafetyCore, SystemEnv, constants::WATCHDOG_TICK};

/// Tick loop: calls [`SafetyCore::tick`] once per [`WATCHDOG_TICK`].
///
/// Holds no I/O and takes no lock other than the safety core's own.
pub async fn run_watchdog<E>(env: E, safety: Arc<SafetyCore<E>>, mut shutdown: watch::Receiver<bool>)
where
    E: Environment,
{
    loop {
        tokio::select! {
            _ = shutdown.changed() => return,
            () = env.sleep(WATCHDOG_TICK) => {},
        }

        safety.tick(env.now());
    }
}

/// Spawn the watchdog on a dedicated OS thread.
///
/// The thread owns a current-thread runtime so its timer cannot be starved
/// by the main runtime's workers, whatever they are blocked on.
pub fn spawn_watchdog_thread(
    safety: Arc<SafetyCore<SystemEnv>>,
    shutdown: watch::Receiver<bool>,
) -> std::io::Result<std::thread::JoinHandle<()>> {
    std::thread::Builder::new().name("watchdog".to_string()).spawn(move || {
        let runtime = match tokio::runtime::Builder::new_current_thread().enable_time().build() {
            Ok(runtime) => runtime,
            Err(error) => {
                // Without a watchdog the fail-safe property is gone; latch
                // now and leave the latch in place.
                tracing::error!(%error, "watchdog runtime failed to start");
                safety.engage(tetherlink_core::EstopReason::WatchdogTimeout);
                return;
            },
        };

        runtime.block_on(run_watchdog(SystemEnv::new(), safety, shutdown));
    })
}
