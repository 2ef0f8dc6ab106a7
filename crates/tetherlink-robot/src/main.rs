//! Robot node binary.
//!
//! # Usage
//!
//! ```bash
//! # Simulated peripherals, operator station at 10.0.0.2
//! PSK_HEX=<64 hex chars> PEER_IP=10.0.0.2 SIM_MODE=1 tetherlink-robot
//! ```
//!
//! Every option is an environment variable (flags exist for ad-hoc runs).
//! The process exits nonzero only for fatal configuration errors; link loss
//! and E-STOP engagement never terminate it.

use clap::Parser;
use tokio::sync::watch;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use tetherlink_core::RawNodeConfig;
use tetherlink_core::config::{
    DEFAULT_CONTROL_PORT, DEFAULT_TELEMETRY_PORT, DEFAULT_VIDEO_HTTP_PORT, DEFAULT_VIDEO_PORT,
};
use tetherlink_robot::{Peripherals, RobotCoordinator};

/// Tetherlink robot node
#[derive(Parser, Debug)]
#[command(name = "tetherlink-robot")]
#[command(about = "Robot-side safety bridge node")]
#[command(version)]
struct Args {
    /// Pre-shared key, 64 hex characters
    #[arg(long, env = "PSK_HEX", hide_env_values = true)]
    psk_hex: Option<String>,

    /// Operator station address
    #[arg(long, env = "PEER_IP", default_value = "127.0.0.1")]
    peer_ip: std::net::IpAddr,

    /// Control channel port (this node listens)
    #[arg(long, env = "CONTROL_PORT", default_value_t = DEFAULT_CONTROL_PORT)]
    control_port: u16,

    /// Video channel port (peer listens)
    #[arg(long, env = "VIDEO_PORT", default_value_t = DEFAULT_VIDEO_PORT)]
    video_port: u16,

    /// Telemetry channel port (peer listens)
    #[arg(long, env = "TELEMETRY_PORT", default_value_t = DEFAULT_TELEMETRY_PORT)]
    telemetry_port: u16,

    /// Telemetry cadence in milliseconds [50, 1000]
    #[arg(long, env = "TELEMETRY_INTERVAL_MS", default_value_t = 100)]
    telemetry_interval_ms: u64,

    /// Log level (debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Replace hardware peripherals with deterministic simulants
    #[arg(long, env = "SIM_MODE")]
    sim_mode: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::registry().with(fmt::layer().json()).with(filter).init();

    let config = RawNodeConfig {
        psk_hex: args.psk_hex,
        peer_ip: args.peer_ip,
        control_port: args.control_port,
        video_port: args.video_port,
        telemetry_port: args.telemetry_port,
        video_http_port: DEFAULT_VIDEO_HTTP_PORT,
        telemetry_interval_ms: args.telemetry_interval_ms,
        sim_mode: args.sim_mode,
    }
    .validate()?;

    let peripherals = if config.sim_mode {
        tracing::info!("SIM_MODE: using deterministic peripheral simulants");
        Peripherals::sim()
    } else {
        // Hardware drivers live in the integration build, which constructs
        // its own Peripherals and calls RobotCoordinator directly.
        return Err("no hardware peripherals in this build; set SIM_MODE=1".into());
    };

    tracing::info!(peer = %config.peer_ip, "tetherlink robot starting");

    let (shutdown_tx, shutdown) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        }
    });

    RobotCoordinator::new(config).run(peripherals, shutdown).await?;

    tracing::info!("clean shutdown");
    Ok(())
}
