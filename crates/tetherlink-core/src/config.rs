//! Node configuration and validation.
//!
//! Configuration arrives from the environment (the binaries map each
//! variable to a flag); this module owns validation. Safety constants are
//! *not* configuration; see [`crate::constants`].
//!
//! The PSK is the one fatal input: a node without a valid key refuses to
//! start. Running unauthenticated is not a degraded mode, it is a different
//! (and unacceptable) system.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use tetherlink_proto::psk::{Psk, PskError};

/// Default control channel port.
pub const DEFAULT_CONTROL_PORT: u16 = 5001;

/// Default video channel port.
pub const DEFAULT_VIDEO_PORT: u16 = 5002;

/// Default telemetry channel port.
pub const DEFAULT_TELEMETRY_PORT: u16 = 5003;

/// Default port for the base's video republish collaborator.
pub const DEFAULT_VIDEO_HTTP_PORT: u16 = 5004;

/// Accepted telemetry interval range in milliseconds.
pub const TELEMETRY_INTERVAL_RANGE_MS: std::ops::RangeInclusive<u64> = 50..=1000;

/// Fatal startup configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// `PSK_HEX` was not provided.
    #[error("PSK_HEX is not set; refusing to start unauthenticated")]
    MissingPsk,

    /// `PSK_HEX` was present but unusable.
    #[error("PSK_HEX is invalid: {0}")]
    InvalidPsk(#[from] PskError),

    /// `TELEMETRY_INTERVAL_MS` outside the accepted range.
    #[error("TELEMETRY_INTERVAL_MS must be within [50, 1000], got {ms}")]
    TelemetryIntervalOutOfRange {
        /// The rejected value.
        ms: u64,
    },
}

/// Raw configuration as collected from the environment, not yet validated.
#[derive(Debug, Clone)]
pub struct RawNodeConfig {
    /// `PSK_HEX`, if set.
    pub psk_hex: Option<String>,
    /// `PEER_IP`.
    pub peer_ip: IpAddr,
    /// `CONTROL_PORT`.
    pub control_port: u16,
    /// `VIDEO_PORT`.
    pub video_port: u16,
    /// `TELEMETRY_PORT`.
    pub telemetry_port: u16,
    /// `VIDEO_HTTP_PORT`.
    pub video_http_port: u16,
    /// `TELEMETRY_INTERVAL_MS`.
    pub telemetry_interval_ms: u64,
    /// `SIM_MODE`.
    pub sim_mode: bool,
}

impl RawNodeConfig {
    /// Validate into a usable configuration.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::MissingPsk`] / [`ConfigError::InvalidPsk`] for key
    ///   problems (fatal, nonzero exit)
    /// - [`ConfigError::TelemetryIntervalOutOfRange`] for an interval
    ///   outside [50, 1000] ms
    pub fn validate(self) -> Result<NodeConfig, ConfigError> {
        let psk_hex = self.psk_hex.ok_or(ConfigError::MissingPsk)?;
        let psk = Arc::new(Psk::from_hex(&psk_hex)?);
        let telemetry_interval = telemetry_interval_from_ms(self.telemetry_interval_ms)?;

        Ok(NodeConfig {
            psk,
            peer_ip: self.peer_ip,
            control_port: self.control_port,
            video_port: self.video_port,
            telemetry_port: self.telemetry_port,
            video_http_port: self.video_http_port,
            telemetry_interval,
            sim_mode: self.sim_mode,
        })
    }
}

/// Validated per-node configuration, shared by both roles.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Pre-shared frame authentication key.
    pub psk: Arc<Psk>,
    /// Address of the other peer.
    pub peer_ip: IpAddr,
    /// Control channel port (robot listens).
    pub control_port: u16,
    /// Video channel port (base listens).
    pub video_port: u16,
    /// Telemetry channel port (base listens).
    pub telemetry_port: u16,
    /// Port handed to the base's video republish collaborator.
    pub video_http_port: u16,
    /// Telemetry composition cadence.
    pub telemetry_interval: Duration,
    /// Replace peripherals with deterministic simulants.
    pub sim_mode: bool,
}

impl NodeConfig {
    /// Peer's control endpoint (the robot's listener).
    #[must_use]
    pub fn control_addr(&self) -> SocketAddr {
        SocketAddr::new(self.peer_ip, self.control_port)
    }

    /// Peer's video endpoint (the base's listener).
    #[must_use]
    pub fn video_addr(&self) -> SocketAddr {
        SocketAddr::new(self.peer_ip, self.video_port)
    }

    /// Peer's telemetry endpoint (the base's listener).
    #[must_use]
    pub fn telemetry_addr(&self) -> SocketAddr {
        SocketAddr::new(self.peer_ip, self.telemetry_port)
    }
}

/// Validate a telemetry interval.
///
/// # Errors
///
/// - [`ConfigError::TelemetryIntervalOutOfRange`] outside [50, 1000] ms
pub fn telemetry_interval_from_ms(ms: u64) -> Result<Duration, ConfigError> {
    if TELEMETRY_INTERVAL_RANGE_MS.contains(&ms) {
        Ok(Duration::from_millis(ms))
    } else {
        Err(ConfigError::TelemetryIntervalOutOfRange { ms })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_psk_hex() -> String {
        "ab".repeat(32)
    }

    fn build(psk: Option<&str>, interval_ms: u64) -> Result<NodeConfig, ConfigError> {
        RawNodeConfig {
            psk_hex: psk.map(str::to_string),
            peer_ip: "10.0.0.2".parse().unwrap(),
            control_port: DEFAULT_CONTROL_PORT,
            video_port: DEFAULT_VIDEO_PORT,
            telemetry_port: DEFAULT_TELEMETRY_PORT,
            video_http_port: DEFAULT_VIDEO_HTTP_PORT,
            telemetry_interval_ms: interval_ms,
            sim_mode: true,
        }
        .validate()
    }

    #[test]
    fn valid_config_builds() {
        let config = build(Some(&valid_psk_hex()), 100).unwrap();
        assert_eq!(config.telemetry_interval, Duration::from_millis(100));
        assert_eq!(config.control_addr().port(), 5001);
    }

    #[test]
    fn missing_psk_is_fatal() {
        assert!(matches!(build(None, 100), Err(ConfigError::MissingPsk)));
    }

    #[test]
    fn short_psk_is_fatal() {
        let result = build(Some("abcd"), 100);
        assert!(matches!(result, Err(ConfigError::InvalidPsk(PskError::WrongLength { .. }))));
    }

    #[test]
    fn non_hex_psk_is_fatal() {
        let bad = "zz".repeat(32);
        let result = build(Some(&bad), 100);
        assert!(matches!(result, Err(ConfigError::InvalidPsk(PskError::InvalidHex))));
    }

    #[test]
    fn telemetry_interval_bounds() {
        assert!(build(Some(&valid_psk_hex()), 50).is_ok());
        assert!(build(Some(&valid_psk_hex()), 1000).is_ok());
        assert!(matches!(
            build(Some(&valid_psk_hex()), 49),
            Err(ConfigError::TelemetryIntervalOutOfRange { ms: 49 })
        ));
        assert!(matches!(
            build(Some(&valid_psk_hex()), 1001),
            Err(ConfigError::TelemetryIntervalOutOfRange { ms: 1001 })
        ));
    }
}
