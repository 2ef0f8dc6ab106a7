//! Control command payload schema.
//!
//! Commands are JSON objects tagged by a `cmd` field, e.g.
//! `{"cmd":"emergency_stop","engage":false,"confirm":"..."}`. The decoder
//! distinguishes two failure classes with different safety consequences:
//!
//! - A structurally valid object with an unrecognized tag decodes to
//!   [`ControlCommand::Unknown`]. Unknown is not malformed: the dispatcher
//!   logs and drops it without actuation and without E-STOP, so a newer
//!   operator station can speak to an older robot.
//! - Malformed JSON, a missing tag, or a known tag with bad fields is a
//!   decode error. On the control channel that engages E-STOP: a peer that
//!   holds the PSK but sends garbage is misbehaving in a way we cannot
//!   reason about.

use serde::{Deserialize, Serialize};

use crate::errors::{FrameError, Result};

/// Operator-to-robot control command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum ControlCommand {
    /// Engage or (with all guards satisfied) release the E-STOP latch.
    EmergencyStop {
        /// True to engage, false to request release.
        engage: bool,
        /// Release confirmation string; required byte-for-byte for release.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        confirm: Option<String>,
        /// Operator-supplied reason tag for an engage.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },

    /// Round-trip probe; echoed back in the next telemetry frame as a pong.
    Ping {
        /// Sender's monotonic timestamp in seconds.
        ts: f64,
        /// Sender-assigned ping sequence number.
        seq: u64,
        /// Round trip the sender last measured from a pong echo, if any.
        /// Lets the robot report link quality in its own telemetry.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        rtt_ms: Option<f64>,
    },

    /// Open the rope clamp.
    ClampOpen,

    /// Close the rope clamp.
    ClampClose,

    /// Switch the active camera.
    CameraSelect {
        /// Camera index.
        id: u8,
    },

    /// Raw operator input routed to the actuator layer.
    ///
    /// The axis/button composition is the actuator collaborator's concern;
    /// the core routes it opaquely through the safety gate.
    InputEvent {
        /// Input class, e.g. `"axis"` or `"button"`.
        kind: String,
        /// Input index within its class.
        index: u16,
        /// Normalized input value.
        value: f64,
    },

    /// Scalar setpoint for a named actuation channel.
    Setpoint {
        /// Channel name, e.g. `"winch_speed"`.
        channel: String,
        /// Target value.
        value: f64,
    },

    /// Structurally valid command with a tag this build does not recognize.
    ///
    /// Never serialized; produced only by [`ControlCommand::decode`].
    #[serde(skip)]
    Unknown(String),
}

/// Tags this build recognizes. Kept in sync with the enum variants above;
/// anything else decodes to `Unknown`.
const KNOWN_TAGS: &[&str] = &[
    "emergency_stop",
    "ping",
    "clamp_open",
    "clamp_close",
    "camera_select",
    "input_event",
    "setpoint",
];

impl ControlCommand {
    /// Encode to JSON payload bytes.
    ///
    /// # Errors
    ///
    /// - [`FrameError::Decode`] if serialization fails (cannot happen for
    ///   well-formed commands; `Unknown` is not serializable)
    pub fn encode(&self) -> Result<Vec<u8>> {
        if let Self::Unknown(tag) = self {
            return Err(FrameError::Decode { reason: format!("cannot encode unknown tag {tag:?}") });
        }
        serde_json::to_vec(self).map_err(|e| FrameError::Decode { reason: e.to_string() })
    }

    /// Decode a command from payload bytes.
    ///
    /// # Errors
    ///
    /// - [`FrameError::Decode`] on malformed JSON, a non-object payload, a
    ///   missing or non-string `cmd` tag, or bad fields under a known tag
    pub fn decode(payload: &[u8]) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_slice(payload)
            .map_err(|e| FrameError::Decode { reason: e.to_string() })?;

        let Some(tag) = value.get("cmd").and_then(serde_json::Value::as_str) else {
            return Err(FrameError::Decode { reason: "missing or non-string cmd tag".to_string() });
        };

        if !KNOWN_TAGS.contains(&tag) {
            return Ok(Self::Unknown(tag.to_string()));
        }

        serde_json::from_value(value).map_err(|e| FrameError::Decode { reason: e.to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_each_variant() {
        let commands = [
            ControlCommand::EmergencyStop {
                engage: false,
                confirm: Some("ESTOP_CLEAR_CONFIRM".to_string()),
                reason: None,
            },
            ControlCommand::EmergencyStop {
                engage: true,
                confirm: None,
                reason: Some("operator_engage".to_string()),
            },
            ControlCommand::Ping { ts: 12.5, seq: 9, rtt_ms: None },
            ControlCommand::Ping { ts: 13.5, seq: 10, rtt_ms: Some(41.0) },
            ControlCommand::ClampOpen,
            ControlCommand::ClampClose,
            ControlCommand::CameraSelect { id: 2 },
            ControlCommand::InputEvent { kind: "axis".to_string(), index: 1, value: -0.5 },
            ControlCommand::Setpoint { channel: "winch_speed".to_string(), value: 0.25 },
        ];

        for command in commands {
            let encoded = command.encode().unwrap();
            let decoded = ControlCommand::decode(&encoded).unwrap();
            assert_eq!(decoded, command);
        }
    }

    #[test]
    fn unknown_tag_is_not_a_decode_error() {
        let decoded =
            ControlCommand::decode(br#"{"cmd":"warp_drive","factor":9}"#).unwrap();
        assert_eq!(decoded, ControlCommand::Unknown("warp_drive".to_string()));
    }

    #[test]
    fn malformed_json_is_decode_error() {
        let result = ControlCommand::decode(b"{not json");
        assert!(matches!(result, Err(FrameError::Decode { .. })));
    }

    #[test]
    fn missing_tag_is_decode_error() {
        let result = ControlCommand::decode(br#"{"engage":true}"#);
        assert!(matches!(result, Err(FrameError::Decode { .. })));
    }

    #[test]
    fn non_string_tag_is_decode_error() {
        let result = ControlCommand::decode(br#"{"cmd":17}"#);
        assert!(matches!(result, Err(FrameError::Decode { .. })));
    }

    #[test]
    fn known_tag_with_bad_fields_is_decode_error() {
        // camera_select requires an id.
        let result = ControlCommand::decode(br#"{"cmd":"camera_select"}"#);
        assert!(matches!(result, Err(FrameError::Decode { .. })));
    }

    #[test]
    fn unknown_variant_refuses_to_encode() {
        let result = ControlCommand::Unknown("warp_drive".to_string()).encode();
        assert!(matches!(result, Err(FrameError::Decode { .. })));
    }

    #[test]
    fn estop_engage_omits_absent_fields() {
        let encoded = ControlCommand::EmergencyStop { engage: true, confirm: None, reason: None }
            .encode()
            .unwrap();
        let text = String::from_utf8(encoded).unwrap();
        assert!(!text.contains("confirm"));
        assert!(!text.contains("reason"));
    }
}
