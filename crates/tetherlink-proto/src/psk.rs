//! Pre-shared key handling.
//!
//! Both peers are provisioned with the same 32 bytes of uniformly random
//! material out of band. The key is loaded once at process start and never
//! rotated at runtime. A missing or malformed key is a fatal configuration
//! error; the process refuses to start rather than running unauthenticated.

use thiserror::Error;
use zeroize::Zeroize;

/// Length of the pre-shared key in bytes.
pub const PSK_LEN: usize = 32;

/// Errors from PSK parsing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PskError {
    /// Input was not valid hexadecimal.
    #[error("PSK is not valid hex")]
    InvalidHex,

    /// Decoded key had the wrong length.
    #[error("PSK must be {expected} bytes ({} hex chars), got {actual} bytes", expected * 2)]
    WrongLength {
        /// Required key length in bytes.
        expected: usize,
        /// Decoded length in bytes.
        actual: usize,
    },
}

/// 32-byte symmetric key authenticating every control and telemetry frame.
///
/// The key material is zeroized on drop and never printed: `Debug` is
/// redacted so the key cannot leak through logs or panic messages.
#[derive(Clone)]
pub struct Psk([u8; PSK_LEN]);

impl Psk {
    /// Wrap raw key bytes.
    #[must_use]
    pub fn new(bytes: [u8; PSK_LEN]) -> Self {
        Self(bytes)
    }

    /// Parse a key from its 64-hex-character provisioning form.
    ///
    /// # Errors
    ///
    /// - [`PskError::InvalidHex`] if the input is not hex
    /// - [`PskError::WrongLength`] if it does not decode to exactly 32 bytes
    pub fn from_hex(hex_str: &str) -> std::result::Result<Self, PskError> {
        let mut decoded = hex::decode(hex_str.trim()).map_err(|_| PskError::InvalidHex)?;

        if decoded.len() != PSK_LEN {
            let actual = decoded.len();
            decoded.zeroize();
            return Err(PskError::WrongLength { expected: PSK_LEN, actual });
        }

        let mut bytes = [0u8; PSK_LEN];
        bytes.copy_from_slice(&decoded);
        decoded.zeroize();

        Ok(Self(bytes))
    }

    /// Raw key bytes for HMAC computation.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; PSK_LEN] {
        &self.0
    }
}

impl Drop for Psk {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl std::fmt::Debug for Psk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Psk(<redacted>)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_valid_hex() {
        let hex_key = "00".repeat(PSK_LEN);
        let psk = Psk::from_hex(&hex_key).unwrap();
        assert_eq!(psk.as_bytes(), &[0u8; PSK_LEN]);
    }

    #[test]
    fn parses_with_surrounding_whitespace() {
        let hex_key = format!("  {}\n", "ab".repeat(PSK_LEN));
        let psk = Psk::from_hex(&hex_key).unwrap();
        assert_eq!(psk.as_bytes(), &[0xAB; PSK_LEN]);
    }

    #[test]
    fn rejects_short_key() {
        let result = Psk::from_hex(&"00".repeat(PSK_LEN - 1));
        assert_eq!(result.unwrap_err(), PskError::WrongLength { expected: 32, actual: 31 });
    }

    #[test]
    fn rejects_long_key() {
        let result = Psk::from_hex(&"00".repeat(PSK_LEN + 1));
        assert_eq!(result.unwrap_err(), PskError::WrongLength { expected: 32, actual: 33 });
    }

    #[test]
    fn rejects_non_hex() {
        let result = Psk::from_hex(&"zz".repeat(PSK_LEN));
        assert_eq!(result.unwrap_err(), PskError::InvalidHex);
    }

    #[test]
    fn debug_is_redacted() {
        let psk = Psk::new([0x42; PSK_LEN]);
        let rendered = format!("{psk:?}");
        assert!(!rendered.contains("42"));
        assert!(rendered.contains("redacted"));
    }
}
