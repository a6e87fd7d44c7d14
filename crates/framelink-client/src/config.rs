use std::time::Duration;

use framelink_frame::{CodecConfig, MAX_PAYLOAD_LEN, PROTOCOL_VERSION};
use serde::{Deserialize, Serialize};

use crate::error::{ClientError, Result};

/// Protocol client configuration.
///
/// Durations are expressed in milliseconds when (de)serialized; missing fields
/// take their default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Send a heartbeat frame every `alive_interval`.
    pub enable_alive: bool,
    #[serde(rename = "alive_interval_ms", with = "millis")]
    pub alive_interval: Duration,
    /// Receive silence after which a warning is reported.
    #[serde(rename = "rx_warn_after_ms", with = "millis")]
    pub rx_warn_after: Duration,
    /// Receive silence after which the session is faulted and stopped.
    #[serde(rename = "rx_fault_after_ms", with = "millis")]
    pub rx_fault_after: Duration,
    /// Timeout used when a command is sent without one.
    #[serde(rename = "default_command_timeout_ms", with = "millis")]
    pub default_command_timeout: Duration,
    /// Period of the receive-silence check.
    #[serde(rename = "health_check_interval_ms", with = "millis")]
    pub health_check_interval: Duration,
    /// Unsolicited frames buffered for observers; the oldest is dropped when full.
    pub telemetry_queue_capacity: usize,
    /// Capacity of each send queue.
    pub tx_queue_capacity: usize,
    /// Version byte stamped into heartbeat frames.
    pub protocol_version: u8,
    /// Size of the transport read buffer.
    pub read_buffer_size: usize,
    /// Largest payload accepted from the device.
    pub max_payload_len: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            enable_alive: true,
            alive_interval: Duration::from_millis(300),
            rx_warn_after: Duration::from_secs(2),
            rx_fault_after: Duration::from_secs(5),
            default_command_timeout: Duration::from_millis(1000),
            health_check_interval: Duration::from_millis(200),
            telemetry_queue_capacity: 200,
            tx_queue_capacity: 500,
            protocol_version: PROTOCOL_VERSION,
            read_buffer_size: 8192,
            max_payload_len: MAX_PAYLOAD_LEN,
        }
    }
}

impl ClientConfig {
    /// Parse a JSON document and validate the result.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the client cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.enable_alive && self.alive_interval.is_zero() {
            return Err(invalid("alive_interval_ms must be > 0 when heartbeats are enabled"));
        }
        if self.health_check_interval.is_zero() {
            return Err(invalid("health_check_interval_ms must be > 0"));
        }
        if self.default_command_timeout.is_zero() {
            return Err(invalid("default_command_timeout_ms must be > 0"));
        }
        if self.rx_fault_after < self.rx_warn_after {
            return Err(invalid(
                "rx_fault_after_ms must not be smaller than rx_warn_after_ms",
            ));
        }
        if self.telemetry_queue_capacity == 0 {
            return Err(invalid("telemetry_queue_capacity must be > 0"));
        }
        if self.tx_queue_capacity == 0 {
            return Err(invalid("tx_queue_capacity must be > 0"));
        }
        if self.read_buffer_size == 0 {
            return Err(invalid("read_buffer_size must be > 0"));
        }
        if self.max_payload_len > MAX_PAYLOAD_LEN {
            return Err(invalid(format!(
                "max_payload_len must be <= {MAX_PAYLOAD_LEN}"
            )));
        }
        Ok(())
    }

    /// Decoder settings derived from this configuration.
    pub fn codec_config(&self) -> CodecConfig {
        CodecConfig {
            max_payload_len: self.max_payload_len,
        }
    }

    /// The effective timeout for a command: `None` or zero means the default.
    pub fn effective_timeout(&self, timeout: Option<Duration>) -> Duration {
        match timeout {
            Some(timeout) if !timeout.is_zero() => timeout,
            _ => self.default_command_timeout,
        }
    }
}

fn invalid(msg: impl Into<String>) -> ClientError {
    ClientError::InvalidConfig(msg.into())
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ClientConfig::default();
        assert!(config.enable_alive);
        assert_eq!(config.alive_interval, Duration::from_millis(300));
        assert_eq!(config.rx_warn_after, Duration::from_secs(2));
        assert_eq!(config.rx_fault_after, Duration::from_secs(5));
        assert_eq!(config.default_command_timeout, Duration::from_millis(1000));
        assert_eq!(config.telemetry_queue_capacity, 200);
        assert_eq!(config.tx_queue_capacity, 500);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config =
            ClientConfig::from_json(r#"{"alive_interval_ms": 1000, "enable_alive": false}"#)
                .unwrap();
        assert!(!config.enable_alive);
        assert_eq!(config.alive_interval, Duration::from_secs(1));
        assert_eq!(config.tx_queue_capacity, 500);
    }

    #[test]
    fn json_roundtrip_uses_millis() {
        let json = serde_json::to_value(ClientConfig::default()).unwrap();
        assert_eq!(json["rx_fault_after_ms"], 5000);
        assert_eq!(json["health_check_interval_ms"], 200);
    }

    #[test]
    fn validate_rejects_bad_values() {
        let config = ClientConfig {
            rx_warn_after: Duration::from_secs(6),
            ..ClientConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ClientError::InvalidConfig(_))
        ));

        let config = ClientConfig {
            tx_queue_capacity: 0,
            ..ClientConfig::default()
        };
        assert!(config.validate().is_err());

        let config = ClientConfig {
            max_payload_len: MAX_PAYLOAD_LEN + 1,
            ..ClientConfig::default()
        };
        assert!(config.validate().is_err());

        // Heartbeat interval is irrelevant when heartbeats are off.
        let config = ClientConfig {
            enable_alive: false,
            alive_interval: Duration::ZERO,
            ..ClientConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn malformed_json_is_a_config_error() {
        let err = ClientConfig::from_json("{not json").unwrap_err();
        assert!(matches!(err, ClientError::Json(_)));
        assert_eq!(err.code(), crate::ErrorCode::ConfigurationInvalid);
    }

    #[test]
    fn effective_timeout_falls_back_to_default() {
        let config = ClientConfig::default();
        assert_eq!(config.effective_timeout(None), config.default_command_timeout);
        assert_eq!(
            config.effective_timeout(Some(Duration::ZERO)),
            config.default_command_timeout
        );
        assert_eq!(
            config.effective_timeout(Some(Duration::from_millis(50))),
            Duration::from_millis(50)
        );
    }
}
