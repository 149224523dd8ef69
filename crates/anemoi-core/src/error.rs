//! Error types for anemoi-core.
//!
//! This module defines the errors that can occur while talking to an Anemoi
//! analyzer over Bluetooth Low Energy or to a telemetry bridge over WebSocket.
//!
//! # Error Handling Policy
//!
//! None of these errors is ever shown to the user as a blocking failure. The
//! acquisition layer prefers stale or zeroed fields over a crashed display:
//!
//! | Error Type | Where it surfaces | Effect |
//! |------------|-------------------|--------|
//! | Scan stream error | logged by the scan task | scanning continues |
//! | [`Error::ConnectionFailed`] | returned by `connect` | state reverts to disconnected, no retry |
//! | [`Error::Parse`] | logged by the decoder | channel gets NaN or record is kept |
//! | [`Error::WriteFailed`] | returned by `send_calibrate` | logged, not retried |
//! | [`Error::WebSocket`] | returned by the bridge client | ready state becomes closed |

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur when acquiring analyzer telemetry.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Bluetooth Low Energy error.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// Device not found on the adapter.
    #[error("Device not found: {0}")]
    DeviceNotFound(DeviceNotFoundReason),

    /// Operation attempted while not connected to device.
    #[error("Not connected to device")]
    NotConnected,

    /// Required BLE characteristic not found on device.
    #[error("Characteristic not found: {uuid} (searched in {service_count} services)")]
    CharacteristicNotFound {
        /// The UUID that was not found.
        uuid: String,
        /// Number of services that were searched.
        service_count: usize,
    },

    /// A stage of the connection sequence failed.
    #[error("Connection failed during {stage}: {reason}")]
    ConnectionFailed {
        /// The stage that failed.
        stage: ConnectStage,
        /// Human-readable cause.
        reason: String,
    },

    /// Write operation failed.
    #[error("Write failed to characteristic {uuid}: {reason}")]
    WriteFailed {
        /// The characteristic UUID.
        uuid: String,
        /// The reason for the failure.
        reason: String,
    },

    /// Operation timed out.
    #[error("Operation '{operation}' timed out after {duration:?}")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The timeout duration.
        duration: Duration,
    },

    /// Payload could not be decoded.
    #[error(transparent)]
    Parse(#[from] anemoi_types::ParseError),

    /// WebSocket transport error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Stages of the connect sequence, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectStage {
    /// Establishing the BLE link.
    Connect,
    /// Discovering services and characteristics.
    Discover,
    /// Subscribing to telemetry characteristics.
    Subscribe,
}

impl std::fmt::Display for ConnectStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connect => write!(f, "connect"),
            Self::Discover => write!(f, "service discovery"),
            Self::Subscribe => write!(f, "subscribe"),
        }
    }
}

/// Reason why a device was not found.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new reasons
/// in future versions without breaking downstream code.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum DeviceNotFoundReason {
    /// Device with specified identity not known to the adapter.
    NotFound { identifier: String },
    /// No Bluetooth adapter available.
    NoAdapter,
}

impl std::fmt::Display for DeviceNotFoundReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound { identifier } => write!(f, "device '{}' not found", identifier),
            Self::NoAdapter => write!(f, "no Bluetooth adapter available"),
        }
    }
}

impl Error {
    /// Create a device not found error for a specific identifier.
    pub fn device_not_found(identifier: impl Into<String>) -> Self {
        Self::DeviceNotFound(DeviceNotFoundReason::NotFound {
            identifier: identifier.into(),
        })
    }

    /// Create a timeout error with operation context.
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Create a characteristic not found error.
    pub fn characteristic_not_found(uuid: impl Into<String>, service_count: usize) -> Self {
        Self::CharacteristicNotFound {
            uuid: uuid.into(),
            service_count,
        }
    }

    /// Create a connection failure for a given stage.
    pub fn connection_failed(stage: ConnectStage, reason: impl Into<String>) -> Self {
        Self::ConnectionFailed {
            stage,
            reason: reason.into(),
        }
    }

    /// Create a configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// The connect stage that failed, if this is a connection failure.
    pub fn connect_stage(&self) -> Option<ConnectStage> {
        match self {
            Self::ConnectionFailed { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

/// Result type alias using anemoi-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::device_not_found("Anemoi Analyzer Nano");
        assert!(err.to_string().contains("Anemoi Analyzer Nano"));

        let err = Error::NotConnected;
        assert_eq!(err.to_string(), "Not connected to device");

        let err = Error::characteristic_not_found("8d07c070", 3);
        assert!(err.to_string().contains("8d07c070"));
        assert!(err.to_string().contains("3 services"));

        let err = Error::timeout("connect", Duration::from_secs(15));
        assert!(err.to_string().contains("connect"));
        assert!(err.to_string().contains("15s"));
    }

    #[test]
    fn test_connection_failed_carries_stage() {
        let err = Error::connection_failed(ConnectStage::Discover, "gatt error");
        assert_eq!(err.connect_stage(), Some(ConnectStage::Discover));
        assert_eq!(
            err.to_string(),
            "Connection failed during service discovery: gatt error"
        );
        assert_eq!(Error::NotConnected.connect_stage(), None);
    }

    #[test]
    fn test_parse_error_conversion() {
        let err: Error = anemoi_types::ParseError::EmptyPayload.into();
        assert!(matches!(err, Error::Parse(_)));
        assert_eq!(err.to_string(), "Empty payload");
    }

    #[test]
    fn test_btleplug_error_conversion() {
        let err: Error = btleplug::Error::RuntimeError("adapter busy".into()).into();
        assert!(matches!(err, Error::Bluetooth(_)));
        assert!(err.to_string().contains("adapter busy"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_device_not_found_reasons() {
        let err = Error::DeviceNotFound(DeviceNotFoundReason::NoAdapter);
        assert!(err.to_string().contains("no Bluetooth adapter"));
    }
}
