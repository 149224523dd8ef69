//! Platform-agnostic types for the Anemoi gas analyzer.
//!
//! This crate provides the data model shared by the BLE acquisition layer
//! (anemoi-core) and any front end that renders its state.
//!
//! # Features
//!
//! - [`TelemetryRecord`]: normalized snapshot of the six sensor channels
//! - [`TelemetryChannel`]: channel enumeration with characteristic mapping
//! - [`PeripheralHandle`]: discovered analyzer, compared by identity
//! - [`MeasurementSample`]: saved sensor voltages for drift tracking
//! - UUID constants for the analyzer's GATT service
//! - Error types for payload parsing
//!
//! # Example
//!
//! ```
//! use anemoi_types::{TelemetryChannel, TelemetryRecord};
//!
//! let mut record = TelemetryRecord::default();
//! record.set(TelemetryChannel::O2Percentage, 20.9);
//! assert_eq!(record.percentage_o2, 20.9);
//! ```

pub mod error;
pub mod types;
pub mod uuid;

pub use error::{ParseError, ParseResult};
pub use types::{Humidity, MeasurementSample, PeripheralHandle, TelemetryChannel, TelemetryRecord};
pub use crate::uuid as ble;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reexports() {
        assert_eq!(ble::DEVICE_NAME_MARKER, "Anemoi");
        assert_eq!(TelemetryChannel::ALL.len(), 6);
    }

    #[test]
    fn test_parse_error_display() {
        let err = ParseError::InvalidNumber {
            text: "abc".to_string(),
        };
        assert_eq!(err.to_string(), "Invalid number 'abc'");
        assert_eq!(ParseError::EmptyPayload.to_string(), "Empty payload");
    }
}
