//! Bluetooth UUIDs for the Anemoi analyzer.
//!
//! The analyzer exposes a single custom GATT service. Firmware that streams
//! one value per characteristic uses all six telemetry characteristics;
//! firmware that streams a JSON document reuses the O2 percentage slot as
//! its only notify characteristic ([`COMPOSITE_RX`]).

use uuid::{Uuid, uuid};

/// Anemoi custom service UUID.
pub const ANEMOI_SERVICE: Uuid = uuid!("9243e98a-314c-42b2-a4fc-c23d54f0f271");

// --- Telemetry Characteristic UUIDs ---

/// Helium sensor voltage in millivolts (notify, ASCII float).
pub const HE_VOLTAGE: Uuid = uuid!("868b31f7-4c08-4d5f-b0fa-9e5151b19f5c");

/// Helium percentage (notify, ASCII float).
pub const HE_PERCENTAGE: Uuid = uuid!("61de16b4-dbcf-491a-8ed6-5ba35a9c60e7");

/// Oxygen sensor voltage in millivolts (notify, ASCII float).
pub const O2_VOLTAGE: Uuid = uuid!("55920ac9-31d3-45d3-8d4e-89566077fbd9");

/// Oxygen percentage (notify, ASCII float).
pub const O2_PERCENTAGE: Uuid = uuid!("44aa55a3-564f-4d9a-b20e-6636e0c43dfc");

/// Atmospheric pressure in millibar (notify, ASCII float).
pub const ATMOSPHERIC_PRESSURE: Uuid = uuid!("68848368-6d91-49f9-9a5f-fed73463c9f6");

/// Temperature in degrees Celsius (notify, ASCII float).
pub const TEMPERATURE: Uuid = uuid!("a9bac333-e37c-42a9-8abc-9b07350e189d");

/// Composite telemetry characteristic carrying a JSON object.
///
/// Shares its UUID with [`O2_PERCENTAGE`].
pub const COMPOSITE_RX: Uuid = O2_PERCENTAGE;

// --- Command Characteristic UUIDs ---

/// Calibration trigger (write with response).
pub const CALIBRATE: Uuid = uuid!("8d07c070-b5e0-4859-bc71-88b425e040c0");

/// Substring an advertised name must contain to be listed as an analyzer.
pub const DEVICE_NAME_MARKER: &str = "Anemoi";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_uuid() {
        assert_eq!(
            ANEMOI_SERVICE.to_string(),
            "9243e98a-314c-42b2-a4fc-c23d54f0f271"
        );
    }

    #[test]
    fn test_composite_shares_o2_percentage_slot() {
        assert_eq!(COMPOSITE_RX, O2_PERCENTAGE);
        assert_eq!(
            COMPOSITE_RX.to_string(),
            "44aa55a3-564f-4d9a-b20e-6636e0c43dfc"
        );
    }

    #[test]
    fn test_telemetry_uuids_are_distinct() {
        let all = [
            HE_VOLTAGE,
            HE_PERCENTAGE,
            O2_VOLTAGE,
            O2_PERCENTAGE,
            ATMOSPHERIC_PRESSURE,
            TEMPERATURE,
            CALIBRATE,
        ];
        for (i, a) in all.iter().enumerate() {
            for b in &all[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_calibrate_uuid() {
        assert_eq!(
            CALIBRATE.to_string(),
            "8d07c070-b5e0-4859-bc71-88b425e040c0"
        );
    }
}
