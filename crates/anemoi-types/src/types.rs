//! Core types for Anemoi analyzer data.

use core::fmt;
use std::hash::{Hash, Hasher};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::uuid as ble;

/// One of the six telemetry channels streamed by the analyzer.
///
/// Each channel maps to exactly one field of [`TelemetryRecord`] and, on
/// per-channel firmware, to exactly one notify characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum TelemetryChannel {
    /// Helium sensor voltage (mV).
    HeVoltage,
    /// Helium percentage.
    HePercentage,
    /// Oxygen sensor voltage (mV).
    O2Voltage,
    /// Oxygen percentage.
    O2Percentage,
    /// Atmospheric pressure (mbar).
    AtmosphericPressure,
    /// Temperature (°C).
    Temperature,
}

impl TelemetryChannel {
    /// All channels, in subscription order.
    pub const ALL: [TelemetryChannel; 6] = [
        TelemetryChannel::HePercentage,
        TelemetryChannel::HeVoltage,
        TelemetryChannel::O2Voltage,
        TelemetryChannel::O2Percentage,
        TelemetryChannel::AtmosphericPressure,
        TelemetryChannel::Temperature,
    ];

    /// The notify characteristic carrying this channel on per-channel firmware.
    #[must_use]
    pub fn characteristic(&self) -> Uuid {
        match self {
            TelemetryChannel::HeVoltage => ble::HE_VOLTAGE,
            TelemetryChannel::HePercentage => ble::HE_PERCENTAGE,
            TelemetryChannel::O2Voltage => ble::O2_VOLTAGE,
            TelemetryChannel::O2Percentage => ble::O2_PERCENTAGE,
            TelemetryChannel::AtmosphericPressure => ble::ATMOSPHERIC_PRESSURE,
            TelemetryChannel::Temperature => ble::TEMPERATURE,
        }
    }

    /// Look up the channel carried by a characteristic.
    #[must_use]
    pub fn from_characteristic(uuid: Uuid) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.characteristic() == uuid)
    }

    /// Display unit for the channel.
    #[must_use]
    pub fn unit(&self) -> &'static str {
        match self {
            TelemetryChannel::HeVoltage | TelemetryChannel::O2Voltage => "mV",
            TelemetryChannel::HePercentage | TelemetryChannel::O2Percentage => "%",
            TelemetryChannel::AtmosphericPressure => "mbar",
            TelemetryChannel::Temperature => "°C",
        }
    }
}

impl fmt::Display for TelemetryChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TelemetryChannel::HeVoltage => "He voltage",
            TelemetryChannel::HePercentage => "He percentage",
            TelemetryChannel::O2Voltage => "O2 voltage",
            TelemetryChannel::O2Percentage => "O2 percentage",
            TelemetryChannel::AtmosphericPressure => "Atmospheric pressure",
            TelemetryChannel::Temperature => "Temperature",
        };
        write!(f, "{}", name)
    }
}

/// Normalized snapshot of every sensor channel at the latest known instant.
///
/// Fields not yet received keep their last known value; every field starts
/// at 0. The serialized form uses the same camelCase keys the analyzer puts
/// in its composite JSON payload, and keys missing from a document take 0.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase", default))]
pub struct TelemetryRecord {
    /// Oxygen percentage (0-100 expected, not enforced).
    pub percentage_o2: f64,
    /// Helium percentage.
    pub percentage_he: f64,
    /// Oxygen sensor voltage in millivolts.
    pub o2_sensor_voltage: f64,
    /// Helium sensor voltage in millivolts.
    pub he_sensor_voltage: f64,
    /// Atmospheric pressure in millibar.
    pub atmospheric_pressure: f64,
    /// Temperature in degrees Celsius.
    pub temperature: f64,
}

impl TelemetryRecord {
    /// The zero baseline every field starts from.
    pub const ZERO: TelemetryRecord = TelemetryRecord {
        percentage_o2: 0.0,
        percentage_he: 0.0,
        o2_sensor_voltage: 0.0,
        he_sensor_voltage: 0.0,
        atmospheric_pressure: 0.0,
        temperature: 0.0,
    };

    /// Read the field backing a channel.
    #[must_use]
    pub fn get(&self, channel: TelemetryChannel) -> f64 {
        match channel {
            TelemetryChannel::HeVoltage => self.he_sensor_voltage,
            TelemetryChannel::HePercentage => self.percentage_he,
            TelemetryChannel::O2Voltage => self.o2_sensor_voltage,
            TelemetryChannel::O2Percentage => self.percentage_o2,
            TelemetryChannel::AtmosphericPressure => self.atmospheric_pressure,
            TelemetryChannel::Temperature => self.temperature,
        }
    }

    /// Overwrite the field backing a channel, leaving every other field as is.
    pub fn set(&mut self, channel: TelemetryChannel, value: f64) {
        let slot = match channel {
            TelemetryChannel::HeVoltage => &mut self.he_sensor_voltage,
            TelemetryChannel::HePercentage => &mut self.percentage_he,
            TelemetryChannel::O2Voltage => &mut self.o2_sensor_voltage,
            TelemetryChannel::O2Percentage => &mut self.percentage_o2,
            TelemetryChannel::AtmosphericPressure => &mut self.atmospheric_pressure,
            TelemetryChannel::Temperature => &mut self.temperature,
        };
        *slot = value;
    }

    /// Builder-style variant of [`set`](Self::set).
    #[must_use]
    pub fn with(mut self, channel: TelemetryChannel, value: f64) -> Self {
        self.set(channel, value);
        self
    }
}

/// Relative humidity as shown on the live screen.
///
/// The analyzer has no humidity sensor, so the value is always
/// [`Humidity::Unavailable`] until a real channel exists.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Humidity {
    /// No humidity source.
    #[default]
    Unavailable,
    /// Relative humidity percentage.
    Percent(f64),
}

impl fmt::Display for Humidity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Humidity::Unavailable => write!(f, "--"),
            Humidity::Percent(v) => write!(f, "{:.0}%", v),
        }
    }
}

/// A discoverable analyzer: opaque identity plus display name.
///
/// Two handles are equal when their identities are equal; the name is
/// informational only.
#[derive(Debug, Clone, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PeripheralHandle {
    /// Platform identity (MAC address on Linux/Windows, UUID on macOS).
    pub id: String,
    /// Advertised local name, if any.
    pub name: Option<String>,
}

impl PeripheralHandle {
    /// Create a handle.
    pub fn new(id: impl Into<String>, name: Option<String>) -> Self {
        Self {
            id: id.into(),
            name,
        }
    }

    /// Whether the advertised name marks this peripheral as an analyzer.
    ///
    /// The match is a case-sensitive substring test on
    /// [`DEVICE_NAME_MARKER`](crate::uuid::DEVICE_NAME_MARKER).
    #[must_use]
    pub fn is_analyzer(&self) -> bool {
        self.name
            .as_deref()
            .is_some_and(|n| n.contains(ble::DEVICE_NAME_MARKER))
    }

    /// Name for display, falling back to the identity.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

impl PartialEq for PeripheralHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Hash for PeripheralHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for PeripheralHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{} ({})", name, self.id),
            None => write!(f, "{}", self.id),
        }
    }
}

/// A saved pair of sensor voltages, used to track cell drift over time.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct MeasurementSample {
    /// When the sample was taken.
    #[cfg_attr(feature = "serde", serde(rename = "date", with = "time::serde::rfc3339"))]
    pub timestamp: time::OffsetDateTime,
    /// Oxygen sensor voltage in millivolts.
    #[cfg_attr(feature = "serde", serde(with = "nan_as_null"))]
    pub o2_sensor_voltage: f64,
    /// Helium sensor voltage in millivolts.
    #[cfg_attr(feature = "serde", serde(with = "nan_as_null"))]
    pub he_sensor_voltage: f64,
}

/// JSON has no NaN, so a voltage that failed to decode is stored as `null`.
#[cfg(feature = "serde")]
mod nan_as_null {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_nan() {
            serializer.serialize_none()
        } else {
            serializer.serialize_some(value)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
    }
}

impl MeasurementSample {
    /// Take a sample of the voltages in `record` at `timestamp`.
    #[must_use]
    pub fn from_record(record: &TelemetryRecord, timestamp: time::OffsetDateTime) -> Self {
        Self {
            timestamp,
            o2_sensor_voltage: record.o2_sensor_voltage,
            he_sensor_voltage: record.he_sensor_voltage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_record_starts_at_zero() {
        let record = TelemetryRecord::default();
        assert_eq!(record, TelemetryRecord::ZERO);
        for channel in TelemetryChannel::ALL {
            assert_eq!(record.get(channel), 0.0);
        }
    }

    #[test]
    fn test_set_touches_one_field() {
        let mut record = TelemetryRecord::ZERO;
        record.set(TelemetryChannel::Temperature, 21.5);

        assert_eq!(record.temperature, 21.5);
        for channel in TelemetryChannel::ALL {
            if channel != TelemetryChannel::Temperature {
                assert_eq!(record.get(channel), 0.0, "{channel} changed");
            }
        }
    }

    #[test]
    fn test_channel_characteristic_roundtrip() {
        for channel in TelemetryChannel::ALL {
            assert_eq!(
                TelemetryChannel::from_characteristic(channel.characteristic()),
                Some(channel)
            );
        }
        assert_eq!(TelemetryChannel::from_characteristic(ble::CALIBRATE), None);
    }

    #[test]
    fn test_peripheral_equality_by_identity() {
        let a = PeripheralHandle::new("AA:BB", Some("Anemoi Analyzer Nano".into()));
        let b = PeripheralHandle::new("AA:BB", Some("renamed".into()));
        let c = PeripheralHandle::new("CC:DD", Some("Anemoi Analyzer Nano".into()));

        assert_eq!(a, b);
        assert_ne!(a, c);

        let set: HashSet<_> = [a, b, c].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_analyzer_name_marker() {
        assert!(PeripheralHandle::new("1", Some("Anemoi Analyzer Nano".into())).is_analyzer());
        assert!(PeripheralHandle::new("2", Some("MyAnemoi".into())).is_analyzer());
        assert!(!PeripheralHandle::new("3", Some("anemoi lowercase".into())).is_analyzer());
        assert!(!PeripheralHandle::new("4", None).is_analyzer());
    }

    proptest::proptest! {
        #[test]
        fn prop_set_then_get(idx in 0usize..6, value in -1.0e6f64..1.0e6) {
            let channel = TelemetryChannel::ALL[idx];
            let record = TelemetryRecord::ZERO.with(channel, value);
            proptest::prop_assert_eq!(record.get(channel), value);
        }
    }

    #[test]
    fn test_humidity_default_is_unavailable() {
        assert_eq!(Humidity::default(), Humidity::Unavailable);
        assert_eq!(Humidity::Unavailable.to_string(), "--");
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_record_serde_keys_match_device_json() {
        let json = r#"{"percentageO2":20.9,"percentageHe":0,"o2SensorVoltage":9.1,
            "heSensorVoltage":1.2,"atmosphericPressure":1013.25,"temperature":22.0}"#;
        let record: TelemetryRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.percentage_o2, 20.9);
        assert_eq!(record.o2_sensor_voltage, 9.1);
        assert_eq!(record.atmospheric_pressure, 1013.25);

        let value = serde_json::to_value(record).unwrap();
        assert!(value.get("heSensorVoltage").is_some());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_record_missing_keys_default_to_zero() {
        let record: TelemetryRecord =
            serde_json::from_str(r#"{"o2SensorVoltage":10.5,"temperature":19.0}"#).unwrap();
        assert_eq!(record.o2_sensor_voltage, 10.5);
        assert_eq!(record.temperature, 19.0);
        assert_eq!(record.percentage_o2, 0.0);
        assert_eq!(record.percentage_he, 0.0);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_measurement_sample_serializes_rfc3339_date() {
        let sample = MeasurementSample {
            timestamp: time::macros::datetime!(2024-05-01 12:00 UTC),
            o2_sensor_voltage: 10.0,
            he_sensor_voltage: 2.0,
        };
        let json = serde_json::to_string(&sample).unwrap();
        assert!(json.contains(r#""date":"2024-05-01T12:00:00Z""#));

        let back: MeasurementSample = serde_json::from_str(&json).unwrap();
        assert_eq!(back, sample);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_measurement_sample_nan_voltage_round_trips_as_null() {
        let record = TelemetryRecord::ZERO.with(TelemetryChannel::O2Voltage, f64::NAN);
        let samples = vec![MeasurementSample::from_record(
            &record,
            time::OffsetDateTime::UNIX_EPOCH,
        )];
        let json = serde_json::to_string(&samples).unwrap();
        assert!(json.contains(r#""o2SensorVoltage":null"#));
        assert!(json.contains(r#""heSensorVoltage":0.0"#));

        let back: Vec<MeasurementSample> = serde_json::from_str(&json).unwrap();
        assert_eq!(back.len(), 1);
        assert!(back[0].o2_sensor_voltage.is_nan());
        assert_eq!(back[0].he_sensor_voltage, 0.0);
        assert_eq!(back[0].timestamp, time::OffsetDateTime::UNIX_EPOCH);
    }
}
