//! Telemetry payload decoding.
//!
//! Two firmware revisions exist. The older one streams each channel on its
//! own characteristic as ASCII text (`"23.50\n"`); the newer one streams a
//! single JSON document on [`COMPOSITE_RX`]. [`TelemetryDecoder`] covers both
//! and is chosen once per connection manager.
//!
//! Decoding never fails the caller. A bad per-channel value becomes `NaN` in
//! that one field; a bad composite document is dropped and the previous
//! record stays as it was. Both cases are logged.

use anemoi_types::ble::COMPOSITE_RX;
use anemoi_types::{ParseError, ParseResult, TelemetryChannel, TelemetryRecord};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::transport::Notification;

/// How a platform hands characteristic values to the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValueEncoding {
    /// Values arrive as base64 text wrapping the bytes on the wire.
    Base64,
    /// Values arrive as the raw UTF-8 bytes on the wire.
    #[default]
    Utf8,
}

impl ValueEncoding {
    /// Turn a platform value into trimmed text.
    pub fn decode_text(self, payload: &[u8]) -> ParseResult<String> {
        let bytes = match self {
            ValueEncoding::Base64 => STANDARD
                .decode(payload.trim_ascii())
                .map_err(|e| ParseError::Base64(e.to_string()))?,
            ValueEncoding::Utf8 => payload.to_vec(),
        };
        let text = String::from_utf8(bytes)?;
        Ok(text.trim().to_string())
    }

    /// Turn bytes destined for the wire into a platform value.
    pub fn encode(self, bytes: &[u8]) -> Vec<u8> {
        match self {
            ValueEncoding::Base64 => STANDARD.encode(bytes).into_bytes(),
            ValueEncoding::Utf8 => bytes.to_vec(),
        }
    }
}

/// Parse one per-channel value from already-trimmed text.
pub fn parse_channel_value(text: &str) -> ParseResult<f64> {
    text.trim()
        .parse::<f64>()
        .map_err(|_| ParseError::InvalidNumber {
            text: text.to_string(),
        })
}

/// Parse a composite JSON document into a full record.
///
/// Keys missing from the document take 0.
pub fn parse_composite(text: &str) -> ParseResult<TelemetryRecord> {
    serde_json::from_str(text.trim()).map_err(|e| ParseError::InvalidDocument(e.to_string()))
}

/// A decoded change to the telemetry record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TelemetryUpdate {
    /// One channel changed; every other field keeps its value.
    Channel {
        /// The channel that changed.
        channel: TelemetryChannel,
        /// The new value (may be `NaN` for a malformed payload).
        value: f64,
    },
    /// The whole record is replaced.
    Record(TelemetryRecord),
}

impl TelemetryUpdate {
    /// Apply this update to a record.
    pub fn apply(&self, record: &mut TelemetryRecord) {
        match *self {
            TelemetryUpdate::Channel { channel, value } => record.set(channel, value),
            TelemetryUpdate::Record(next) => *record = next,
        }
    }
}

/// Decoding strategy, selected by the firmware revision in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TelemetryDecoder {
    /// Six characteristics, one float each.
    #[default]
    PerChannel,
    /// One characteristic carrying a JSON document.
    Composite,
}

impl TelemetryDecoder {
    /// Characteristics to subscribe to, one subscription each.
    pub fn subscriptions(&self) -> Vec<Uuid> {
        match self {
            TelemetryDecoder::PerChannel => TelemetryChannel::ALL
                .iter()
                .map(TelemetryChannel::characteristic)
                .collect(),
            TelemetryDecoder::Composite => vec![COMPOSITE_RX],
        }
    }

    /// Decode a notification into an update.
    ///
    /// Returns `None` when there is nothing to apply: an absent payload, a
    /// characteristic this strategy does not read, or a malformed composite
    /// document.
    pub fn decode(
        &self,
        notification: &Notification,
        encoding: ValueEncoding,
    ) -> Option<TelemetryUpdate> {
        let Some(payload) = notification.value.as_deref().filter(|v| !v.is_empty()) else {
            debug!(
                characteristic = %notification.characteristic,
                "No data was received"
            );
            return None;
        };

        match self {
            TelemetryDecoder::PerChannel => {
                let channel = TelemetryChannel::from_characteristic(notification.characteristic)?;
                let value = match encoding
                    .decode_text(payload)
                    .and_then(|text| parse_channel_value(&text))
                {
                    Ok(value) => value,
                    Err(e) => {
                        warn!(%channel, error = %e, "Malformed channel value");
                        f64::NAN
                    }
                };
                Some(TelemetryUpdate::Channel { channel, value })
            }
            TelemetryDecoder::Composite => {
                if notification.characteristic != COMPOSITE_RX {
                    return None;
                }
                match encoding
                    .decode_text(payload)
                    .and_then(|text| parse_composite(&text))
                {
                    Ok(record) => Some(TelemetryUpdate::Record(record)),
                    Err(e) => {
                        warn!(error = %e, "Malformed telemetry document, keeping previous record");
                        None
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anemoi_types::ble;

    fn b64(text: &str) -> Vec<u8> {
        ValueEncoding::Base64.encode(text.as_bytes())
    }

    #[test]
    fn test_trailing_newline_is_trimmed() {
        let n = Notification::new(ble::TEMPERATURE, b64("23.50\n"));
        let update = TelemetryDecoder::PerChannel
            .decode(&n, ValueEncoding::Base64)
            .unwrap();
        assert_eq!(
            update,
            TelemetryUpdate::Channel {
                channel: TelemetryChannel::Temperature,
                value: 23.5
            }
        );
    }

    #[test]
    fn test_utf8_encoding_reads_raw_bytes() {
        let n = Notification::new(ble::HE_VOLTAGE, " 412.7 ");
        let update = TelemetryDecoder::PerChannel
            .decode(&n, ValueEncoding::Utf8)
            .unwrap();
        assert_eq!(
            update,
            TelemetryUpdate::Channel {
                channel: TelemetryChannel::HeVoltage,
                value: 412.7
            }
        );
    }

    #[test]
    fn test_malformed_number_yields_nan_for_that_channel() {
        let n = Notification::new(ble::O2_VOLTAGE, b64("12.x"));
        let update = TelemetryDecoder::PerChannel
            .decode(&n, ValueEncoding::Base64)
            .unwrap();

        let mut record = TelemetryRecord::ZERO.with(TelemetryChannel::Temperature, 20.0);
        update.apply(&mut record);
        assert!(record.o2_sensor_voltage.is_nan());
        assert_eq!(record.temperature, 20.0);
    }

    #[test]
    fn test_invalid_base64_yields_nan() {
        let n = Notification::new(ble::HE_PERCENTAGE, "***");
        let update = TelemetryDecoder::PerChannel
            .decode(&n, ValueEncoding::Base64)
            .unwrap();
        assert!(matches!(
            update,
            TelemetryUpdate::Channel { channel: TelemetryChannel::HePercentage, value } if value.is_nan()
        ));
    }

    #[test]
    fn test_absent_payload_is_skipped() {
        for decoder in [TelemetryDecoder::PerChannel, TelemetryDecoder::Composite] {
            let n = Notification::empty(ble::O2_PERCENTAGE);
            assert_eq!(decoder.decode(&n, ValueEncoding::Base64), None);

            let n = Notification::new(ble::O2_PERCENTAGE, Vec::new());
            assert_eq!(decoder.decode(&n, ValueEncoding::Base64), None);
        }
    }

    #[test]
    fn test_unknown_characteristic_is_ignored() {
        let n = Notification::new(ble::CALIBRATE, "1.0");
        assert_eq!(TelemetryDecoder::PerChannel.decode(&n, ValueEncoding::Utf8), None);
        assert_eq!(TelemetryDecoder::Composite.decode(&n, ValueEncoding::Utf8), None);
    }

    #[test]
    fn test_composite_replaces_whole_record() {
        let doc = r#"{"percentageO2":20.9,"percentageHe":0,"o2SensorVoltage":9.8,
            "heSensorVoltage":0.4,"atmosphericPressure":1012.0,"temperature":24.1}"#;
        let n = Notification::new(ble::COMPOSITE_RX, b64(doc));
        let update = TelemetryDecoder::Composite
            .decode(&n, ValueEncoding::Base64)
            .unwrap();

        let mut record = TelemetryRecord::ZERO.with(TelemetryChannel::HePercentage, 35.0);
        update.apply(&mut record);
        assert_eq!(record.percentage_o2, 20.9);
        assert_eq!(record.percentage_he, 0.0);
        assert_eq!(record.o2_sensor_voltage, 9.8);
        assert_eq!(record.temperature, 24.1);
    }

    #[test]
    fn test_composite_malformed_document_is_dropped() {
        let n = Notification::new(ble::COMPOSITE_RX, b64(r#"{"percentageO2": 20.9"#));
        assert_eq!(TelemetryDecoder::Composite.decode(&n, ValueEncoding::Base64), None);

        let n = Notification::new(ble::COMPOSITE_RX, b64(r#"[1, 2, 3]"#));
        assert_eq!(TelemetryDecoder::Composite.decode(&n, ValueEncoding::Base64), None);
    }

    #[test]
    fn test_subscriptions_per_strategy() {
        let per_channel = TelemetryDecoder::PerChannel.subscriptions();
        assert_eq!(per_channel.len(), 6);
        assert!(per_channel.contains(&ble::ATMOSPHERIC_PRESSURE));
        assert!(!per_channel.contains(&ble::CALIBRATE));

        assert_eq!(TelemetryDecoder::Composite.subscriptions(), vec![ble::COMPOSITE_RX]);
    }

    #[test]
    fn test_encode_calibrate_token() {
        assert_eq!(ValueEncoding::Base64.encode(b"CAL"), b"Q0FM".to_vec());
        assert_eq!(ValueEncoding::Utf8.encode(b"CAL"), b"CAL".to_vec());
    }

    #[test]
    fn test_parse_channel_value_errors() {
        assert_eq!(parse_channel_value("1013.25").unwrap(), 1013.25);
        assert!(matches!(
            parse_channel_value(""),
            Err(ParseError::InvalidNumber { .. })
        ));
    }
}
