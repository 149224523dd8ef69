//! Output formatting for CLI commands.

use anemoi_core::{ChartSet, Discovery};
use anemoi_types::{Humidity, MeasurementSample, PeripheralHandle, TelemetryChannel, TelemetryRecord};
use anyhow::Result;
use serde_json::json;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Format a reading with a fixed precision. NaN marks a value the device
/// sent but could not be parsed.
fn format_value(value: f64, decimals: usize) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else {
        format!("{:.*}", decimals, value)
    }
}

fn decimals(channel: TelemetryChannel) -> usize {
    match channel {
        TelemetryChannel::HeVoltage | TelemetryChannel::O2Voltage => 2,
        TelemetryChannel::AtmosphericPressure => 0,
        _ => 1,
    }
}

fn format_timestamp(ts: OffsetDateTime) -> String {
    ts.format(&Rfc3339).unwrap_or_else(|_| "???".to_string())
}

#[must_use]
pub fn format_scan_text(devices: &[Discovery]) -> String {
    if devices.is_empty() {
        return "No analyzers found.\n".to_string();
    }

    let mut output = format!("Found {} device(s):\n\n", devices.len());
    output.push_str(&format!("{:<24} {:<40} {:>6}\n", "Name", "Identifier", "RSSI"));
    for device in devices {
        let name = device.handle.name.as_deref().unwrap_or("Unknown");
        let rssi = device
            .rssi
            .map(|r| format!("{} dBm", r))
            .unwrap_or_else(|| "--".to_string());
        output.push_str(&format!("{:<24} {:<40} {:>6}\n", name, device.handle.id, rssi));
    }
    output
}

pub fn format_scan_json(devices: &[Discovery]) -> Result<String> {
    let list: Vec<_> = devices
        .iter()
        .map(|d| {
            json!({
                "id": d.handle.id,
                "name": d.handle.name,
                "rssi": d.rssi,
            })
        })
        .collect();
    Ok(serde_json::to_string_pretty(&list)? + "\n")
}

/// One line of watch output.
#[must_use]
pub fn format_watch_line(record: &TelemetryRecord, humidity: Humidity, now: OffsetDateTime) -> String {
    let mut parts = vec![format_timestamp(now)];
    for channel in [
        TelemetryChannel::O2Percentage,
        TelemetryChannel::HePercentage,
        TelemetryChannel::O2Voltage,
        TelemetryChannel::HeVoltage,
        TelemetryChannel::AtmosphericPressure,
        TelemetryChannel::Temperature,
    ] {
        let value = format_value(record.get(channel), decimals(channel));
        let label = match channel {
            TelemetryChannel::O2Percentage => "O2",
            TelemetryChannel::HePercentage => "He",
            TelemetryChannel::O2Voltage => "O2 cell",
            TelemetryChannel::HeVoltage => "He cell",
            TelemetryChannel::AtmosphericPressure => "P",
            TelemetryChannel::Temperature => "T",
        };
        parts.push(format!("{} {}{}", label, value, channel.unit()));
    }
    parts.push(format!("RH {}", humidity));
    parts.join("  ") + "\n"
}

pub fn format_watch_json(
    device: &PeripheralHandle,
    record: &TelemetryRecord,
    now: OffsetDateTime,
) -> Result<String> {
    // JSON has no NaN; unparsed values become null.
    let value = |channel| {
        let v = record.get(channel);
        if v.is_nan() { None } else { Some(v) }
    };
    let line = json!({
        "timestamp": format_timestamp(now),
        "device": device.id,
        "name": device.name,
        "percentageO2": value(TelemetryChannel::O2Percentage),
        "percentageHe": value(TelemetryChannel::HePercentage),
        "o2SensorVoltage": value(TelemetryChannel::O2Voltage),
        "heSensorVoltage": value(TelemetryChannel::HeVoltage),
        "atmosphericPressure": value(TelemetryChannel::AtmosphericPressure),
        "temperature": value(TelemetryChannel::Temperature),
    });
    Ok(serde_json::to_string(&line)? + "\n")
}

#[must_use]
pub fn format_history_text(samples: &[MeasurementSample]) -> String {
    if samples.is_empty() {
        return "No saved measurements.\n".to_string();
    }

    let mut output = format!("History ({} measurements):\n\n", samples.len());
    output.push_str(&format!("{:<26} {:>10} {:>10}\n", "Date", "O2 (mV)", "He (mV)"));
    for sample in samples {
        output.push_str(&format!(
            "{:<26} {:>10} {:>10}\n",
            format_timestamp(sample.timestamp),
            format_value(sample.o2_sensor_voltage, 2),
            format_value(sample.he_sensor_voltage, 2),
        ));
    }
    output
}

pub fn format_history_json(samples: &[MeasurementSample]) -> Result<String> {
    Ok(serde_json::to_string_pretty(samples)? + "\n")
}

/// Latest value of every chart on one line.
#[must_use]
pub fn format_chart_line(charts: &ChartSet) -> String {
    let parts: Vec<String> = charts
        .iter()
        .map(|(key, buffer)| {
            let latest = buffer
                .latest()
                .map(|p| format_value(p.value, 2))
                .unwrap_or_else(|| "--".to_string());
            format!("{}={}", key, latest)
        })
        .collect();
    parts.join("  ") + "\n"
}

#[cfg(test)]
mod tests {
    use super::*;
    use anemoi_core::MalformedFramePolicy;
    use time::macros::datetime;

    fn discovery(id: &str, name: Option<&str>, rssi: Option<i16>) -> Discovery {
        Discovery {
            handle: PeripheralHandle::new(id, name.map(str::to_string)),
            rssi,
        }
    }

    #[test]
    fn test_format_value_marks_nan() {
        assert_eq!(format_value(f64::NAN, 2), "NaN");
        assert_eq!(format_value(10.456, 2), "10.46");
        assert_eq!(format_value(1013.4, 0), "1013");
    }

    #[test]
    fn test_scan_text_empty() {
        assert_eq!(format_scan_text(&[]), "No analyzers found.\n");
    }

    #[test]
    fn test_scan_text_lists_devices() {
        let text = format_scan_text(&[
            discovery("AA:BB", Some("Anemoi 01"), Some(-60)),
            discovery("CC:DD", None, None),
        ]);
        assert!(text.starts_with("Found 2 device(s)"));
        assert!(text.contains("Anemoi 01"));
        assert!(text.contains("-60 dBm"));
        assert!(text.contains("Unknown"));
    }

    #[test]
    fn test_scan_json() {
        let json = format_scan_json(&[discovery("AA:BB", Some("Anemoi 01"), Some(-60))]).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed[0]["id"], "AA:BB");
        assert_eq!(parsed[0]["rssi"], -60);
    }

    #[test]
    fn test_watch_line() {
        let record = TelemetryRecord {
            percentage_o2: 20.9,
            o2_sensor_voltage: f64::NAN,
            atmospheric_pressure: 1013.25,
            temperature: 21.5,
            ..TelemetryRecord::ZERO
        };
        let line = format_watch_line(&record, Humidity::Unavailable, datetime!(2024-05-01 10:00 UTC));
        assert!(line.starts_with("2024-05-01T10:00:00Z"));
        assert!(line.contains("O2 20.9%"));
        assert!(line.contains("O2 cell NaNmV"));
        assert!(line.contains("P 1013mbar"));
        assert!(line.contains("T 21.5°C"));
        assert!(line.ends_with("RH --\n"));
    }

    #[test]
    fn test_watch_json_nulls_nan() {
        let device = PeripheralHandle::new("AA:BB", Some("Anemoi 01".to_string()));
        let record = TelemetryRecord {
            percentage_o2: 32.0,
            percentage_he: f64::NAN,
            ..TelemetryRecord::ZERO
        };
        let json = format_watch_json(&device, &record, datetime!(2024-05-01 10:00 UTC)).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["percentageO2"], 32.0);
        assert!(parsed["percentageHe"].is_null());
        assert_eq!(parsed["device"], "AA:BB");
    }

    #[test]
    fn test_history_text() {
        assert_eq!(format_history_text(&[]), "No saved measurements.\n");
        let text = format_history_text(&[MeasurementSample {
            timestamp: datetime!(2024-05-01 10:00 UTC),
            o2_sensor_voltage: 10.41,
            he_sensor_voltage: 0.8,
        }]);
        assert!(text.contains("History (1 measurements)"));
        assert!(text.contains("10.41"));
        assert!(text.contains("0.80"));
    }

    #[test]
    fn test_chart_line() {
        let mut charts = ChartSet::new(["ppO2", "altitude"]);
        assert_eq!(format_chart_line(&charts), "ppO2=--  altitude=--\n");
        charts.ingest(
            r#"{"ppO2":"0.21"}"#,
            datetime!(2024-05-01 10:00 UTC),
            MalformedFramePolicy::RecordNaN,
        );
        assert_eq!(format_chart_line(&charts), "ppO2=0.21  altitude=NaN\n");
    }
}
