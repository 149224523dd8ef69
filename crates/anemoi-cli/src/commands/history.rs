//! History command implementation.

use std::path::PathBuf;

use anemoi_core::MeasurementHistory;
use anemoi_types::MeasurementSample;
use anyhow::{Context, Result};
use time::OffsetDateTime;

use crate::cli::{HistoryAction, OutputFormat};
use crate::config::{Config, resolve_history_path};
use crate::format::{format_history_json, format_history_text};

/// The history file named by flag or config, else the platform default.
pub(crate) fn open_history(path: Option<PathBuf>, config: &Config) -> Result<MeasurementHistory> {
    match resolve_history_path(path, config) {
        Some(path) => Ok(MeasurementHistory::new(path)),
        None => MeasurementHistory::open_default().context("Failed to locate history file"),
    }
}

pub fn cmd_history(
    action: HistoryAction,
    path: Option<PathBuf>,
    config: &Config,
    quiet: bool,
) -> Result<()> {
    let history = open_history(path, config)?;

    match action {
        HistoryAction::List { format } => {
            let samples = history
                .load()
                .with_context(|| format!("Failed to read {}", history.path().display()))?;
            let content = match format {
                OutputFormat::Json => format_history_json(&samples)?,
                OutputFormat::Text => format_history_text(&samples),
            };
            print!("{}", content);
        }
        HistoryAction::Record { o2, he } => {
            let sample = MeasurementSample {
                timestamp: OffsetDateTime::now_utc(),
                o2_sensor_voltage: o2,
                he_sensor_voltage: he,
            };
            let samples = history
                .record(sample)
                .with_context(|| format!("Failed to write {}", history.path().display()))?;
            if !quiet {
                eprintln!("Saved measurement ({} total).", samples.len());
            }
        }
        HistoryAction::Clear => {
            history
                .clear()
                .with_context(|| format!("Failed to write {}", history.path().display()))?;
            if !quiet {
                eprintln!("Measurement history cleared.");
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_flag_path_wins_over_config() {
        let dir = TempDir::new().unwrap();
        let config = Config {
            history_path: Some(dir.path().join("config.json")),
            ..Default::default()
        };
        let history = open_history(Some(dir.path().join("flag.json")), &config).unwrap();
        assert_eq!(history.path(), dir.path().join("flag.json"));

        let history = open_history(None, &config).unwrap();
        assert_eq!(history.path(), dir.path().join("config.json"));
    }

    #[test]
    fn test_record_then_clear() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.json");
        let config = Config::default();

        cmd_history(
            HistoryAction::Record { o2: 10.4, he: 0.8 },
            Some(path.clone()),
            &config,
            true,
        )
        .unwrap();
        let saved = MeasurementHistory::new(&path).load().unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].o2_sensor_voltage, 10.4);

        cmd_history(HistoryAction::Clear, Some(path.clone()), &config, true).unwrap();
        assert!(MeasurementHistory::new(&path).load().unwrap().is_empty());
    }
}
