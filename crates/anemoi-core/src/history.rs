//! Saved sensor voltage history.
//!
//! Each time the user saves a measurement, the current O2 and He sensor
//! voltages are recorded with a timestamp so cell drift can be tracked over
//! time. The list is stored as one JSON array, most recent first, and is
//! rewritten in full on every change.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anemoi_types::MeasurementSample;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Name of the storage slot holding the history.
pub const HISTORY_SLOT: &str = "sensor-measurements";

/// Default history file: `<data dir>/anemoi/sensor-measurements.json`.
pub fn default_path() -> Option<PathBuf> {
    dirs::data_dir().map(|dir| dir.join("anemoi").join(format!("{HISTORY_SLOT}.json")))
}

/// A measurement history backed by a JSON file.
#[derive(Debug, Clone)]
pub struct MeasurementHistory {
    path: PathBuf,
}

impl MeasurementHistory {
    /// Use the history file at `path`. Nothing is read until [`load`](Self::load).
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Use the history file at [`default_path`].
    pub fn open_default() -> Result<Self> {
        default_path()
            .map(Self::new)
            .ok_or_else(|| Error::invalid_config("no platform data directory"))
    }

    /// The backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every saved sample, most recent first.
    ///
    /// A missing file is an empty history.
    pub fn load(&self) -> Result<Vec<MeasurementSample>> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No history file yet");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&text)?)
    }

    /// Save a sample at the front of the history and return the new list.
    pub fn record(&self, sample: MeasurementSample) -> Result<Vec<MeasurementSample>> {
        let mut samples = self.load()?;
        samples.insert(0, sample);
        self.save(&samples)?;
        info!(count = samples.len(), "Measurement saved");
        Ok(samples)
    }

    /// Remove every saved sample.
    pub fn clear(&self) -> Result<()> {
        self.save(&[])?;
        info!("Measurement history cleared");
        Ok(())
    }

    fn save(&self, samples: &[MeasurementSample]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(samples)?;
        fs::write(&self.path, json)?;
        Ok(())
    }
}
