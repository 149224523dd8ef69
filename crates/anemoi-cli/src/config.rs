//! Configuration file management.

use std::fs;
use std::path::{Path, PathBuf};

use anemoi_core::bridge::DEFAULT_BRIDGE_URL;
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::cli::Protocol;

/// Configuration file structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Default device identifier
    #[serde(default)]
    pub device: Option<String>,

    /// Firmware notification layout
    #[serde(default)]
    pub protocol: Option<Protocol>,

    /// Connection timeout in seconds
    #[serde(default)]
    pub timeout: Option<u64>,

    /// Keep the last known values after a disconnect
    #[serde(default)]
    pub keep_last_known: bool,

    /// WebSocket gateway endpoint
    #[serde(default)]
    pub bridge_url: Option<String>,

    /// Measurement history file
    #[serde(default)]
    pub history_path: Option<PathBuf>,
}

impl Config {
    /// Get the config file path
    pub fn path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("anemoi")
            .join("config.toml")
    }

    /// Load config from file, or return default if not found
    pub fn load() -> Self {
        Self::load_from(&Self::path())
    }

    /// Load config from `path`, warning on stderr if it cannot be used.
    pub fn load_from(path: &Path) -> Self {
        if path.exists() {
            match fs::read_to_string(path) {
                Ok(content) => match toml::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        eprintln!("Warning: Failed to parse config: {}", e);
                    }
                },
                Err(e) => {
                    eprintln!("Warning: Failed to read config: {}", e);
                }
            }
        }
        Self::default()
    }

    /// Save config to file
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::path())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write config: {}", path.display()))?;
        Ok(())
    }

    /// Set a value by its command-line key.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "device" => self.device = Some(value.to_string()),
            "protocol" => {
                self.protocol = Some(match value {
                    "per-channel" => Protocol::PerChannel,
                    "composite" => Protocol::Composite,
                    other => bail!("Unknown protocol '{}': use per-channel or composite", other),
                })
            }
            "timeout" => {
                let secs: u64 = value
                    .parse()
                    .with_context(|| format!("Invalid timeout '{}'", value))?;
                if secs == 0 {
                    bail!("Timeout must be at least 1 second");
                }
                self.timeout = Some(secs);
            }
            "keep-last-known" => {
                self.keep_last_known = value
                    .parse()
                    .with_context(|| format!("Invalid boolean '{}'", value))?
            }
            "bridge-url" => self.bridge_url = Some(value.to_string()),
            "history-path" => self.history_path = Some(PathBuf::from(value)),
            other => bail!("Unknown config key '{}'", other),
        }
        Ok(())
    }

    /// Clear a value by its command-line key.
    pub fn unset(&mut self, key: &str) -> Result<()> {
        match key {
            "device" => self.device = None,
            "protocol" => self.protocol = None,
            "timeout" => self.timeout = None,
            "keep-last-known" => self.keep_last_known = false,
            "bridge-url" => self.bridge_url = None,
            "history-path" => self.history_path = None,
            other => bail!("Unknown config key '{}'", other),
        }
        Ok(())
    }
}

/// Resolve device from arg, env var, or config.
pub fn resolve_device(device: Option<String>, config: &Config) -> Option<String> {
    device.or_else(|| config.device.clone())
}

pub fn resolve_timeout(cmd_timeout: u64, config: &Config, default: u64) -> u64 {
    // An explicit flag wins over the config
    if cmd_timeout != default {
        cmd_timeout
    } else {
        config.timeout.unwrap_or(default)
    }
}

pub fn resolve_protocol(protocol: Option<Protocol>, config: &Config) -> Protocol {
    protocol.or(config.protocol).unwrap_or_default()
}

pub fn resolve_bridge_url(url: Option<String>, config: &Config) -> String {
    url.or_else(|| config.bridge_url.clone())
        .unwrap_or_else(|| DEFAULT_BRIDGE_URL.to_string())
}

pub fn resolve_history_path(path: Option<PathBuf>, config: &Config) -> Option<PathBuf> {
    path.or_else(|| config.history_path.clone())
}
