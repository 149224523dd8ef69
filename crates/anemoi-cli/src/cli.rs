//! CLI argument definitions using clap.

use std::path::PathBuf;

use anemoi_core::{DisconnectPolicy, MalformedFramePolicy, TelemetryDecoder};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};

/// Default seconds to wait for an analyzer
pub const DEFAULT_CONNECT_TIMEOUT: u64 = 15;

/// Output format for commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Notification layout of the analyzer firmware
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Protocol {
    /// One characteristic per sensor channel
    #[default]
    PerChannel,
    /// A single characteristic carrying a JSON document
    Composite,
}

impl From<Protocol> for TelemetryDecoder {
    fn from(protocol: Protocol) -> Self {
        match protocol {
            Protocol::PerChannel => TelemetryDecoder::PerChannel,
            Protocol::Composite => TelemetryDecoder::Composite,
        }
    }
}

#[derive(Parser)]
#[command(name = "anemoi")]
#[command(author, version, about = "CLI for the Anemoi gas analyzer", long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scan for nearby analyzers
    Scan {
        /// Scan timeout in seconds
        #[arg(short, long, default_value = "5")]
        timeout: u64,

        /// List every peripheral, not only analyzers
        #[arg(short, long)]
        all: bool,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Connect to an analyzer and stream live telemetry
    Watch(WatchArgs),

    /// Send the calibration command to an analyzer
    Calibrate {
        #[command(flatten)]
        device: DeviceArgs,
    },

    /// Chart frames from the WebSocket gateway
    Bridge(BridgeArgs),

    /// Manage saved sensor measurements
    History {
        /// History file (defaults to the platform data directory)
        #[arg(long, global = true)]
        path: Option<PathBuf>,

        #[command(subcommand)]
        action: HistoryAction,
    },

    /// Manage CLI configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

/// Reusable device connection arguments
#[derive(Debug, Clone, Args)]
pub struct DeviceArgs {
    /// Device identifier (MAC address, UUID or advertised name), or use ANEMOI_DEVICE env var
    #[arg(short, long, env = "ANEMOI_DEVICE")]
    pub device: Option<String>,

    /// Seconds to wait for the device to appear and connect
    #[arg(short = 'T', long, default_value_t = DEFAULT_CONNECT_TIMEOUT)]
    pub timeout: u64,

    /// Firmware notification layout (overrides config)
    #[arg(short, long, value_enum)]
    pub protocol: Option<Protocol>,
}

#[derive(Debug, Clone, Args)]
pub struct WatchArgs {
    #[command(flatten)]
    pub device: DeviceArgs,

    /// Keep the last known values on screen after a disconnect
    #[arg(long)]
    pub keep_last_known: bool,

    /// Stop after this many updates (0 for unlimited)
    #[arg(short, long, default_value = "0")]
    pub count: u32,

    /// Save the final sensor voltages to the measurement history on exit
    #[arg(long)]
    pub save: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

impl WatchArgs {
    /// Disconnect policy for this invocation, with the config as fallback.
    pub fn disconnect_policy(&self, config_keeps: bool) -> DisconnectPolicy {
        if self.keep_last_known || config_keeps {
            DisconnectPolicy::KeepLastKnown
        } else {
            DisconnectPolicy::ResetTelemetry
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct BridgeArgs {
    /// Gateway endpoint (overrides config)
    #[arg(short, long)]
    pub url: Option<String>,

    /// Frame keys to chart, comma-separated
    #[arg(short, long, value_delimiter = ',')]
    pub charts: Vec<String>,

    /// Drop frames that are not JSON objects instead of charting NaN
    #[arg(long)]
    pub discard_malformed: bool,
}

impl BridgeArgs {
    pub fn malformed_policy(&self) -> MalformedFramePolicy {
        if self.discard_malformed {
            MalformedFramePolicy::Discard
        } else {
            MalformedFramePolicy::RecordNaN
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
pub enum HistoryAction {
    /// List saved measurements, most recent first
    List {
        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
    /// Save a pair of sensor voltages
    Record {
        /// Oxygen sensor voltage in millivolts
        #[arg(long)]
        o2: f64,
        /// Helium sensor voltage in millivolts
        #[arg(long)]
        he: f64,
    },
    /// Remove every saved measurement
    Clear,
}

#[derive(Debug, Clone, Subcommand)]
pub enum ConfigAction {
    /// Print the config file path
    Path,
    /// Show the current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Key (device, protocol, timeout, keep-last-known, bridge-url, history-path)
        key: String,
        /// Value
        value: String,
    },
    /// Remove a configuration value
    Unset {
        /// Key to remove
        key: String,
    },
}
