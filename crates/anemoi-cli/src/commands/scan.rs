//! Scan command implementation.

use anemoi_core::{BtleCentral, ScanOptions, scan_with_options};
use anyhow::{Context, Result};

use crate::cli::OutputFormat;
use crate::format::{format_scan_json, format_scan_text};

pub async fn cmd_scan(timeout: u64, all: bool, format: OutputFormat, quiet: bool) -> Result<()> {
    if !quiet && format == OutputFormat::Text {
        eprintln!("Scanning for {}s...", timeout);
    }

    let mut options = ScanOptions::new().duration_secs(timeout);
    if all {
        options = options.all_devices();
    }

    let central = BtleCentral::new()
        .await
        .context("Failed to open Bluetooth adapter")?;
    let devices = scan_with_options(&central, &options)
        .await
        .context("Failed to scan for devices")?;

    let content = match format {
        OutputFormat::Json => format_scan_json(&devices)?,
        OutputFormat::Text => format_scan_text(&devices),
    };
    print!("{}", content);
    Ok(())
}
