//! Calibrate command implementation.

use anemoi_core::BtleCentral;
use anyhow::{Context, Result};

use crate::cli::DeviceArgs;
use crate::config::{Config, resolve_device};
use crate::util::{connect_analyzer, connect_timeout, manager_config};

pub async fn cmd_calibrate(args: DeviceArgs, config: &Config, quiet: bool) -> Result<()> {
    let identifier = resolve_device(args.device.clone(), config);
    let central = BtleCentral::new()
        .await
        .context("Failed to open Bluetooth adapter")?;
    let (manager, handle) = connect_analyzer(
        central,
        identifier.as_deref(),
        connect_timeout(&args, config),
        manager_config(&args, config),
    )
    .await?;

    let sent = manager.send_calibrate().await;
    manager.disconnect().await;
    sent.with_context(|| format!("Failed to send calibration command to {}", handle))?;

    if !quiet {
        println!("Calibration command sent to {}.", handle);
    }
    Ok(())
}
