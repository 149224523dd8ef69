//! Watch command implementation.
//!
//! Connects once and prints a line whenever the telemetry changes. A lost
//! link ends the command; reconnecting is left to the caller.

use anemoi_core::BtleCentral;
use anemoi_types::MeasurementSample;
use anyhow::{Context, Result, bail};
use time::OffsetDateTime;

use crate::cli::{OutputFormat, WatchArgs};
use crate::commands::history::open_history;
use crate::config::{Config, resolve_device};
use crate::format::{format_watch_json, format_watch_line};
use crate::util::{connect_analyzer, connect_timeout, manager_config};

pub async fn cmd_watch(args: WatchArgs, config: &Config, quiet: bool) -> Result<()> {
    let identifier = resolve_device(args.device.device.clone(), config);
    let settings = manager_config(&args.device, config)
        .disconnect_policy(args.disconnect_policy(config.keep_last_known));

    let central = BtleCentral::new()
        .await
        .context("Failed to open Bluetooth adapter")?;
    let (manager, handle) = connect_analyzer(
        central,
        identifier.as_deref(),
        connect_timeout(&args.device, config),
        settings,
    )
    .await?;

    if !quiet {
        eprintln!("Connected to {}. Press Ctrl+C to stop.", handle);
    }

    let mut rx = manager.store().subscribe();
    let mut last = rx.borrow_and_update().telemetry;
    let mut updates: u32 = 0;
    let mut lost = false;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                eprintln!("\nShutting down...");
                break;
            }
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = rx.borrow_and_update().clone();
                if !snapshot.connection.is_connected() {
                    lost = true;
                    break;
                }
                if snapshot.telemetry == last {
                    continue;
                }
                last = snapshot.telemetry;

                let now = OffsetDateTime::now_utc();
                let line = match args.format {
                    OutputFormat::Json => format_watch_json(&handle, &last, now)?,
                    OutputFormat::Text => format_watch_line(&last, snapshot.humidity, now),
                };
                print!("{}", line);

                updates += 1;
                if args.count > 0 && updates >= args.count {
                    if !quiet {
                        eprintln!("Completed {} updates.", updates);
                    }
                    break;
                }
            }
        }
    }

    manager.disconnect().await;

    if args.save {
        let history = open_history(None, config)?;
        let sample = MeasurementSample::from_record(&last, OffsetDateTime::now_utc());
        history
            .record(sample)
            .with_context(|| format!("Failed to write {}", history.path().display()))?;
        if !quiet {
            eprintln!(
                "Saved O2 {:.2} mV / He {:.2} mV to {}",
                sample.o2_sensor_voltage,
                sample.he_sensor_voltage,
                history.path().display()
            );
        }
    }

    if lost {
        bail!("Connection to {} lost", handle);
    }
    Ok(())
}
