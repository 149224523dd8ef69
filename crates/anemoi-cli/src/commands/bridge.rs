//! Bridge command implementation.

use std::sync::Arc;

use anemoi_core::{BridgeClient, BridgeConfig};
use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use crate::cli::BridgeArgs;
use crate::config::{Config, resolve_bridge_url};
use crate::format::format_chart_line;

pub async fn cmd_bridge(args: BridgeArgs, config: &Config, quiet: bool) -> Result<()> {
    let mut settings = BridgeConfig::default()
        .url(resolve_bridge_url(args.url.clone(), config))
        .malformed_frames(args.malformed_policy());
    if !args.charts.is_empty() {
        settings = settings.charts(args.charts.iter().cloned());
    }
    settings.validate().context("Invalid bridge settings")?;

    let client = Arc::new(BridgeClient::new(settings));
    let cancel = CancellationToken::new();
    let mut run = tokio::spawn({
        let client = Arc::clone(&client);
        let cancel = cancel.clone();
        async move { client.run(cancel).await }
    });

    let mut charts = client.charts();
    let mut ready = client.ready_state();

    loop {
        tokio::select! {
            result = &mut run => {
                result.context("Bridge task failed")?.with_context(|| {
                    format!("Bridge connection to {} failed", client.config().url)
                })?;
                break;
            }
            _ = tokio::signal::ctrl_c(), if !cancel.is_cancelled() => {
                eprintln!("\nShutting down...");
                cancel.cancel();
            }
            Ok(()) = ready.changed() => {
                if !quiet {
                    eprintln!("Gateway: {}", *ready.borrow_and_update());
                }
            }
            Ok(()) = charts.changed() => {
                let line = format_chart_line(&charts.borrow_and_update());
                print!("{}", line);
            }
        }
    }
    Ok(())
}
