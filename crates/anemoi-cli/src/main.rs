use std::io;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;
mod config;
mod format;
mod util;

use cli::{Cli, Commands};
use config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Handle completions command early (before tracing init)
    let command = match cli.command {
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "anemoi", &mut io::stdout());
            return Ok(());
        }
        command => command,
    };

    // When quiet mode is enabled, suppress info-level logging
    let filter = if cli.quiet {
        EnvFilter::new("warn")
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let config = Config::load();
    tracing::debug!(path = %Config::path().display(), "Loaded config");
    let quiet = cli.quiet;

    match command {
        Commands::Scan {
            timeout,
            all,
            format,
        } => commands::cmd_scan(timeout, all, format, quiet).await,
        Commands::Watch(args) => commands::cmd_watch(args, &config, quiet).await,
        Commands::Calibrate { device } => commands::cmd_calibrate(device, &config, quiet).await,
        Commands::Bridge(args) => commands::cmd_bridge(args, &config, quiet).await,
        Commands::History { path, action } => commands::cmd_history(action, path, &config, quiet),
        Commands::Config { action } => commands::cmd_config(action, config),
        Commands::Completions { .. } => Ok(()),
    }
}
