//! Config command implementation.

use anyhow::{Context, Result};

use crate::cli::ConfigAction;
use crate::config::Config;

pub fn cmd_config(action: ConfigAction, mut config: Config) -> Result<()> {
    match action {
        ConfigAction::Path => println!("{}", Config::path().display()),
        ConfigAction::Show => {
            let content = toml::to_string_pretty(&config).context("Failed to serialize config")?;
            if content.trim().is_empty() {
                println!("# No configuration set ({})", Config::path().display());
            } else {
                print!("{}", content);
            }
        }
        ConfigAction::Set { key, value } => {
            config.set(&key, &value)?;
            config.save()?;
            eprintln!("Set {} = {}", key, value);
        }
        ConfigAction::Unset { key } => {
            config.unset(&key)?;
            config.save()?;
            eprintln!("Unset {}", key);
        }
    }
    Ok(())
}
