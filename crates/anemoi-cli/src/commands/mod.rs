//! Command implementations for the CLI.

mod bridge;
mod calibrate;
mod config;
mod history;
mod scan;
mod watch;

pub use bridge::cmd_bridge;
pub use calibrate::cmd_calibrate;
pub use config::cmd_config;
pub use history::cmd_history;
pub use scan::cmd_scan;
pub use watch::cmd_watch;
