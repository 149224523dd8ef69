//! CLI Integration Tests
//!
//! These tests run the built binary. Commands that need an analyzer are
//! marked with #[ignore].
//!
//! Run hardware tests:
//! ```
//! ANEMOI_DEVICE="Anemoi 01" cargo test --package anemoi-cli --test cli_integration -- --ignored --nocapture
//! ```

use std::env;
use std::process::{Command, Output};

use tempfile::TempDir;

/// Run the anemoi binary with an isolated config directory.
fn run_anemoi(args: &[&str], home: &TempDir) -> Output {
    Command::new(env!("CARGO_BIN_EXE_anemoi"))
        .args(args)
        .env("HOME", home.path())
        .env("XDG_CONFIG_HOME", home.path().join("config"))
        .env("XDG_DATA_HOME", home.path().join("data"))
        .env_remove("ANEMOI_DEVICE")
        .output()
        .expect("Failed to run anemoi binary")
}

fn get_device() -> Option<String> {
    env::var("ANEMOI_DEVICE").ok().filter(|s| !s.is_empty())
}

// =============================================================================
// Help and Version Tests (no hardware required)
// =============================================================================

#[test]
fn test_help_command() {
    let home = TempDir::new().unwrap();
    let output = run_anemoi(&["--help"], &home);
    assert!(output.status.success(), "Help should succeed");

    let stdout = String::from_utf8_lossy(&output.stdout);
    for cmd in ["scan", "watch", "calibrate", "bridge", "history"] {
        assert!(stdout.contains(cmd), "Help should list {}", cmd);
    }
}

#[test]
fn test_version_command() {
    let home = TempDir::new().unwrap();
    let output = run_anemoi(&["--version"], &home);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("anemoi"));
}

#[test]
fn test_subcommand_help() {
    let home = TempDir::new().unwrap();
    for cmd in ["scan", "watch", "calibrate", "bridge", "history", "config"] {
        let output = run_anemoi(&[cmd, "--help"], &home);
        assert!(output.status.success(), "{} --help should succeed", cmd);
        assert!(!output.stdout.is_empty(), "{} --help should produce output", cmd);
    }
}

#[test]
fn test_completions() {
    let home = TempDir::new().unwrap();
    let output = run_anemoi(&["completions", "bash"], &home);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("anemoi"));
}

// =============================================================================
// History Commands (no device required)
// =============================================================================

#[test]
fn test_history_record_list_clear() {
    let home = TempDir::new().unwrap();
    let file = home.path().join("history.json");
    let path = file.to_str().unwrap();

    let output = run_anemoi(&["history", "--path", path, "record", "--o2", "10.41", "--he", "0.80"], &home);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let output = run_anemoi(&["history", "--path", path, "list", "--format", "json"], &home);
    assert!(output.status.success());
    let samples: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(samples.as_array().unwrap().len(), 1);
    assert_eq!(samples[0]["o2SensorVoltage"], 10.41);

    let output = run_anemoi(&["history", "--path", path, "clear"], &home);
    assert!(output.status.success());

    let output = run_anemoi(&["history", "--path", path, "list"], &home);
    assert!(String::from_utf8_lossy(&output.stdout).contains("No saved measurements"));
}

// =============================================================================
// Bridge (no device required)
// =============================================================================

#[test]
fn test_bridge_rejects_http_url() {
    let home = TempDir::new().unwrap();
    let output = run_anemoi(&["bridge", "--url", "http://192.168.1.154/ws"], &home);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("ws://"));
}

// =============================================================================
// Hardware Tests
// =============================================================================

#[test]
#[ignore = "requires BLE hardware"]
fn test_scan_finds_analyzer() {
    let home = TempDir::new().unwrap();
    let output = run_anemoi(&["scan", "--timeout", "10", "--format", "json"], &home);
    assert!(output.status.success());
    let devices: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert!(!devices.as_array().unwrap().is_empty(), "No analyzers found");
}

#[test]
#[ignore = "requires BLE hardware"]
fn test_watch_receives_updates() {
    let Some(device) = get_device() else {
        eprintln!("Skipping: ANEMOI_DEVICE not set");
        return;
    };
    let home = TempDir::new().unwrap();
    let output = run_anemoi(&["watch", "--device", &device, "--count", "2", "--format", "json"], &home);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(String::from_utf8_lossy(&output.stdout).lines().count(), 2);
}
