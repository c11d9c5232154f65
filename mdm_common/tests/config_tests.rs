//! Server configuration loading tests.
//!
//! Tests for `load_server_config()`: the shipped example file, section
//! defaults, device list handling and validation failures.

use mdm_common::config::{ConfigError, LogLevel, load_server_config};
use mdm_common::consts::{DEFAULT_DM_SERIALS, DEFAULT_POLL_INTERVAL_US};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

/// Write `content` as mdm.toml in a fresh directory.
fn write_config(content: &str) -> (TempDir, PathBuf) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("mdm.toml");
    fs::write(&path, content).unwrap();
    (dir, path)
}

#[test]
fn test_shipped_example_config_loads() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../config/mdm.toml");
    let config = load_server_config(&path).unwrap();

    assert_eq!(config.shared.service_name, "asgard-mdm");
    assert_eq!(config.server.driver, "simulation");
    assert_eq!(config.server.channels, 4);
    assert_eq!(config.server.shm_dir, PathBuf::from("/dev/shm"));
    assert!(!config.timing_log.enabled);

    let serials: Vec<&str> = config.devices.iter().map(|d| d.serial.as_str()).collect();
    assert_eq!(serials, DEFAULT_DM_SERIALS);
}

#[test]
fn test_sections_default_when_missing() {
    let (_dir, path) = write_config(
        r#"
[shared]
service_name = "mdm-test"
"#,
    );
    let config = load_server_config(&path).unwrap();

    assert_eq!(config.shared.log_level, LogLevel::Info);
    assert_eq!(config.devices.len(), DEFAULT_DM_SERIALS.len());
    assert_eq!(
        config.poll_interval(),
        Duration::from_micros(DEFAULT_POLL_INTERVAL_US)
    );
}

#[test]
fn test_custom_devices_and_timing_log() {
    let (_dir, path) = write_config(
        r#"
[shared]
log_level = "debug"
service_name = "mdm-test"

[server]
channels = 8
poll_interval_us = 0

[timing_log]
enabled = true
dir = "/tmp/mdm-timing"

[[devices]]
serial = "LAB#1"

[[devices]]
serial = "LAB#2"
"#,
    );
    let config = load_server_config(&path).unwrap();

    assert_eq!(config.shared.log_level, LogLevel::Debug);
    assert_eq!(config.server.channels, 8);
    assert_eq!(config.poll_interval(), Duration::ZERO);
    assert!(config.timing_log.enabled);
    assert_eq!(config.timing_log.dir, PathBuf::from("/tmp/mdm-timing"));
    assert_eq!(config.devices.len(), 2);
    assert_eq!(config.devices[1].serial, "LAB#2");
}

#[test]
fn test_too_many_channels_rejected() {
    let (_dir, path) = write_config(
        r#"
[shared]
service_name = "mdm-test"

[server]
channels = 100
"#,
    );
    let result = load_server_config(&path);
    assert!(matches!(result, Err(ConfigError::ValidationError(_))));
}

#[test]
fn test_empty_device_list_rejected() {
    let (_dir, path) = write_config(
        r#"
devices = []

[shared]
service_name = "mdm-test"
"#,
    );
    let result = load_server_config(&path);
    assert!(matches!(result, Err(ConfigError::ValidationError(_))));
}

#[test]
fn test_malformed_file_is_parse_error() {
    let (_dir, path) = write_config("[server\nchannels = ");
    let result = load_server_config(&path);
    assert!(matches!(result, Err(ConfigError::ParseError(_))));
}

#[test]
fn test_missing_file() {
    let result = load_server_config(Path::new("/nonexistent/mdm.toml"));
    assert!(matches!(result, Err(ConfigError::FileNotFound)));
}
