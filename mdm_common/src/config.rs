//! Configuration loading traits and types.
//!
//! This module provides a standardized way to load TOML configuration files
//! across all multi-DM applications, and the DM server configuration itself.
//!
//! # Usage
//!
//! ```rust,no_run
//! use mdm_common::config::{ConfigLoader, SharedConfig, ConfigError};
//! use serde::Deserialize;
//! use std::path::Path;
//!
//! #[derive(Debug, Deserialize)]
//! struct MyAppConfig {
//!     shared: SharedConfig,
//!     port: u16,
//! }
//!
//! fn main() -> Result<(), ConfigError> {
//!     let config = MyAppConfig::load(Path::new("config.toml"))?;
//!     println!("Service: {}", config.shared.service_name);
//!     Ok(())
//! }
//! ```

use crate::consts::{
    DEFAULT_ACTION_LOG, DEFAULT_CHANNEL_COUNT, DEFAULT_DM_SERIALS, DEFAULT_DRIVER,
    DEFAULT_POLL_INTERVAL_US, MAX_CHANNELS,
};
use crate::shm::consts::DEFAULT_SHM_DIR;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Error type for configuration loading operations.
///
/// This enum represents all possible errors that can occur when loading
/// configuration files.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found at specified path.
    #[error("Configuration file not found")]
    FileNotFound,

    /// TOML parsing failed.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Semantic validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Log level for application logging.
///
/// Represents the verbosity level of logging output.
/// Uses lowercase serde values for TOML compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Most verbose, detailed tracing information.
    Trace,
    /// Debug information useful during development.
    Debug,
    /// General information about application operation.
    #[default]
    Info,
    /// Warning messages for potentially problematic situations.
    Warn,
    /// Error messages for serious problems.
    Error,
}

impl LogLevel {
    /// Directive string understood by `tracing_subscriber::EnvFilter`.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Common configuration fields shared across all multi-DM applications.
///
/// This struct should be embedded in application-specific configuration
/// structs to provide consistent base configuration.
///
/// # TOML Example
///
/// ```toml
/// [shared]
/// log_level = "debug"
/// service_name = "asgard-mdm"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedConfig {
    /// Logging verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Application instance identifier.
    pub service_name: String,
}

impl SharedConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if:
    /// - `service_name` is empty
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.is_empty() {
            return Err(ConfigError::ValidationError(
                "service_name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Trait for loading configuration from TOML files.
///
/// This trait provides a default implementation that works with any type
/// implementing `serde::de::DeserializeOwned`.
///
/// # Contract
///
/// - Returns `ConfigError::FileNotFound` if the file does not exist
/// - Returns `ConfigError::ParseError` if TOML syntax is invalid
/// - Returns `ConfigError::ValidationError` if semantic validation fails
///
/// # Example
///
/// ```rust,no_run
/// use mdm_common::config::{ConfigLoader, SharedConfig, ConfigError};
/// use serde::Deserialize;
/// use std::path::Path;
///
/// #[derive(Debug, Deserialize)]
/// struct AppConfig {
///     shared: SharedConfig,
/// }
///
/// fn main() -> Result<(), ConfigError> {
///     let config = AppConfig::load(Path::new("config.toml"))?;
///     Ok(())
/// }
/// ```
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    /// Load configuration from a TOML file.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the TOML configuration file
    ///
    /// # Returns
    ///
    /// * `Ok(Self)` - Successfully loaded and parsed configuration
    /// * `Err(ConfigError)` - Loading or parsing failed
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound
            } else {
                ConfigError::ParseError(e.to_string())
            }
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

// Blanket implementation for all types that implement DeserializeOwned.
// This allows any serde-deserializable struct to use ConfigLoader.
impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}

// ─── DM Server Configuration ────────────────────────────────────────

/// Identity of one deformable mirror.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Vendor serial number passed to the driver on open.
    pub serial: String,
}

/// Runtime parameters of the DM server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    /// Driver name looked up in the driver registry.
    pub driver: String,
    /// Number of writable channels per DM at startup.
    pub channels: usize,
    /// Directory holding the shared-memory image segments.
    pub shm_dir: PathBuf,
    /// Delay between two channel polls in microseconds.
    pub poll_interval_us: u64,
    /// Append-only action log.
    pub action_log: PathBuf,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            driver: DEFAULT_DRIVER.to_string(),
            channels: DEFAULT_CHANNEL_COUNT,
            shm_dir: PathBuf::from(DEFAULT_SHM_DIR),
            poll_interval_us: DEFAULT_POLL_INTERVAL_US,
            action_log: PathBuf::from(DEFAULT_ACTION_LOG),
        }
    }
}

/// Per-device hardware send timing log.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingLogConfig {
    /// Record one UNIX timestamp per hardware send.
    pub enabled: bool,
    /// Directory receiving `speed_log_<device>.log` files.
    pub dir: PathBuf,
}

/// Complete DM server configuration.
///
/// # TOML Example
///
/// ```toml
/// [shared]
/// service_name = "asgard-mdm"
///
/// [server]
/// driver = "simulation"
/// channels = 4
///
/// [[devices]]
/// serial = "17DW019#113"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Common fields.
    pub shared: SharedConfig,
    /// Server runtime parameters.
    #[serde(default)]
    pub server: ServerSection,
    /// Timing log settings.
    #[serde(default)]
    pub timing_log: TimingLogConfig,
    /// Served DMs, device 1 first.
    #[serde(default = "default_devices")]
    pub devices: Vec<DeviceConfig>,
}

fn default_devices() -> Vec<DeviceConfig> {
    DEFAULT_DM_SERIALS
        .iter()
        .map(|serial| DeviceConfig {
            serial: serial.to_string(),
        })
        .collect()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            shared: SharedConfig {
                log_level: LogLevel::Info,
                service_name: "asgard-mdm".to_string(),
            },
            server: ServerSection::default(),
            timing_log: TimingLogConfig::default(),
            devices: default_devices(),
        }
    }
}

impl ServerConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if:
    /// - the shared section is invalid
    /// - no device is configured, or a serial is empty or duplicated
    /// - `channels` is outside `1..=MAX_CHANNELS`
    /// - `driver` is empty
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;

        if self.devices.is_empty() {
            return Err(ConfigError::ValidationError(
                "at least one device must be configured".to_string(),
            ));
        }

        let mut serials = HashSet::new();
        for device in &self.devices {
            if device.serial.is_empty() {
                return Err(ConfigError::ValidationError(
                    "device serial cannot be empty".to_string(),
                ));
            }
            if !serials.insert(device.serial.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate device serial: {}",
                    device.serial
                )));
            }
        }

        if self.server.channels == 0 || self.server.channels > MAX_CHANNELS {
            return Err(ConfigError::ValidationError(format!(
                "channels must be in 1..={MAX_CHANNELS}, got {}",
                self.server.channels
            )));
        }

        if self.server.driver.is_empty() {
            return Err(ConfigError::ValidationError(
                "driver cannot be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Delay between two channel polls.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_micros(self.server.poll_interval_us)
    }
}

/// Load and validate the DM server configuration.
pub fn load_server_config(path: &Path) -> Result<ServerConfig, ConfigError> {
    let config = ServerConfig::load(path)?;
    config.validate()?;
    Ok(config)
}
