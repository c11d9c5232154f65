//! Deformable mirror driver trait and error types.
//!
//! This module defines:
//! - `DmDriver` trait - Interface for pluggable DM drivers
//! - `DriverError` enum - Error types for driver operations
//! - `DriverFactory` type alias - Factory function type
//! - `DeviceInfo` / `ActuatorMapping` - What a driver reports on open

use crate::consts::MAX_DM_SIZE;
use thiserror::Error;

/// Error types for DM driver operations.
#[derive(Debug, Clone, Error)]
pub enum DriverError {
    /// Device could not be opened
    #[error("Failed to open device {serial}: {reason}")]
    OpenFailed {
        /// Serial number requested
        serial: String,
        /// Driver-reported reason
        reason: String,
    },

    /// Actuator mapping could not be loaded
    #[error("Failed to load actuator mapping: {0}")]
    MappingFailed(String),

    /// Command vector rejected by the hardware
    #[error("Failed to send command: {0}")]
    SendFailed(String),

    /// Command vector has the wrong number of actuators
    #[error("Command length {actual} does not match {expected} actuators")]
    InvalidCommandLength {
        /// Actuators driven by the device
        expected: usize,
        /// Length of the rejected command
        actual: usize,
    },

    /// Clearing the actuator voltages failed
    #[error("Failed to clear device: {0}")]
    ClearFailed(String),

    /// Closing the device failed
    #[error("Failed to close device: {0}")]
    CloseFailed(String),

    /// Operation on a device that is not open
    #[error("Device not open")]
    NotOpen,

    /// No driver registered under the requested name
    #[error("Unknown DM driver '{name}' (available: {available})")]
    DriverNotFound {
        /// Requested driver name
        name: String,
        /// Comma-separated registered driver names
        available: String,
    },

    /// A driver name was registered twice
    #[error("DM driver '{0}' registered twice")]
    DuplicateDriver(String),
}

/// Factory function type for creating driver instances.
///
/// One driver instance is created per physical device.
pub type DriverFactory = fn() -> Box<dyn DmDriver>;

/// Device description reported by a driver after a successful open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Serial number the device was opened with
    pub serial: String,
    /// Driver-assigned device id
    pub device_id: u32,
    /// Number of physical actuators
    pub actuator_count: usize,
}

/// Per-device actuator lookup table.
///
/// Opaque to the server: loaded once when the device is opened and handed
/// back unchanged with every command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActuatorMapping {
    table: Vec<u32>,
}

impl ActuatorMapping {
    /// Wrap a driver lookup table.
    ///
    /// # Errors
    /// Returns `DriverError::MappingFailed` if the table exceeds `MAX_DM_SIZE`.
    pub fn new(table: Vec<u32>) -> Result<Self, DriverError> {
        if table.len() > MAX_DM_SIZE {
            return Err(DriverError::MappingFailed(format!(
                "mapping has {} entries (max {MAX_DM_SIZE})",
                table.len()
            )));
        }
        Ok(Self { table })
    }

    /// Identity mapping over `len` actuators.
    pub fn identity(len: usize) -> Result<Self, DriverError> {
        Self::new((0..len as u32).collect())
    }

    /// Raw lookup table.
    pub fn as_slice(&self) -> &[u32] {
        &self.table
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// True if the table is empty.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

/// Trait defining the interface for DM drivers.
///
/// The server manages each physical mirror through one instance of this
/// trait, enabling pluggable backends (vendor SDK, simulation).
///
/// # Lifecycle
///
/// 1. `open()` then `load_mapping()` - once at startup
/// 2. `send()` - for every combined update while the control loop runs
/// 3. `clear()` then `close()` - once at shutdown
///
/// # Timing Contracts
///
/// | Operation | RT Constraint |
/// |-----------|---------------|
/// | `open()` | None (bounded by driver timeout) |
/// | `send()` | Called from the device control loop, must not block long |
/// | `clear()` / `close()` | None (post-loop) |
pub trait DmDriver: Send {
    /// Returns the driver's unique identifier (e.g., "simulation").
    fn name(&self) -> &'static str;

    /// Open the device with the given serial number.
    ///
    /// # Errors
    /// Return `DriverError::OpenFailed` if the device cannot be reached.
    fn open(&mut self, serial: &str) -> Result<DeviceInfo, DriverError>;

    /// Load the actuator mapping of the opened device.
    fn load_mapping(&mut self) -> Result<ActuatorMapping, DriverError>;

    /// Send one command vector to the device.
    fn send(&mut self, command: &[f64], mapping: &ActuatorMapping) -> Result<(), DriverError>;

    /// Set every actuator to zero.
    fn clear(&mut self) -> Result<(), DriverError>;

    /// Release the device.
    fn close(&mut self) -> Result<(), DriverError>;
}
