//! Server error types.

use mdm_common::config::ConfigError;
use mdm_common::driver::DriverError;
use mdm_shm::ShmError;
use thiserror::Error;

/// Errors surfaced by the DM server to its caller.
#[derive(Debug, Error)]
pub enum ServerError {
    /// A DM could not be opened at startup
    #[error("Failed to open DM {device} ({serial}): {source}")]
    DeviceOpen {
        /// 1-based device index
        device: usize,
        /// Serial number of the device
        serial: String,
        /// Driver error
        #[source]
        source: DriverError,
    },

    /// Driver-level failure outside of startup
    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    /// Shared-memory failure (channel allocation, publish)
    #[error("Shared memory error: {0}")]
    Shm(#[from] ShmError),

    /// Configuration failure
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Channel buffers are not allocated
    #[error("Channels not configured: set the desired number of channels")]
    NotConfigured,

    /// Operation requires the control loops to be stopped
    #[error("DM control loop still running")]
    LoopRunning,

    /// Operation requires the control loops to be running
    #[error("DM control loop already stopped")]
    LoopStopped,

    /// Channel count outside the supported range
    #[error("Invalid channel count {0}")]
    InvalidChannelCount(usize),

    /// Channel index outside the current configuration
    #[error("No channel {channel} (configured: {channel_count})")]
    InvalidChannel {
        /// Requested channel
        channel: usize,
        /// Configured channel count
        channel_count: usize,
    },

    /// Per-device log file failure
    #[error("Log file error: {0}")]
    Io(#[from] std::io::Error),

    /// A device loop thread panicked
    #[error("Control loop of DM {0} panicked")]
    LoopPanicked(usize),
}

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;
