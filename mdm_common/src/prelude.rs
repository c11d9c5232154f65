//! Prelude module for common re-exports.
//!
//! This module provides convenient re-exports of commonly used types
//! so that consumers can do `use mdm_common::prelude::*;` and get
//! the most important types without listing individual paths.
//!
//! # Usage
//!
//! ```rust
//! use mdm_common::prelude::*;
//! ```

// ─── Logging ────────────────────────────────────────────────────────
pub use crate::config::LogLevel;

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{ConfigError, ConfigLoader, ServerConfig, SharedConfig};

// ─── DM Geometry ────────────────────────────────────────────────────
pub use crate::consts::{DM_ACTUATORS, DM_DEAD_CORNERS, DM_GRID_SIDE, DM_VIRTUAL_ACTUATORS};

// ─── Drivers ────────────────────────────────────────────────────────
pub use crate::driver::{ActuatorMapping, DeviceInfo, DmDriver, DriverError, DriverFactory};

// ─── Shared Memory Naming ───────────────────────────────────────────
pub use crate::shm::consts::{channel_segment_name, combined_segment_name};
