//! Multi-DM Common Library
//!
//! This crate provides shared constants, configuration loading and the
//! hardware driver interface for all multi-DM workspace crates.
//!
//! # Module Structure
//!
//! - [`consts`] - DM geometry and system-wide defaults
//! - [`shm`] - Shared memory constants and segment naming
//! - [`config`] - Configuration loading traits and types
//! - [`driver`] - Deformable mirror driver trait and error types
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! Add to your `Cargo.toml` with alias for shorter imports:
//! ```toml
//! [dependencies]
//! mdm = { package = "mdm_common", path = "../mdm_common" }
//! ```
//!
//! Then import:
//! ```rust
//! use mdm_common::consts::*;
//! use mdm_common::config::{ConfigLoader, SharedConfig};
//! ```

pub mod config;
pub mod consts;
pub mod driver;
pub mod prelude;
pub mod shm;
