//! # Multi-DM Server Library
//!
//! Drives several deformable mirrors from shared-memory channels. Every DM
//! owns `nch` writable 12x12 channels plus one combined output; a control
//! loop per DM sums the channels on change, clamps the result to `[0, 1]`,
//! republishes it and sends the 140-actuator command to the hardware.
//!
//! # Module Structure
//!
//! - [`channels`] - Channel-set allocation and teardown
//! - [`combine`] - Change detection, sum and clamp
//! - [`geometry`] - 12x12 map to 140-actuator command
//! - [`device`] - Opened DM plus actuator mapping
//! - [`control`] - Per-device loop threads
//! - [`server`] - Orchestration and operator actions
//! - [`command`] - Operator shell commands
//! - [`driver_registry`] / [`drivers`] - Pluggable DM drivers
//! - [`logs`] - Action log and send timing log
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐     ┌──────────────────────────────────────────────┐
//! │  producers   │     │                 mdm_server                   │
//! │ dm1disp00 ───┼──┐  │  ┌───────────┐   ┌──────────┐   ┌──────────┐ │
//! │ dm1disp01 ───┼──┼─►│  │ Combiner  ├──►│ geometry ├──►│ DmDevice │─┼─► DM 1
//! │    ...       │  │  │  └─────┬─────┘   └──────────┘   └──────────┘ │
//! └──────────────┘  │  │        ▼ dm1 (combined, readable by others)  │
//!                   │  │   one DeviceLoop thread per DM               │
//!                   └─►│   ...                                        │
//!                      └──────────────────────────────────────────────┘
//! ```

#![deny(missing_docs)]

pub mod channels;
pub mod combine;
pub mod command;
pub mod control;
pub mod device;
pub mod driver_registry;
pub mod drivers;
pub mod error;
pub mod geometry;
pub mod logs;
pub mod server;

// Re-export key types for convenience
pub use crate::channels::{ChannelManager, ChannelSelector, DeviceChannelSet};
pub use crate::command::{Command, CommandError};
pub use crate::control::{LoopStats, RunFlag};
pub use crate::device::DmDevice;
pub use crate::driver_registry::DriverRegistry;
pub use crate::error::{ServerError, ServerResult};
pub use crate::server::{DmServer, Outcome, ServerOptions};
