//! DM driver implementations.
//!
//! This module contains all DM driver implementations:
//!
//! - [`simulation`] - Software mirror for development and testing
//!
//! # Adding New Drivers
//!
//! 1. Create a new submodule under `drivers/`
//! 2. Implement the `DmDriver` trait from `mdm_common::driver`
//! 3. Register the driver in [`register_all_drivers`]

pub mod simulation;

use crate::driver_registry::DriverRegistry;
use mdm_common::driver::DriverError;

/// Register every built-in driver in `registry`.
pub fn register_all_drivers(registry: &mut DriverRegistry) -> Result<(), DriverError> {
    registry.register(simulation::DRIVER_NAME, simulation::create_driver)
}
