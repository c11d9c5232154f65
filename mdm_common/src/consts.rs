//! System-wide constants for the multi-DM workspace.
//!
//! Single source of truth for the DM geometry, channel limits and default
//! paths. Imported by all crates.

/// Linear size of the DM in actuators (the shared-memory map is square).
pub const DM_GRID_SIDE: usize = 12;

/// Number of "virtual" actuators, i.e. cells of the square map.
pub const DM_VIRTUAL_ACTUATORS: usize = DM_GRID_SIDE * DM_GRID_SIDE;

/// Number of physical actuators driven by the hardware.
pub const DM_ACTUATORS: usize = 140;

/// Flattened map indices of the four corners that carry no actuator.
pub const DM_DEAD_CORNERS: [usize; 4] = [
    0,
    DM_GRID_SIDE - 1,
    DM_VIRTUAL_ACTUATORS - DM_GRID_SIDE,
    DM_VIRTUAL_ACTUATORS - 1,
];

/// Lower bound of a combined actuator command.
pub const DM_COMMAND_MIN: f64 = 0.0;

/// Upper bound of a combined actuator command.
pub const DM_COMMAND_MAX: f64 = 1.0;

/// Upper bound on the size of a driver actuator mapping table.
pub const MAX_DM_SIZE: usize = 4096;

/// Default number of deformable mirrors served.
pub const DEFAULT_DEVICE_COUNT: usize = 4;

/// Default number of writable channels per DM.
pub const DEFAULT_CHANNEL_COUNT: usize = 4;

/// Maximum number of writable channels per DM (two-digit segment suffix).
pub const MAX_CHANNELS: usize = 99;

/// Serial numbers of the installed DMs, in device order (device 1 first).
pub const DEFAULT_DM_SERIALS: [&str; DEFAULT_DEVICE_COUNT] =
    ["17DW019#113", "17DW019#093", "17DW019#122", "17DW019#053"];

/// Default delay between two channel polls in microseconds.
pub const DEFAULT_POLL_INTERVAL_US: u64 = 10;

/// Default action log file.
pub const DEFAULT_ACTION_LOG: &str = "log_test.log";

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/mdm/mdm.toml";

/// Default driver name.
pub const DEFAULT_DRIVER: &str = "simulation";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geometry_is_consistent() {
        assert_eq!(DM_VIRTUAL_ACTUATORS, 144);
        assert_eq!(DM_VIRTUAL_ACTUATORS - DM_DEAD_CORNERS.len(), DM_ACTUATORS);
    }

    #[test]
    fn dead_corners_are_the_grid_corners() {
        assert_eq!(DM_DEAD_CORNERS, [0, 11, 132, 143]);
    }

    #[test]
    fn defaults_are_within_limits() {
        assert!(DEFAULT_CHANNEL_COUNT >= 1 && DEFAULT_CHANNEL_COUNT <= MAX_CHANNELS);
        assert_eq!(DEFAULT_DM_SERIALS.len(), DEFAULT_DEVICE_COUNT);
        assert!(DM_ACTUATORS <= MAX_DM_SIZE);
    }
}
