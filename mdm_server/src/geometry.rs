//! DM map geometry: 12x12 shared-memory map ↔ 140-actuator command.
//!
//! The four corners of the square map have no physical actuator. A command
//! is the row-major traversal of the map with those four cells removed.

use mdm_common::consts::{DM_ACTUATORS, DM_DEAD_CORNERS, DM_VIRTUAL_ACTUATORS};

/// True if flattened map index `index` is one of the dead corners.
#[inline]
pub fn is_dead_corner(index: usize) -> bool {
    DM_DEAD_CORNERS.contains(&index)
}

/// Write the command for `map` into `command`.
///
/// `map` must hold `DM_VIRTUAL_ACTUATORS` cells and `command`
/// `DM_ACTUATORS` slots. No allocation, usable from the control loop.
pub fn map_into(map: &[f64], command: &mut [f64]) {
    debug_assert_eq!(map.len(), DM_VIRTUAL_ACTUATORS);
    debug_assert_eq!(command.len(), DM_ACTUATORS);

    let live = map
        .iter()
        .enumerate()
        .filter(|(index, _)| !is_dead_corner(*index))
        .map(|(_, value)| *value);

    for (slot, value) in command.iter_mut().zip(live) {
        *slot = value;
    }
}

/// Translate a 144-cell map into a 140-element command vector.
pub fn to_command_vector(map: &[f64]) -> Vec<f64> {
    let mut command = vec![0.0; DM_ACTUATORS];
    map_into(map, &mut command);
    command
}

/// Rebuild a 144-cell map from a command vector, dead corners set to zero.
pub fn from_command_vector(command: &[f64]) -> Vec<f64> {
    debug_assert_eq!(command.len(), DM_ACTUATORS);

    let mut map = vec![0.0; DM_VIRTUAL_ACTUATORS];
    let live = map
        .iter_mut()
        .enumerate()
        .filter(|(index, _)| !is_dead_corner(*index))
        .map(|(_, cell)| cell);

    for (cell, value) in live.zip(command) {
        *cell = *value;
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp() -> Vec<f64> {
        (0..DM_VIRTUAL_ACTUATORS).map(|i| i as f64).collect()
    }

    #[test]
    fn command_has_140_actuators() {
        assert_eq!(to_command_vector(&ramp()).len(), DM_ACTUATORS);
    }

    #[test]
    fn exactly_the_corners_are_dropped() {
        let command = to_command_vector(&ramp());
        let dropped: Vec<usize> = (0..DM_VIRTUAL_ACTUATORS)
            .filter(|i| !command.contains(&(*i as f64)))
            .collect();
        assert_eq!(dropped, vec![0, 11, 132, 143]);
    }

    #[test]
    fn order_is_row_major() {
        let command = to_command_vector(&ramp());
        assert_eq!(command[0], 1.0);
        assert_eq!(command[9], 10.0);
        assert_eq!(command[10], 12.0);
        assert_eq!(command[129], 131.0);
        assert_eq!(command[130], 133.0);
        assert_eq!(command[139], 142.0);
        assert!(command.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn reinserting_corners_restores_live_cells() {
        let map: Vec<f64> = (0..DM_VIRTUAL_ACTUATORS)
            .map(|i| (i as f64 * 0.37).sin().abs())
            .collect();
        let restored = from_command_vector(&to_command_vector(&map));

        for index in 0..DM_VIRTUAL_ACTUATORS {
            if is_dead_corner(index) {
                assert_eq!(restored[index], 0.0);
            } else {
                assert_eq!(restored[index], map[index], "cell {index}");
            }
        }
    }

    #[test]
    fn map_into_overwrites_every_slot() {
        let mut command = vec![f64::NAN; DM_ACTUATORS];
        map_into(&vec![0.25; DM_VIRTUAL_ACTUATORS], &mut command);
        assert!(command.iter().all(|&v| v == 0.25));
    }
}
