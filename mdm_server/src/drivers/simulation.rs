//! Simulation driver.
//!
//! `SimulatedDm` stands in for the vendor library: it accepts any serial,
//! reports a 140-actuator mirror with an identity mapping and keeps the most
//! recent commands it receives. A cloned [`SimProbe`] lets tests and the
//! operator inspect that history and inject open or send failures.

use crate::geometry::from_command_vector;
use mdm_common::consts::DM_ACTUATORS;
use mdm_common::driver::{ActuatorMapping, DeviceInfo, DmDriver, DriverError};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::debug;

/// Registry name of the simulation driver.
pub const DRIVER_NAME: &str = "simulation";

/// Commands kept in the history; older ones are dropped.
pub const COMMAND_HISTORY_LEN: usize = 64;

static NEXT_DEVICE_ID: AtomicU32 = AtomicU32::new(1);

#[derive(Debug, Default)]
struct SimState {
    serial: Option<String>,
    open: bool,
    cleared: bool,
    fail_open: bool,
    fail_send: bool,
    sends: u64,
    history: VecDeque<Vec<f64>>,
}

/// Shared view on a simulated mirror.
#[derive(Debug, Clone, Default)]
pub struct SimProbe {
    state: Arc<Mutex<SimState>>,
}

impl SimProbe {
    /// Make the next `open` fail.
    pub fn fail_open(&self, fail: bool) {
        self.state.lock().fail_open = fail;
    }

    /// Make every `send` fail until reset.
    pub fn fail_send(&self, fail: bool) {
        self.state.lock().fail_send = fail;
    }

    /// Number of accepted commands since creation.
    pub fn send_count(&self) -> u64 {
        self.state.lock().sends
    }

    /// The last [`COMMAND_HISTORY_LEN`] accepted commands, oldest first.
    pub fn commands(&self) -> Vec<Vec<f64>> {
        self.state.lock().history.iter().cloned().collect()
    }

    /// Most recent accepted command.
    pub fn last_command(&self) -> Option<Vec<f64>> {
        self.state.lock().history.back().cloned()
    }

    /// Most recent command laid back onto the 12x12 map.
    pub fn last_surface(&self) -> Option<Vec<f64>> {
        self.state
            .lock()
            .history
            .back()
            .map(|command| from_command_vector(command))
    }

    /// Serial of the opened mirror.
    pub fn serial(&self) -> Option<String> {
        self.state.lock().serial.clone()
    }

    /// True between a successful `open` and `close`.
    pub fn is_open(&self) -> bool {
        self.state.lock().open
    }

    /// True once `clear` was called.
    pub fn was_cleared(&self) -> bool {
        self.state.lock().cleared
    }
}

/// Simulated deformable mirror.
#[derive(Debug, Default)]
pub struct SimulatedDm {
    probe: SimProbe,
}

impl SimulatedDm {
    /// Create a closed simulated mirror.
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle sharing this mirror's state.
    pub fn probe(&self) -> SimProbe {
        self.probe.clone()
    }
}

/// Factory registered under [`DRIVER_NAME`].
pub fn create_driver() -> Box<dyn DmDriver> {
    Box::new(SimulatedDm::new())
}

impl DmDriver for SimulatedDm {
    fn name(&self) -> &'static str {
        DRIVER_NAME
    }

    fn open(&mut self, serial: &str) -> Result<DeviceInfo, DriverError> {
        let mut state = self.probe.state.lock();
        if state.fail_open {
            return Err(DriverError::OpenFailed {
                serial: serial.to_string(),
                reason: "simulated open failure".to_string(),
            });
        }
        state.serial = Some(serial.to_string());
        state.open = true;

        Ok(DeviceInfo {
            serial: serial.to_string(),
            device_id: NEXT_DEVICE_ID.fetch_add(1, Ordering::Relaxed),
            actuator_count: DM_ACTUATORS,
        })
    }

    fn load_mapping(&mut self) -> Result<ActuatorMapping, DriverError> {
        if !self.probe.state.lock().open {
            return Err(DriverError::NotOpen);
        }
        ActuatorMapping::identity(DM_ACTUATORS)
    }

    fn send(&mut self, command: &[f64], mapping: &ActuatorMapping) -> Result<(), DriverError> {
        let mut state = self.probe.state.lock();
        if !state.open {
            return Err(DriverError::NotOpen);
        }
        if state.fail_send {
            return Err(DriverError::SendFailed("simulated send failure".to_string()));
        }
        if mapping.len() != command.len() {
            return Err(DriverError::MappingFailed(format!(
                "mapping has {} entries for {} actuators",
                mapping.len(),
                command.len()
            )));
        }

        state.cleared = false;
        state.sends += 1;
        let recorded = if state.history.len() == COMMAND_HISTORY_LEN {
            // Reuse the oldest buffer instead of allocating per send.
            let mut oldest = state.history.pop_front().unwrap_or_default();
            oldest.clear();
            oldest.extend_from_slice(command);
            oldest
        } else {
            command.to_vec()
        };
        state.history.push_back(recorded);
        Ok(())
    }

    fn clear(&mut self) -> Result<(), DriverError> {
        let mut state = self.probe.state.lock();
        if !state.open {
            return Err(DriverError::NotOpen);
        }
        state.cleared = true;
        Ok(())
    }

    fn close(&mut self) -> Result<(), DriverError> {
        let mut state = self.probe.state.lock();
        if let Some(serial) = &state.serial {
            debug!("Simulated DM {} closed", serial);
        }
        state.open = false;
        Ok(())
    }
}
