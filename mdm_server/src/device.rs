//! Device driver adapter: one opened mirror plus its actuator mapping.

use mdm_common::driver::{ActuatorMapping, DeviceInfo, DmDriver, DriverError};
use tracing::{debug, info, warn};

/// An opened deformable mirror.
pub struct DmDevice {
    driver: Box<dyn DmDriver>,
    info: DeviceInfo,
    mapping: ActuatorMapping,
    open: bool,
}

impl DmDevice {
    /// Open the mirror with serial `serial` through `driver` and load its
    /// actuator mapping.
    pub fn open(serial: &str, mut driver: Box<dyn DmDriver>) -> Result<Self, DriverError> {
        let info = driver.open(serial)?;
        let mapping = match driver.load_mapping() {
            Ok(mapping) => mapping,
            Err(e) => {
                if let Err(close_err) = driver.close() {
                    warn!("Close after failed mapping load of {}: {}", serial, close_err);
                }
                return Err(e);
            }
        };

        info!(
            "Opened DM {} via {} driver ({} actuators, mapping of {} entries)",
            info.serial,
            driver.name(),
            info.actuator_count,
            mapping.len()
        );

        Ok(Self {
            driver,
            info,
            mapping,
            open: true,
        })
    }

    /// Send one command vector to the hardware.
    pub fn send_command(&mut self, command: &[f64]) -> Result<(), DriverError> {
        if !self.open {
            return Err(DriverError::NotOpen);
        }
        if command.len() != self.info.actuator_count {
            return Err(DriverError::InvalidCommandLength {
                expected: self.info.actuator_count,
                actual: command.len(),
            });
        }
        self.driver.send(command, &self.mapping)
    }

    /// Zero every actuator.
    pub fn clear(&mut self) -> Result<(), DriverError> {
        if !self.open {
            return Err(DriverError::NotOpen);
        }
        self.driver.clear()
    }

    /// Release the device. Closing twice is a no-op.
    pub fn close(&mut self) -> Result<(), DriverError> {
        if !self.open {
            return Ok(());
        }
        self.open = false;
        self.driver.close()
    }

    /// Clear then close, logging failures of either step.
    pub fn shutdown(&mut self) {
        if !self.open {
            return;
        }
        if let Err(e) = self.clear() {
            warn!("Failed to clear DM {}: {}", self.info.serial, e);
        }
        if let Err(e) = self.close() {
            warn!("Failed to close DM {}: {}", self.info.serial, e);
        }
        debug!("DM {} released", self.info.serial);
    }

    /// Device description reported at open.
    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    /// Serial number.
    pub fn serial(&self) -> &str {
        &self.info.serial
    }

    /// Actuator mapping loaded at open.
    pub fn mapping(&self) -> &ActuatorMapping {
        &self.mapping
    }

    /// True until `close` succeeds or fails.
    pub fn is_open(&self) -> bool {
        self.open
    }
}
