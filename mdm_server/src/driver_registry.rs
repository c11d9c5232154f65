//! Named DM driver factories.
//!
//! The `[server] driver` setting picks one entry by name, and
//! `DmServer::open_devices` builds one fresh driver per mirror from it.

use mdm_common::driver::{DmDriver, DriverError, DriverFactory};
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

/// Driver factories keyed by the name used in the configuration.
#[derive(Default)]
pub struct DriverRegistry {
    factories: BTreeMap<&'static str, DriverFactory>,
}

impl DriverRegistry {
    /// Registry without any driver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every driver shipped with the server.
    pub fn with_builtin() -> Result<Self, DriverError> {
        let mut registry = Self::new();
        crate::drivers::register_all_drivers(&mut registry)?;
        Ok(registry)
    }

    /// Add `factory` under `name`.
    ///
    /// Fails with `DuplicateDriver` if the name is taken; the first
    /// registration stays in place.
    pub fn register(&mut self, name: &'static str, factory: DriverFactory) -> Result<(), DriverError> {
        match self.factories.entry(name) {
            Entry::Vacant(slot) => {
                slot.insert(factory);
                Ok(())
            }
            Entry::Occupied(_) => Err(DriverError::DuplicateDriver(name.to_string())),
        }
    }

    /// Build an unopened driver for one mirror.
    ///
    /// An unknown name reports the registered alternatives.
    pub fn create_driver(&self, name: &str) -> Result<Box<dyn DmDriver>, DriverError> {
        match self.factories.get(name) {
            Some(factory) => Ok(factory()),
            None => Err(DriverError::DriverNotFound {
                name: name.to_string(),
                available: self.names().join(", "),
            }),
        }
    }

    /// Registered driver names, sorted.
    pub fn names(&self) -> Vec<&'static str> {
        self.factories.keys().copied().collect()
    }
}
