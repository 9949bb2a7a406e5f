// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::sync::Arc;

use parking_lot::Mutex;

use crate::core::{DeviceContext, RelayError, Result};

/// Name → device lookup used to route engine traffic.
///
/// Guarded by its own mutex, never held together with a queue lock. Device
/// counts are small, so lookups are linear scans in registration order.
#[derive(Default)]
pub struct DeviceRegistry {
    devices: Mutex<Vec<Arc<DeviceContext>>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make a fully initialised device visible.
    ///
    /// Names are unique: registering a second device under an existing name
    /// fails with [`RelayError::DeviceExists`] and leaves the registry as it
    /// was.
    pub fn register(&self, device: Arc<DeviceContext>) -> Result<()> {
        let mut devices = self.devices.lock();
        if devices.iter().any(|d| d.name() == device.name()) {
            return Err(RelayError::DeviceExists(device.name().to_string()));
        }
        devices.push(device);
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<DeviceContext>> {
        self.devices
            .lock()
            .iter()
            .find(|d| d.name() == name)
            .cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.devices.lock().iter().any(|d| d.name() == name)
    }

    /// Remove a device, returning it if it was registered.
    pub fn deregister(&self, name: &str) -> Option<Arc<DeviceContext>> {
        let mut devices = self.devices.lock();
        let pos = devices.iter().position(|d| d.name() == name)?;
        Some(devices.remove(pos))
    }

    /// Remove every device, in registration order.
    pub fn drain(&self) -> Vec<Arc<DeviceContext>> {
        std::mem::take(&mut *self.devices.lock())
    }

    pub fn names(&self) -> Vec<String> {
        self.devices
            .lock()
            .iter()
            .map(|d| d.name().to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.devices.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.lock().is_empty()
    }
}

impl std::fmt::Debug for DeviceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceRegistry")
            .field("devices", &self.names())
            .finish()
    }
}
