//! Device id → display name lookup.

use std::collections::HashMap;

use crate::models::Device;

/// Name table built from the registered devices. Unknown ids display as
/// themselves.
#[derive(Debug, Clone, Default)]
pub struct DeviceDirectory {
    names: HashMap<String, String>,
}

impl DeviceDirectory {
    pub fn from_devices(devices: &[Device]) -> Self {
        Self {
            names: devices
                .iter()
                .map(|d| (d.device_id.clone(), d.name.clone()))
                .collect(),
        }
    }

    pub fn display_name(&self, device_id: &str) -> String {
        self.names
            .get(device_id)
            .cloned()
            .unwrap_or_else(|| device_id.to_string())
    }
}
