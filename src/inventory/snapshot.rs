// Normalized, read-only view of a VM taken at processing time

use crate::inventory::{CustomFieldDef, FieldScope, VirtualDevice, VirtualMachine};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SnapshotError {
    #[error("VM has no configuration")]
    MissingConfig,
}

/// Snapshot of a VM, built from the live inventory object of one event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmSnapshot {
    pub name: String,
    pub guest_os_id: String,
    pub network_names: BTreeSet<String>,
    pub hardware_devices: Vec<VirtualDevice>,
    /// Custom attribute key -> value
    pub custom_field_values: BTreeMap<i32, String>,
    /// Custom attribute key -> attribute name, VM-scoped attributes only
    pub custom_field_definitions: BTreeMap<i32, String>,
}

impl VmSnapshot {
    /// Build a snapshot from a VM and the platform's custom attribute definitions
    pub fn extract(
        vm: &VirtualMachine,
        definitions: &[CustomFieldDef],
    ) -> Result<Self, SnapshotError> {
        let config = vm.config.as_ref().ok_or(SnapshotError::MissingConfig)?;

        let custom_field_definitions = definitions
            .iter()
            .filter(|def| def.scope == FieldScope::VirtualMachine)
            .map(|def| (def.key, def.name.clone()))
            .collect();

        let custom_field_values = vm
            .custom_values
            .iter()
            .map(|field| (field.key, field.value.clone()))
            .collect();

        Ok(Self {
            name: config.name.clone(),
            guest_os_id: config.guest_id.clone(),
            network_names: vm.networks.iter().cloned().collect(),
            hardware_devices: config.devices.clone(),
            custom_field_values,
            custom_field_definitions,
        })
    }

    /// Raw MAC addresses of the ethernet adapters, in device order
    pub fn mac_addresses(&self) -> impl Iterator<Item = &str> {
        self.hardware_devices
            .iter()
            .filter_map(VirtualDevice::mac_address)
    }
}
