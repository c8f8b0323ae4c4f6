//! Virtualization inventory model
//!
//! Events and VM objects as handed over by the platform client, plus the
//! normalized [`VmSnapshot`] the reconciler works from.

mod mac;
mod snapshot;

pub use mac::{MacAddress, MacAddressError};
pub use snapshot::{SnapshotError, VmSnapshot};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Platform event types the consumer subscribes to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// VM created (or deployed, cloned, registered)
    Created,
    /// VM reconfigured
    Updated,
    /// VM starting or powered on
    PowerStateChanged,
    /// VM renamed
    Renamed,
    /// VM MAC address changed
    NetworkAddressChanged,
    /// VM removed; the platform no longer holds its configuration
    Removed,
}

impl EventKind {
    /// Every monitored event kind, in subscription order
    pub const ALL: [EventKind; 6] = [
        EventKind::Created,
        EventKind::Updated,
        EventKind::PowerStateChanged,
        EventKind::Renamed,
        EventKind::NetworkAddressChanged,
        EventKind::Removed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Created => "created",
            EventKind::Updated => "updated",
            EventKind::PowerStateChanged => "power_state_changed",
            EventKind::Renamed => "renamed",
            EventKind::NetworkAddressChanged => "network_address_changed",
            EventKind::Removed => "removed",
        }
    }

    /// Whether events of this kind lead to a registration attempt.
    ///
    /// Removal is never reconciled: by the time it is delivered the VM
    /// object no longer carries the adapters whose reservations would
    /// have to go.
    pub fn registers(&self) -> bool {
        !matches!(self, EventKind::Removed)
    }
}

/// A VM event read from the platform event stream
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VmEvent {
    /// Platform-assigned event key
    #[serde(default)]
    pub key: i64,
    pub kind: EventKind,
    pub created_at: DateTime<Utc>,
    /// VM at event time; gone if it vanished before the event was read
    #[serde(default)]
    pub vm: Option<VirtualMachine>,
    /// Human readable message from the platform
    #[serde(default)]
    pub message: String,
}

/// Inventory object of a virtual machine
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VirtualMachine {
    /// Hardware configuration; not materialized yet for some fresh VMs
    #[serde(default)]
    pub config: Option<VmConfig>,
    /// Names of the networks the VM is attached to
    #[serde(default)]
    pub networks: Vec<String>,
    /// Custom attribute values set on the VM
    #[serde(default)]
    pub custom_values: Vec<CustomFieldValue>,
}

/// VM configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VmConfig {
    pub name: String,
    pub guest_id: String,
    #[serde(default)]
    pub devices: Vec<VirtualDevice>,
}

/// Virtual hardware device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VirtualDevice {
    Ethernet { label: String, mac_address: String },
    Disk { label: String },
    Controller { label: String },
    Other { label: String },
}

impl VirtualDevice {
    pub fn label(&self) -> &str {
        match self {
            VirtualDevice::Ethernet { label, .. }
            | VirtualDevice::Disk { label }
            | VirtualDevice::Controller { label }
            | VirtualDevice::Other { label } => label,
        }
    }

    pub fn is_ethernet(&self) -> bool {
        matches!(self, VirtualDevice::Ethernet { .. })
    }

    /// MAC address as reported by the platform, ethernet adapters only
    pub fn mac_address(&self) -> Option<&str> {
        match self {
            VirtualDevice::Ethernet { mac_address, .. } => Some(mac_address),
            _ => None,
        }
    }
}

/// Value of a custom attribute on a VM
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomFieldValue {
    pub key: i32,
    pub value: String,
}

/// Managed object type a custom attribute is defined for
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldScope {
    VirtualMachine,
    HostSystem,
    #[default]
    Global,
}

/// Custom attribute definition held by the platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomFieldDef {
    pub key: i32,
    pub name: String,
    #[serde(default)]
    pub scope: FieldScope,
}
