// Translation of a VM snapshot into reservation records

use crate::fqdn::Fqdn;
use crate::inventory::{MacAddress, VmSnapshot};
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

/// DHCP option name -> value
pub type DhcpOptions = BTreeMap<String, String>;

pub const HOST_NAME_OPTION: &str = "host-name";
pub const DOMAIN_NAME_OPTION: &str = "domain-name";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("VM name is not a fully qualified domain name: {0:?}")]
    InvalidName(String),
}

/// Registry-side reservation for one adapter of a VM
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReservationRecord {
    pub mac_address: MacAddress,
    pub host_label: String,
    pub domain_label: String,
    pub options: DhcpOptions,
}

impl ReservationRecord {
    /// Options in the registry's statement form
    pub fn statements(&self) -> String {
        render_statements(&self.options)
    }
}

/// Everything the reconciler needs for one VM
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationPlan {
    pub fqdn: Fqdn,
    /// One record per distinct, well-formed MAC address, in device order
    pub records: Vec<ReservationRecord>,
    /// Adapter MAC addresses that could not be parsed
    pub invalid_macs: Vec<String>,
}

impl ReservationPlan {
    pub fn from_snapshot(snapshot: &VmSnapshot, namespace: &str) -> Result<Self, RecordError> {
        let fqdn = Fqdn::parse(&snapshot.name)
            .ok_or_else(|| RecordError::InvalidName(snapshot.name.clone()))?;
        let options = build_options(snapshot, namespace, &fqdn);

        let mut records: Vec<ReservationRecord> = Vec::new();
        let mut invalid_macs = Vec::new();
        for raw in snapshot.mac_addresses() {
            match raw.parse::<MacAddress>() {
                Ok(mac) if records.iter().any(|r| r.mac_address == mac) => {}
                Ok(mac) => records.push(ReservationRecord {
                    mac_address: mac,
                    host_label: fqdn.host().to_string(),
                    domain_label: fqdn.domain().to_string(),
                    options: options.clone(),
                }),
                Err(_) => invalid_macs.push(raw.to_string()),
            }
        }

        Ok(Self {
            fqdn,
            records,
            invalid_macs,
        })
    }
}

/// Custom attribute key -> option name, for attributes inside `namespace`
pub fn option_fields(
    definitions: &BTreeMap<i32, String>,
    namespace: &str,
) -> BTreeMap<i32, String> {
    definitions
        .iter()
        .filter_map(|(key, name)| {
            let option = name.strip_prefix(namespace)?;
            (!option.is_empty()).then(|| (*key, option.to_lowercase()))
        })
        .collect()
}

/// Options for a VM: namespaced custom attributes, then host and domain name
pub fn build_options(snapshot: &VmSnapshot, namespace: &str, fqdn: &Fqdn) -> DhcpOptions {
    let fields = option_fields(&snapshot.custom_field_definitions, namespace);

    let mut options: DhcpOptions = snapshot
        .custom_field_values
        .iter()
        .filter_map(|(key, value)| Some((fields.get(key)?.clone(), value.clone())))
        .collect();

    options.insert(HOST_NAME_OPTION.to_string(), fqdn.host().to_string());
    options.insert(DOMAIN_NAME_OPTION.to_string(), fqdn.domain().to_string());
    options
}

/// Render options as `option <key> "<value>";` statements, lower-cased
pub fn render_statements(options: &DhcpOptions) -> String {
    options
        .iter()
        .map(|(key, value)| format!("option {} \"{}\";", key, value))
        .collect::<String>()
        .to_lowercase()
}
