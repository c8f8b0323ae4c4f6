// Individual filter stage predicates
//
// Each predicate assumes every earlier stage passed; a missing VM or
// configuration seen by a later stage counts as a failure.

use crate::config::{FilterConfig, PlatformConfig};
use crate::error::{Result, Vm2DhcpError};
use crate::filtering::types::FilterStage;
use crate::fqdn::Fqdn;
use crate::inventory::{VmConfig, VmEvent};
use regex::{Regex, RegexBuilder};
use std::collections::HashSet;

/// Settings the stages are evaluated against
#[derive(Debug, Clone)]
pub struct FilterRules {
    /// Monitored networks; empty lets every VM through
    networks: HashSet<String>,
    /// Guest OS identifiers that are not handed out reservations, matched
    /// from the start of the identifier
    unmanaged_guest: Regex,
}

impl FilterRules {
    pub fn new(networks: impl IntoIterator<Item = String>, unmanaged_guest: &str) -> Result<Self> {
        let unmanaged_guest = RegexBuilder::new(&format!("^(?:{})", unmanaged_guest))
            .case_insensitive(true)
            .build()
            .map_err(|e| Vm2DhcpError::InvalidConfigValue {
                path: "filter.unmanaged_guest_pattern".to_string(),
                message: e.to_string(),
            })?;

        Ok(Self {
            networks: networks.into_iter().collect(),
            unmanaged_guest,
        })
    }

    pub fn from_config(platform: &PlatformConfig, filter: &FilterConfig) -> Result<Self> {
        Self::new(
            platform.networks.iter().cloned(),
            &filter.unmanaged_guest_pattern,
        )
    }

    /// Evaluate one stage against an event
    pub fn evaluate(&self, stage: FilterStage, event: &VmEvent) -> bool {
        match stage {
            FilterStage::Vm => event.vm.is_some(),
            FilterStage::VmConfig => config(event).is_some(),
            FilterStage::Network => self.on_monitored_network(event),
            FilterStage::Device => config(event).is_some_and(|c| !c.devices.is_empty()),
            FilterStage::NetworkInterface => {
                config(event).is_some_and(|c| c.devices.iter().any(|d| d.is_ethernet()))
            }
            FilterStage::GuestOs => {
                config(event).is_some_and(|c| !self.unmanaged_guest.is_match(&c.guest_id))
            }
            FilterStage::Name => config(event).is_some_and(|c| Fqdn::is_valid(&c.name)),
        }
    }

    fn on_monitored_network(&self, event: &VmEvent) -> bool {
        if self.networks.is_empty() {
            return true;
        }
        event
            .vm
            .as_ref()
            .is_some_and(|vm| vm.networks.iter().any(|n| self.networks.contains(n)))
    }
}

fn config(event: &VmEvent) -> Option<&VmConfig> {
    event.vm.as_ref().and_then(|vm| vm.config.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::{EventKind, VirtualDevice, VirtualMachine};
    use chrono::Utc;

    fn event(guest_id: &str, networks: &[&str]) -> VmEvent {
        VmEvent {
            key: 1,
            kind: EventKind::Created,
            created_at: Utc::now(),
            vm: Some(VirtualMachine {
                config: Some(VmConfig {
                    name: "app1.corp.local".to_string(),
                    guest_id: guest_id.to_string(),
                    devices: vec![VirtualDevice::Ethernet {
                        label: "Network adapter 1".to_string(),
                        mac_address: "00:50:56:00:00:01".to_string(),
                    }],
                }),
                networks: networks.iter().map(|n| n.to_string()).collect(),
                custom_values: vec![],
            }),
            message: String::new(),
        }
    }

    #[test]
    fn test_guest_os_case_insensitive() {
        let rules = FilterRules::new(Vec::new(), "^win.+").unwrap();
        assert!(!rules.evaluate(FilterStage::GuestOs, &event("Windows2019", &[])));
        assert!(!rules.evaluate(FilterStage::GuestOs, &event("windows2019", &[])));
        assert!(!rules.evaluate(FilterStage::GuestOs, &event("windows9Server64Guest", &[])));
        assert!(rules.evaluate(FilterStage::GuestOs, &event("ubuntu64Guest", &[])));
        // "win" alone needs at least one more character
        assert!(rules.evaluate(FilterStage::GuestOs, &event("win", &[])));
    }

    #[test]
    fn test_guest_os_matched_from_start() {
        let rules = FilterRules::new(Vec::new(), "win.+").unwrap();
        assert!(rules.evaluate(FilterStage::GuestOs, &event("darwin64Guest", &[])));
        assert!(!rules.evaluate(FilterStage::GuestOs, &event("Windows2019", &[])));
    }

    #[test]
    fn test_empty_allow_list_passes() {
        let rules = FilterRules::new(Vec::new(), "^win.+").unwrap();
        assert!(rules.evaluate(FilterStage::Network, &event("ubuntu64Guest", &[])));
    }

    #[test]
    fn test_allow_list_requires_one_match() {
        let rules = FilterRules::new(vec!["prod".to_string()], "^win.+").unwrap();
        assert!(rules.evaluate(
            FilterStage::Network,
            &event("ubuntu64Guest", &["backup", "prod"])
        ));
        assert!(!rules.evaluate(FilterStage::Network, &event("ubuntu64Guest", &["backup"])));
        assert!(!rules.evaluate(FilterStage::Network, &event("ubuntu64Guest", &[])));
    }

    #[test]
    fn test_invalid_pattern() {
        assert!(FilterRules::new(Vec::new(), "(win").is_err());
    }
}
