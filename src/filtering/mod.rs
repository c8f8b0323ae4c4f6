// Ordered filter chain deciding which VM events are worth a reservation
//
// check_vm -> check_vmconfig -> check_network -> check_device ->
// check_network_interface -> check_os -> check_name
//
// The first failing stage rejects the event and later stages are not
// evaluated. Every evaluation is timed and counted.

mod stages;
mod types;

pub use stages::FilterRules;
pub use types::{ChainStats, FilterOutcome, FilterStage, RejectReason, StageStats};

use crate::inventory::VmEvent;
use crate::telemetry::{Endpoints, FILTER_EVENT_TOTAL, FILTER_LATENCY};
use std::time::Instant;

/// Event classifier
pub struct FilterChain {
    rules: FilterRules,
    endpoints: Endpoints,
    stats: ChainStats,
}

impl FilterChain {
    pub fn new(rules: FilterRules, endpoints: Endpoints) -> Self {
        Self {
            rules,
            endpoints,
            stats: ChainStats::default(),
        }
    }

    /// Run an event through every stage, stopping at the first rejection
    pub fn classify(&mut self, event: &VmEvent) -> FilterOutcome {
        let outcome = self.run_stages(event);

        self.endpoints
            .increment(FILTER_EVENT_TOTAL, "event", outcome.as_str());
        if outcome.is_accepted() {
            self.stats.accepted += 1;
        }

        outcome
    }

    fn run_stages(&mut self, event: &VmEvent) -> FilterOutcome {
        for stage in FilterStage::ORDER {
            let start = Instant::now();
            let passed = self.rules.evaluate(stage, event);
            self.endpoints
                .latency(FILTER_LATENCY, "filter", stage.as_str(), start.elapsed());
            self.endpoints.stage_outcome(stage.as_str(), passed);
            self.stats.record(stage, passed);

            if !passed {
                let reason = stage.reject_reason();
                tracing::debug!(
                    "Event {} ({}) rejected: {}",
                    event.key,
                    event.kind.as_str(),
                    reason.as_str()
                );
                return FilterOutcome::Rejected(reason);
            }
        }

        FilterOutcome::Accepted
    }

    /// Stage counters accumulated so far
    pub fn stats(&self) -> &ChainStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::{EventKind, VirtualDevice, VirtualMachine, VmConfig};
    use chrono::Utc;

    fn chain(networks: &[&str]) -> FilterChain {
        let rules =
            FilterRules::new(networks.iter().map(|n| n.to_string()), "^win.+").unwrap();
        FilterChain::new(rules, Endpoints::new("vc.test", "dhcp.test"))
    }

    fn vm_event(name: &str, guest_id: &str, devices: Vec<VirtualDevice>) -> VmEvent {
        VmEvent {
            key: 7,
            kind: EventKind::Created,
            created_at: Utc::now(),
            vm: Some(VirtualMachine {
                config: Some(VmConfig {
                    name: name.to_string(),
                    guest_id: guest_id.to_string(),
                    devices,
                }),
                networks: vec!["prod".to_string()],
                custom_values: vec![],
            }),
            message: String::new(),
        }
    }

    fn nic() -> VirtualDevice {
        VirtualDevice::Ethernet {
            label: "Network adapter 1".to_string(),
            mac_address: "00:11:22:33:44:55".to_string(),
        }
    }

    #[test]
    fn test_accepts_well_formed_vm() {
        let mut chain = chain(&["prod"]);
        let outcome = chain.classify(&vm_event("db1.corp.local", "centos7_64Guest", vec![nic()]));

        assert_eq!(outcome, FilterOutcome::Accepted);
        assert_eq!(chain.stats().accepted, 1);
        for stage in FilterStage::ORDER {
            assert_eq!(chain.stats().stage(stage).passed, 1);
        }
    }

    #[test]
    fn test_no_vm_short_circuits() {
        let mut chain = chain(&["prod"]);
        let mut event = vm_event("db1.corp.local", "centos7_64Guest", vec![nic()]);
        event.vm = None;

        assert_eq!(
            chain.classify(&event),
            FilterOutcome::Rejected(RejectReason::NoVm)
        );
        assert_eq!(chain.stats().stage(FilterStage::Vm).failed, 1);
        for stage in &FilterStage::ORDER[1..] {
            assert_eq!(chain.stats().stage(*stage).evaluations(), 0);
        }
    }

    #[test]
    fn test_no_config() {
        let mut chain = chain(&[]);
        let mut event = vm_event("db1.corp.local", "centos7_64Guest", vec![nic()]);
        if let Some(vm) = event.vm.as_mut() {
            vm.config = None;
        }

        assert_eq!(
            chain.classify(&event),
            FilterOutcome::Rejected(RejectReason::NoVmConfig)
        );
        assert_eq!(chain.stats().stage(FilterStage::Network).evaluations(), 0);
    }

    #[test]
    fn test_no_device_before_no_interface() {
        let mut chain = chain(&[]);
        let outcome = chain.classify(&vm_event("db1.corp.local", "centos7_64Guest", vec![]));
        assert_eq!(outcome, FilterOutcome::Rejected(RejectReason::NoDevice));

        let disk_only = vec![VirtualDevice::Disk {
            label: "Hard disk 1".to_string(),
        }];
        let outcome = chain.classify(&vm_event("db1.corp.local", "centos7_64Guest", disk_only));
        assert_eq!(
            outcome,
            FilterOutcome::Rejected(RejectReason::NoNetworkInterface)
        );
    }

    #[test]
    fn test_unsupported_os_before_bad_name() {
        let mut chain = chain(&[]);
        let outcome = chain.classify(&vm_event("not a fqdn", "windows2019srv_64Guest", vec![nic()]));

        assert_eq!(outcome, FilterOutcome::Rejected(RejectReason::UnsupportedOs));
        assert_eq!(chain.stats().stage(FilterStage::Name).evaluations(), 0);
    }

    #[test]
    fn test_bad_name() {
        let mut chain = chain(&[]);
        for name in ["localhost", "-db1.corp.local", "db1"] {
            let outcome = chain.classify(&vm_event(name, "centos7_64Guest", vec![nic()]));
            assert_eq!(outcome, FilterOutcome::Rejected(RejectReason::BadName));
        }
        assert_eq!(chain.stats().rejected(RejectReason::BadName), 3);
        assert_eq!(chain.stats().accepted, 0);
    }

    #[test]
    fn test_bad_network() {
        let mut chain = chain(&["dmz"]);
        let outcome = chain.classify(&vm_event("db1.corp.local", "centos7_64Guest", vec![nic()]));

        assert_eq!(outcome, FilterOutcome::Rejected(RejectReason::BadNetwork));
        assert_eq!(outcome.as_str(), "bad_network");
    }

    #[test]
    fn test_stage_metrics_follow_evaluation() {
        use crate::telemetry::{capture, FILTER_STAGE_TOTAL};

        let mut event = vm_event("db1.corp.local", "centos7_64Guest", vec![nic()]);
        event.vm = None;
        let mut chain = chain(&["prod"]);

        let (outcome, recorded) = capture::record(|| chain.classify(&event));

        assert_eq!(outcome, FilterOutcome::Rejected(RejectReason::NoVm));
        let endpoint = [("vc", "vc.test"), ("dhcp", "dhcp.test")];
        assert_eq!(
            recorded.counter(
                FILTER_STAGE_TOTAL,
                &[endpoint[0], endpoint[1], ("filter", "check_vm"), ("outcome", "fail")]
            ),
            1
        );
        assert_eq!(recorded.samples(FILTER_LATENCY, &[("filter", "check_vm")]), 1);
        for stage in &FilterStage::ORDER[1..] {
            assert_eq!(
                recorded.counter(FILTER_STAGE_TOTAL, &[("filter", stage.as_str())]),
                0
            );
            assert_eq!(recorded.samples(FILTER_LATENCY, &[("filter", stage.as_str())]), 0);
        }
        assert_eq!(
            recorded.counter(FILTER_EVENT_TOTAL, &[("event", "no_vm")]),
            1
        );
    }
}
