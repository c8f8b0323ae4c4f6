// Shared types for the event filter chain

/// Filter stages, in evaluation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterStage {
    Vm,
    VmConfig,
    Network,
    Device,
    NetworkInterface,
    GuestOs,
    Name,
}

impl FilterStage {
    /// Evaluation order; the first failing stage ends the chain
    pub const ORDER: [FilterStage; 7] = [
        FilterStage::Vm,
        FilterStage::VmConfig,
        FilterStage::Network,
        FilterStage::Device,
        FilterStage::NetworkInterface,
        FilterStage::GuestOs,
        FilterStage::Name,
    ];

    /// Metric label of the stage
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterStage::Vm => "check_vm",
            FilterStage::VmConfig => "check_vmconfig",
            FilterStage::Network => "check_network",
            FilterStage::Device => "check_device",
            FilterStage::NetworkInterface => "check_network_interface",
            FilterStage::GuestOs => "check_os",
            FilterStage::Name => "check_name",
        }
    }

    /// Reason reported when this stage rejects an event
    pub fn reject_reason(&self) -> RejectReason {
        match self {
            FilterStage::Vm => RejectReason::NoVm,
            FilterStage::VmConfig => RejectReason::NoVmConfig,
            FilterStage::Network => RejectReason::BadNetwork,
            FilterStage::Device => RejectReason::NoDevice,
            FilterStage::NetworkInterface => RejectReason::NoNetworkInterface,
            FilterStage::GuestOs => RejectReason::UnsupportedOs,
            FilterStage::Name => RejectReason::BadName,
        }
    }

    fn index(&self) -> usize {
        match self {
            FilterStage::Vm => 0,
            FilterStage::VmConfig => 1,
            FilterStage::Network => 2,
            FilterStage::Device => 3,
            FilterStage::NetworkInterface => 4,
            FilterStage::GuestOs => 5,
            FilterStage::Name => 6,
        }
    }
}

/// Why an event was not accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectReason {
    NoVm,
    NoVmConfig,
    BadNetwork,
    NoDevice,
    NoNetworkInterface,
    UnsupportedOs,
    BadName,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::NoVm => "no_vm",
            RejectReason::NoVmConfig => "no_vmconfig",
            RejectReason::BadNetwork => "bad_network",
            RejectReason::NoDevice => "no_device",
            RejectReason::NoNetworkInterface => "no_network_interface",
            RejectReason::UnsupportedOs => "unsupported_os",
            RejectReason::BadName => "bad_name",
        }
    }
}

/// Result of running an event through the chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOutcome {
    Accepted,
    Rejected(RejectReason),
}

impl FilterOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, FilterOutcome::Accepted)
    }

    /// Metric label: the rejection reason, or `accepted`
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOutcome::Accepted => "accepted",
            FilterOutcome::Rejected(reason) => reason.as_str(),
        }
    }
}

/// Pass/fail counts of one stage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageStats {
    pub passed: u64,
    pub failed: u64,
}

impl StageStats {
    pub fn evaluations(&self) -> u64 {
        self.passed + self.failed
    }
}

/// In-process tally of every stage evaluation since the chain was built
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChainStats {
    stages: [StageStats; 7],
    /// Events that made it through every stage
    pub accepted: u64,
}

impl ChainStats {
    pub fn stage(&self, stage: FilterStage) -> StageStats {
        self.stages[stage.index()]
    }

    /// Events rejected for `reason`
    pub fn rejected(&self, reason: RejectReason) -> u64 {
        FilterStage::ORDER
            .iter()
            .find(|stage| stage.reject_reason() == reason)
            .map(|stage| self.stage(*stage).failed)
            .unwrap_or(0)
    }

    pub(super) fn record(&mut self, stage: FilterStage, passed: bool) {
        let entry = &mut self.stages[stage.index()];
        if passed {
            entry.passed += 1;
        } else {
            entry.failed += 1;
        }
    }
}
