//! Metrics emitted by the synchronization loop.
//!
//! Every series carries the platform (`vc`) and registry (`dhcp`) endpoint
//! labels so several instances can share one Prometheus.

use crate::error::{Result, Vm2DhcpError};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::time::Duration;

// ============================================================================
// Metric Names
// ============================================================================

/// Final filter outcome per event (rejection reason or `accepted`).
pub const FILTER_EVENT_TOTAL: &str = "vm2dhcp_filtering_event_total";

/// Pass/fail count of every individual filter stage.
pub const FILTER_STAGE_TOTAL: &str = "vm2dhcp_filter_stage_total";

/// Filter stage evaluation latency in seconds.
pub const FILTER_LATENCY: &str = "vm2dhcp_filtering_events_latency_seconds";

/// Lease registry call latency in seconds, by stage.
pub const REGISTRY_LATENCY: &str = "vm2dhcp_dhcpd_latency_seconds";

/// Platform event stream call latency in seconds, by stage.
pub const PLATFORM_LATENCY: &str = "vm2dhcp_vsphere_latency_seconds";

/// Platform events received, by kind.
pub const PLATFORM_EVENT_TOTAL: &str = "vm2dhcp_vmware_event_total";

/// Caught failures, by kind.
pub const EXCEPTION_TOTAL: &str = "vm2dhcp_exception_total";

/// Constant 1 labelled with version and endpoints.
pub const INFO: &str = "vm2dhcp_info";

/// Installs the Prometheus exporter on `0.0.0.0:port` and describes every series.
pub fn init_exporter(port: u16) -> Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .map_err(|e| Vm2DhcpError::Metrics(format!("failed to install prometheus exporter: {e}")))?;

    describe_counter!(FILTER_EVENT_TOTAL, "VM filtering events");
    describe_counter!(FILTER_STAGE_TOTAL, "VM filter stage evaluations");
    describe_histogram!(FILTER_LATENCY, "VM filtering latency");
    describe_histogram!(REGISTRY_LATENCY, "dhcpd server latency");
    describe_histogram!(PLATFORM_LATENCY, "Virtualization platform latency");
    describe_counter!(PLATFORM_EVENT_TOTAL, "VM events received");
    describe_counter!(EXCEPTION_TOTAL, "vm2dhcp exceptions raised");
    describe_gauge!(INFO, "Constant '1' labelled by service info");

    tracing::info!("Prometheus exporter listening on port {}", port);
    Ok(())
}

/// Endpoint identity attached to every metric
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub platform: String,
    pub registry: String,
}

impl Endpoints {
    pub fn new(platform: impl Into<String>, registry: impl Into<String>) -> Self {
        Self {
            platform: platform.into(),
            registry: registry.into(),
        }
    }

    /// Publish the info gauge
    pub fn publish_info(&self) {
        gauge!(
            INFO,
            "version" => env!("CARGO_PKG_VERSION"),
            "vc" => self.platform.clone(),
            "dhcp" => self.registry.clone()
        )
        .set(1.0);
    }

    /// Increment `name` with one extra label
    pub fn increment(&self, name: &'static str, key: &'static str, value: &'static str) {
        counter!(
            name,
            "vc" => self.platform.clone(),
            "dhcp" => self.registry.clone(),
            key => value
        )
        .increment(1);
    }

    /// Count a caught failure
    pub fn failure(&self, kind: &'static str) {
        self.increment(EXCEPTION_TOTAL, "exception", kind);
    }

    /// Record a latency sample for `name` with one extra label
    pub fn latency(
        &self,
        name: &'static str,
        key: &'static str,
        value: &'static str,
        elapsed: Duration,
    ) {
        histogram!(
            name,
            "vc" => self.platform.clone(),
            "dhcp" => self.registry.clone(),
            key => value
        )
        .record(elapsed.as_secs_f64());
    }

    /// Count one filter stage evaluation
    pub fn stage_outcome(&self, filter: &'static str, passed: bool) {
        counter!(
            FILTER_STAGE_TOTAL,
            "vc" => self.platform.clone(),
            "dhcp" => self.registry.clone(),
            "filter" => filter,
            "outcome" => if passed { "pass" } else { "fail" }
        )
        .increment(1);
    }
}
