//! Reservation reconciler
//!
//! Turns an accepted [`VmSnapshot`] into registry calls: for every adapter a
//! delete of any existing reservation, then a create with the VM's options.
//! Each call is attempted once; the next event for the VM is the retry.
//! Failures are logged and counted, never returned.

mod record;

pub use record::{
    build_options, option_fields, render_statements, DhcpOptions, RecordError, ReservationPlan,
    ReservationRecord, DOMAIN_NAME_OPTION, HOST_NAME_OPTION,
};

use crate::inventory::VmSnapshot;
use crate::registry::{LeaseRegistry, RegistryError, RegistrySession};
use crate::telemetry::{Endpoints, REGISTRY_LATENCY};
use std::time::Instant;

/// How far a reconciliation got
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReconcileStatus {
    /// Every record was attempted
    #[default]
    Completed,
    /// The VM name is not an FQDN; nothing was sent
    InvalidName,
    /// No adapter carried a usable MAC address; nothing was sent
    NothingToRegister,
    /// The registry could not be reached; nothing was sent
    ConnectFailed,
}

/// Summary of one reconciliation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub status: ReconcileStatus,
    /// Existing reservations removed
    pub deleted: usize,
    /// Deletes answered with "not found"
    pub absent: usize,
    pub delete_failures: usize,
    pub created: usize,
    pub create_failures: usize,
    pub invalid_macs: usize,
}

/// Applies reservation plans to a lease registry
pub struct Reconciler<R: LeaseRegistry> {
    registry: R,
    namespace: String,
    group: Option<String>,
    endpoints: Endpoints,
}

impl<R: LeaseRegistry> Reconciler<R> {
    pub fn new(
        registry: R,
        namespace: impl Into<String>,
        group: Option<String>,
        endpoints: Endpoints,
    ) -> Self {
        if let Some(group) = &group {
            tracing::warn!(
                "Registry group '{}' is sent with every host; the registry gives it precedence over per-host options",
                group
            );
        }

        Self {
            registry,
            namespace: namespace.into(),
            group,
            endpoints,
        }
    }

    pub fn registry(&self) -> &R {
        &self.registry
    }

    /// Register every adapter of the VM, deleting stale reservations first
    pub async fn reconcile(&self, snapshot: &VmSnapshot) -> ReconcileReport {
        let mut report = ReconcileReport::default();

        tracing::debug!(
            "Custom attributes published for {}: {:?}",
            snapshot.name,
            snapshot.custom_field_definitions
        );

        let plan = match ReservationPlan::from_snapshot(snapshot, &self.namespace) {
            Ok(plan) => plan,
            Err(e) => {
                tracing::error!("Skipping VM: {}", e);
                self.endpoints.failure("invalid_name");
                report.status = ReconcileStatus::InvalidName;
                return report;
            }
        };

        for raw in &plan.invalid_macs {
            tracing::warn!("Skipping adapter of {} with invalid MAC address {:?}", plan.fqdn, raw);
            self.endpoints.failure("invalid_mac");
            report.invalid_macs += 1;
        }

        if plan.records.is_empty() {
            report.status = ReconcileStatus::NothingToRegister;
            return report;
        }

        tracing::info!(
            "Connecting to DHCP server: {}",
            self.registry.endpoint()
        );
        let start = Instant::now();
        let connected = self.registry.connect().await;
        self.endpoints
            .latency(REGISTRY_LATENCY, "stage", "connect", start.elapsed());

        let mut session = match connected {
            Ok(session) => session,
            Err(e) => {
                tracing::error!("Unable to connect to DHCP server: {}", e);
                self.endpoints.failure(e.kind());
                report.status = ReconcileStatus::ConnectFailed;
                return report;
            }
        };

        for record in &plan.records {
            self.register(session.as_mut(), record, &mut report).await;
        }

        tracing::info!(
            "Disconnecting from DHCP server: {}",
            self.registry.endpoint()
        );
        let start = Instant::now();
        let disconnected = session.disconnect().await;
        self.endpoints
            .latency(REGISTRY_LATENCY, "stage", "disconnect", start.elapsed());
        if let Err(e) = disconnected {
            tracing::error!("Error during disconnection: {}", e);
            self.endpoints.failure(e.kind());
        }

        report
    }

    async fn register(
        &self,
        session: &mut dyn RegistrySession,
        record: &ReservationRecord,
        report: &mut ReconcileReport,
    ) {
        let mac = record.mac_address;

        let start = Instant::now();
        let deleted = session.delete_host(mac).await;
        self.endpoints
            .latency(REGISTRY_LATENCY, "stage", "del_host", start.elapsed());
        match deleted {
            Ok(()) => report.deleted += 1,
            Err(RegistryError::NotFound(_)) => {
                tracing::debug!("No previous reservation for {}", mac);
                self.endpoints.failure("not_found");
                report.absent += 1;
            }
            Err(e) => {
                tracing::error!("Error while unregistering {} in DHCP server: {}", mac, e);
                self.endpoints.failure(e.kind());
                report.delete_failures += 1;
            }
        }

        tracing::debug!("DHCP options for {}: {:?}", mac, record.options);
        let start = Instant::now();
        let created = session
            .create_host(mac, &record.options, self.group.as_deref())
            .await;
        self.endpoints
            .latency(REGISTRY_LATENCY, "stage", "add_host", start.elapsed());
        match created {
            Ok(()) => report.created += 1,
            Err(e) => {
                tracing::error!("Error while registering {} in DHCP server: {}", mac, e);
                self.endpoints.failure(e.kind());
                report.create_failures += 1;
            }
        }
    }
}
