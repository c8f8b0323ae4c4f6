//! Lease registry client interface
//!
//! The registry holds static DHCP host reservations keyed by MAC address.
//! A session is opened per VM, used for all of its adapters, then closed.

mod memory;

pub use memory::{HostEntry, MemoryRegistry, RegistryCall};

use crate::inventory::MacAddress;
use crate::reconcile::DhcpOptions;
use async_trait::async_trait;
use thiserror::Error;

/// Errors reported by a lease registry
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// The registry could not be reached or refused the credentials
    #[error("Connection failed: {0}")]
    Connect(String),

    /// No reservation exists for the address; expected for first-time adds
    #[error("Host not found: {0}")]
    NotFound(MacAddress),

    /// Any other registry failure
    #[error("Registry error: {0}")]
    Other(String),
}

impl RegistryError {
    /// Label used when counting the failure
    pub fn kind(&self) -> &'static str {
        match self {
            RegistryError::Connect(_) => "registry_connect",
            RegistryError::NotFound(_) => "not_found",
            RegistryError::Other(_) => "registry_error",
        }
    }
}

/// Factory for registry sessions
#[async_trait]
pub trait LeaseRegistry: Send + Sync {
    /// Endpoint identity, for logs
    fn endpoint(&self) -> String;

    async fn connect(&self) -> Result<Box<dyn RegistrySession>, RegistryError>;
}

/// An open connection to the registry
#[async_trait]
pub trait RegistrySession: Send {
    /// Remove the reservation for `mac`
    async fn delete_host(&mut self, mac: MacAddress) -> Result<(), RegistryError>;

    /// Create a reservation for `mac`.
    ///
    /// The registry gives a group assignment precedence over individually
    /// supplied options.
    async fn create_host(
        &mut self,
        mac: MacAddress,
        options: &DhcpOptions,
        group: Option<&str>,
    ) -> Result<(), RegistryError>;

    async fn disconnect(&mut self) -> Result<(), RegistryError>;
}
