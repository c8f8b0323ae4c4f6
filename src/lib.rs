//! vm2dhcp - VM to DHCP reservation synchronizer
//!
//! Follows the event stream of a virtualization platform, keeps only the
//! VMs worth a reservation and registers each of their network adapters in
//! a DHCP lease registry, deleting any stale reservation first.

pub mod cli;
pub mod config;
pub mod daemon;
pub mod error;
pub mod filtering;
pub mod fqdn;
pub mod inventory;
pub mod reconcile;
pub mod registry;
pub mod source;
pub mod telemetry;

pub use error::{Result, Vm2DhcpError};
