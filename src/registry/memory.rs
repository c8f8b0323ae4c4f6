// In-memory lease registry: dry-run sink for the binary and test double

use crate::inventory::MacAddress;
use crate::reconcile::{render_statements, DhcpOptions};
use crate::registry::{LeaseRegistry, RegistryError, RegistrySession};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

/// A stored reservation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostEntry {
    pub options: DhcpOptions,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    /// Statements as the registry would store them
    pub statements: String,
}

/// Calls received, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryCall {
    Connect,
    DeleteHost(MacAddress),
    CreateHost(MacAddress, DhcpOptions),
    Disconnect,
}

#[derive(Default)]
struct State {
    hosts: BTreeMap<MacAddress, HostEntry>,
    calls: Vec<RegistryCall>,
    refuse_connections: bool,
    failing_deletes: HashSet<MacAddress>,
    failing_creates: HashSet<MacAddress>,
    recording: bool,
}

impl State {
    fn record(&mut self, call: RegistryCall) {
        if self.recording {
            self.calls.push(call);
        }
    }
}

/// Registry keeping reservations in process memory.
///
/// Clones share the same state. Creating a host that already exists fails,
/// like an exclusive create on a real registry. Calls are only kept when
/// recording is switched on, so a long-running dry run stays bounded.
#[derive(Clone, Default)]
pub struct MemoryRegistry {
    name: String,
    state: Arc<Mutex<State>>,
}

impl MemoryRegistry {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Arc::default(),
        }
    }

    /// Keep every call received, for inspection through [`calls`](Self::calls)
    pub fn recording(self, on: bool) -> Self {
        self.lock().recording = on;
        self
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Reservations currently held
    pub fn hosts(&self) -> BTreeMap<MacAddress, HostEntry> {
        self.lock().hosts.clone()
    }

    pub fn host(&self, mac: &MacAddress) -> Option<HostEntry> {
        self.lock().hosts.get(mac).cloned()
    }

    /// Every call received while recording
    pub fn calls(&self) -> Vec<RegistryCall> {
        self.lock().calls.clone()
    }

    /// Seed a reservation without recording a call
    pub fn insert_host(&self, mac: MacAddress, options: DhcpOptions) {
        let statements = render_statements(&options);
        self.lock().hosts.insert(
            mac,
            HostEntry {
                options,
                group: None,
                statements,
            },
        );
    }

    /// Make subsequent connection attempts fail
    pub fn refuse_connections(&self, refuse: bool) {
        self.lock().refuse_connections = refuse;
    }

    /// Make deletes of `mac` fail with a non-NotFound error
    pub fn fail_deletes_for(&self, mac: MacAddress) {
        self.lock().failing_deletes.insert(mac);
    }

    /// Make creates of `mac` fail
    pub fn fail_creates_for(&self, mac: MacAddress) {
        self.lock().failing_creates.insert(mac);
    }
}

#[async_trait]
impl LeaseRegistry for MemoryRegistry {
    fn endpoint(&self) -> String {
        format!("memory:{}", self.name)
    }

    async fn connect(&self) -> Result<Box<dyn RegistrySession>, RegistryError> {
        let mut state = self.lock();
        state.record(RegistryCall::Connect);
        if state.refuse_connections {
            return Err(RegistryError::Connect(format!(
                "{} refused the connection",
                self.endpoint()
            )));
        }
        Ok(Box::new(MemorySession {
            state: self.state.clone(),
        }))
    }
}

struct MemorySession {
    state: Arc<Mutex<State>>,
}

impl MemorySession {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl RegistrySession for MemorySession {
    async fn delete_host(&mut self, mac: MacAddress) -> Result<(), RegistryError> {
        let mut state = self.lock();
        state.record(RegistryCall::DeleteHost(mac));

        if state.failing_deletes.contains(&mac) {
            return Err(RegistryError::Other(format!("delete of {} failed", mac)));
        }
        match state.hosts.remove(&mac) {
            Some(_) => {
                tracing::info!("Deleted host {}", mac);
                Ok(())
            }
            None => Err(RegistryError::NotFound(mac)),
        }
    }

    async fn create_host(
        &mut self,
        mac: MacAddress,
        options: &DhcpOptions,
        group: Option<&str>,
    ) -> Result<(), RegistryError> {
        let mut state = self.lock();
        state.record(RegistryCall::CreateHost(mac, options.clone()));

        if state.failing_creates.contains(&mac) {
            return Err(RegistryError::Other(format!("add of {} failed", mac)));
        }
        if state.hosts.contains_key(&mac) {
            return Err(RegistryError::Other(format!("host {} already exists", mac)));
        }

        let statements = render_statements(options);
        tracing::info!("Created host {}: {}", mac, statements);
        state.hosts.insert(
            mac,
            HostEntry {
                options: options.clone(),
                group: group.map(str::to_string),
                statements,
            },
        );
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), RegistryError> {
        self.lock().record(RegistryCall::Disconnect);
        Ok(())
    }
}
