//! Single-process implementations of the boundary contracts.
//!
//! They back tests and single-node installs; the distributed versions of
//! these collaborators live outside this crate.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use super::interfaces::{
    DistributedLock, ExecutionSink, LockError, LockHandle, LockRequest, OrchestrationCatalog,
    OrchestrationExecutionRecord, Route, RouteResolver, StepExecutionRecord, TransportError,
};
use crate::models::{Orchestration, ServerId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LockPhase {
    Prevented,
    Locked,
}

#[derive(Debug, Default)]
struct LockTable {
    /// server -> handle holding it
    holders: HashMap<ServerId, Uuid>,
    handles: HashMap<Uuid, (LockHandle, LockPhase)>,
}

/// Advisory exclusive lock over server sets within one process
#[derive(Debug, Default)]
pub struct InProcessLock {
    table: Mutex<LockTable>,
}

impl InProcessLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_held(&self, server_id: &ServerId) -> bool {
        self.table.lock().holders.contains_key(server_id)
    }

    pub fn active_handles(&self) -> usize {
        self.table.lock().handles.len()
    }
}

#[async_trait]
impl DistributedLock for InProcessLock {
    async fn prevent(&self, request: LockRequest) -> Result<LockHandle, LockError> {
        let mut table = self.table.lock();
        for server_id in &request.servers {
            if let Some(holder) = table.holders.get(server_id) {
                return Err(LockError::Contended {
                    server_id: *server_id,
                    holder: *holder,
                });
            }
        }

        let handle = LockHandle {
            id: Uuid::new_v4(),
            scope: request.scope,
            servers: request.servers,
        };
        for server_id in &handle.servers {
            table.holders.insert(*server_id, handle.id);
        }
        table
            .handles
            .insert(handle.id, (handle.clone(), LockPhase::Prevented));
        debug!(handle = %handle.id, scope = %handle.scope, "🔒 LOCK: Prevented");
        Ok(handle)
    }

    async fn lock(&self, handle: &LockHandle) -> Result<(), LockError> {
        let mut table = self.table.lock();
        let (_, phase) = table
            .handles
            .get_mut(&handle.id)
            .ok_or(LockError::UnknownHandle { handle: handle.id })?;
        if *phase != LockPhase::Prevented {
            return Err(LockError::WrongPhase {
                handle: handle.id,
                expected: "prevent".to_string(),
            });
        }
        *phase = LockPhase::Locked;
        debug!(handle = %handle.id, "🔒 LOCK: Locked");
        Ok(())
    }

    async fn unlock(&self, handle: &LockHandle) -> Result<(), LockError> {
        let mut table = self.table.lock();
        let (held, _) = table
            .handles
            .remove(&handle.id)
            .ok_or(LockError::UnknownHandle { handle: handle.id })?;
        for server_id in &held.servers {
            if table.holders.get(server_id) == Some(&held.id) {
                table.holders.remove(server_id);
            }
        }
        debug!(handle = %handle.id, "🔓 LOCK: Released");
        Ok(())
    }
}

/// Fixed server -> address table
#[derive(Debug, Default)]
pub struct StaticRoutes {
    routes: DashMap<ServerId, Route>,
}

impl StaticRoutes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_route(self, server_id: ServerId, address: impl Into<String>) -> Self {
        self.insert(Route {
            destination: server_id,
            address: address.into(),
            via: None,
        });
        self
    }

    pub fn insert(&self, route: Route) {
        self.routes.insert(route.destination, route);
    }
}

#[async_trait]
impl RouteResolver for StaticRoutes {
    async fn resolve(&self, server_id: ServerId) -> Result<Route, TransportError> {
        self.routes
            .get(&server_id)
            .map(|route| route.value().clone())
            .ok_or(TransportError::Unreachable { server_id })
    }
}

/// Keeps every record in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    steps: Mutex<Vec<StepExecutionRecord>>,
    orchestrations: Mutex<Vec<OrchestrationExecutionRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn steps(&self) -> Vec<StepExecutionRecord> {
        self.steps.lock().clone()
    }

    pub fn orchestrations(&self) -> Vec<OrchestrationExecutionRecord> {
        self.orchestrations.lock().clone()
    }
}

#[async_trait]
impl ExecutionSink for MemorySink {
    async fn record_step(&self, record: StepExecutionRecord) -> anyhow::Result<()> {
        self.steps.lock().push(record);
        Ok(())
    }

    async fn record_orchestration(&self, record: OrchestrationExecutionRecord) -> anyhow::Result<()> {
        self.orchestrations.lock().push(record);
        Ok(())
    }
}

/// Orchestrations by name and version
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    entries: RwLock<BTreeMap<(String, u32), Arc<Orchestration>>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, orchestration: Orchestration) -> Arc<Orchestration> {
        let shared = Arc::new(orchestration);
        self.entries.write().insert(
            (shared.name.clone(), shared.version),
            Arc::clone(&shared),
        );
        shared
    }
}

#[async_trait]
impl OrchestrationCatalog for MemoryCatalog {
    async fn find(&self, name: &str, version: Option<u32>) -> Option<Arc<Orchestration>> {
        let entries = self.entries.read();
        match version {
            Some(version) => entries.get(&(name.to_string(), version)).cloned(),
            None => entries
                .iter()
                .filter(|((entry_name, _), _)| entry_name == name)
                .max_by_key(|((_, entry_version), _)| *entry_version)
                .map(|(_, orchestration)| Arc::clone(orchestration)),
        }
    }
}
