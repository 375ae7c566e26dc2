//! Boundary contracts to collaborators living outside the engine.
//!
//! [`super::in_process`] holds single-process implementations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::commands::RemoteCommandRequest;
use crate::models::{Orchestration, OrchestrationId, ServerId, StepId, TargetMapping};
use crate::operations::{OperationResult, Params};

// ============================================================================
// Distributed lock
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRequest {
    /// What the lock protects, usually the orchestration name
    pub scope: String,
    pub servers: Vec<ServerId>,
    pub applicant: ServerId,
    /// Catalog version the applicant has seen
    pub watermark: Option<String>,
}

/// Opaque acquisition handle; release by presenting it again
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LockHandle {
    pub id: Uuid,
    pub scope: String,
    pub servers: Vec<ServerId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LockError {
    #[error("Server {server_id} is already held by lock {holder}")]
    Contended { server_id: ServerId, holder: Uuid },

    #[error("Unknown lock handle {handle}")]
    UnknownHandle { handle: Uuid },

    #[error("Lock {handle} is not in the '{expected}' phase")]
    WrongPhase { handle: Uuid, expected: String },

    #[error("Lock service unavailable: {0}")]
    Unavailable(String),
}

/// Three-phase advisory lock: `prevent` -> `lock` -> `unlock`
#[async_trait]
pub trait DistributedLock: Send + Sync + fmt::Debug {
    /// Reserve intent over the requested servers
    async fn prevent(&self, request: LockRequest) -> Result<LockHandle, LockError>;

    /// Commit a reservation
    async fn lock(&self, handle: &LockHandle) -> Result<(), LockError>;

    /// Release a reservation or a committed lock
    async fn unlock(&self, handle: &LockHandle) -> Result<(), LockError>;
}

// ============================================================================
// Remote command transport and routing
// ============================================================================

/// How to reach a server, possibly through a proxy hop
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pub destination: ServerId,
    pub address: String,
    pub via: Option<ServerId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("No route to server {server_id}")]
    Unreachable { server_id: ServerId },

    #[error("Server {server_id} rejected the command: {reason}")]
    Rejected { server_id: ServerId, reason: String },

    #[error("Transport failure: {0}")]
    Io(String),
}

#[async_trait]
pub trait RouteResolver: Send + Sync + fmt::Debug {
    async fn resolve(&self, server_id: ServerId) -> Result<Route, TransportError>;
}

/// Outbound half of remote execution. The inbound completion is delivered
/// to [`crate::commands::CompletionRegistry::complete`].
#[async_trait]
pub trait RemoteCommandTransport: Send + Sync + fmt::Debug {
    /// Deliver a request; `Ok` is the remote acknowledgement only.
    async fn send(&self, route: &Route, request: RemoteCommandRequest) -> Result<(), TransportError>;
}

// ============================================================================
// Execution records
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestrationExecutionRecord {
    pub execution_id: Uuid,
    pub orchestration_id: OrchestrationId,
    pub orchestration_name: String,
    pub version: u32,
    pub params: Params,
    pub target: TargetMapping,
    pub executor: ServerId,
    pub forward_success: Option<bool>,
    pub undo_success: Option<bool>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepExecutionRecord {
    pub execution_id: Uuid,
    pub step_id: StepId,
    pub server_id: ServerId,
    /// Do step an undo run compensated
    pub compensates: Option<StepId>,
    pub result: OperationResult,
}

/// Optional persistence of terminal results
#[async_trait]
pub trait ExecutionSink: Send + Sync + fmt::Debug {
    async fn record_step(&self, record: StepExecutionRecord) -> anyhow::Result<()>;

    async fn record_orchestration(&self, record: OrchestrationExecutionRecord) -> anyhow::Result<()>;
}

// ============================================================================
// Orchestration catalog
// ============================================================================

/// Lookup of orchestrations run as nested steps
#[async_trait]
pub trait OrchestrationCatalog: Send + Sync + fmt::Debug {
    /// Latest version when `version` is `None`
    async fn find(&self, name: &str, version: Option<u32>) -> Option<Arc<Orchestration>>;
}
