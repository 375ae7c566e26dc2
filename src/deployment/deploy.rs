use chrono::Utc;
use serde_json::json;
use std::collections::BTreeSet;
use thiserror::Error;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::assembly::{create_cmd_from_orchestration, AssemblyInput};
use super::interfaces::{
    LockError, LockHandle, LockRequest, OrchestrationExecutionRecord, StepExecutionRecord,
};
use super::RuntimeContext;
use crate::commands::{CommandError, Executable, ExecutionRecords, VarContext};
use crate::constants::events::{DEPLOYMENT_COMPLETED, DEPLOYMENT_STARTED, DEPLOYMENT_UNDO_STARTED};
use crate::logging::{log_deployment_operation, log_error};
use crate::models::{GraphError, Orchestration, ServerId, TargetMapping};
use crate::operations::{OperationError, Params};

#[derive(Debug, Error)]
pub enum DeploymentError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Operation(#[from] OperationError),

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("Deployment lock not acquired: {0}")]
    Lock(#[from] LockError),

    #[error("Target group '{target}' has no servers mapped")]
    UnmappedTarget { target: String },

    #[error("Missing required parameters: {}", names.join(", "))]
    MissingParameters { names: Vec<String> },

    #[error("Server {server_id} is remote but no command transport is configured")]
    NoTransport { server_id: ServerId },
}

/// Per-run overrides
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeployOptions {
    /// Run every level even after failures; `None` uses the configuration
    pub force_all: Option<bool>,
    /// Roll back after a failed forward run; `None` uses the orchestration
    pub undo_on_error: Option<bool>,
    pub acquire_lock: bool,
}

impl Default for DeployOptions {
    fn default() -> Self {
        Self {
            force_all: None,
            undo_on_error: None,
            acquire_lock: true,
        }
    }
}

impl DeployOptions {
    pub fn with_force_all(mut self, force_all: bool) -> Self {
        self.force_all = Some(force_all);
        self
    }

    pub fn with_undo_on_error(mut self, undo_on_error: bool) -> Self {
        self.undo_on_error = Some(undo_on_error);
        self
    }

    pub fn without_lock(mut self) -> Self {
        self.acquire_lock = false;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeploymentOutcome {
    pub execution_id: Uuid,
    pub forward_success: Option<bool>,
    pub undo_success: Option<bool>,
    pub results: ExecutionRecords,
}

/// Run `orchestration` on the servers named by `target`.
///
/// Ordinary step failures are reported in the outcome; `Err` is reserved for
/// contract violations (graph, unsupported kinds, unmapped targets, missing
/// parameters), lock failures and scheduler capacity.
#[instrument(skip_all, fields(orchestration = %orchestration.name, version = orchestration.version))]
pub async fn deploy(
    ctx: &RuntimeContext,
    orchestration: &Orchestration,
    params: Params,
    target: &TargetMapping,
    options: DeployOptions,
) -> Result<DeploymentOutcome, DeploymentError> {
    let execution_id = Uuid::new_v4();
    let started_at = Utc::now();

    for group in orchestration.target_groups() {
        if !target.contains_key(&group) {
            return Err(DeploymentError::UnmappedTarget { target: group });
        }
    }
    let schema = orchestration.schema()?;
    let missing: Vec<String> = schema.missing_required(&params).cloned().collect();
    if !missing.is_empty() {
        return Err(DeploymentError::MissingParameters { names: missing });
    }

    let vars = VarContext::new(params.clone());
    let force_all = options
        .force_all
        .unwrap_or(ctx.config().execution.force_all);
    let root = create_cmd_from_orchestration(
        ctx,
        orchestration,
        &AssemblyInput {
            execution_id,
            vars: &vars,
            target,
            force_all,
        },
    )?;

    let handle = if options.acquire_lock {
        Some(acquire(ctx, orchestration, target).await?)
    } else {
        None
    };

    let execution = execution_id.to_string();
    log_deployment_operation("deploy", &execution, Some(&orchestration.name), "started", None);
    ctx.events().publish(
        DEPLOYMENT_STARTED,
        json!({
            "execution_id": execution_id,
            "orchestration": orchestration.name,
            "version": orchestration.version,
            "nodes": root.len(),
        }),
    );

    let undo_on_error = options.undo_on_error.unwrap_or(orchestration.undo_on_error);
    let run: Result<(Option<bool>, Option<bool>), CommandError> = async {
        let forward = root.invoke().await?;
        let undo = if forward == Some(false) && undo_on_error {
            info!(execution_id = %execution_id, "Forward run failed, undoing");
            ctx.events()
                .publish(DEPLOYMENT_UNDO_STARTED, json!({"execution_id": execution_id}));
            root.undo().await?
        } else {
            None
        };
        Ok((forward, undo))
    }
    .await;

    if let Some(handle) = handle {
        if let Err(e) = ctx.lock().unlock(&handle).await {
            log_error("deployment", "unlock", &e.to_string(), Some(&execution));
        }
    }

    let (forward_success, undo_success) = run?;
    let results = root.result();
    record(
        ctx,
        orchestration,
        &params,
        target,
        execution_id,
        started_at,
        forward_success,
        undo_success,
        &results,
    )
    .await;

    log_deployment_operation(
        "deploy",
        &execution,
        Some(&orchestration.name),
        match forward_success {
            Some(true) => "success",
            Some(false) => "failure",
            None => "empty",
        },
        undo_success.map(|ok| if ok { "undo succeeded" } else { "undo failed" }),
    );
    ctx.events().publish(
        DEPLOYMENT_COMPLETED,
        json!({
            "execution_id": execution_id,
            "forward_success": forward_success,
            "undo_success": undo_success,
            "results": results.len(),
        }),
    );

    Ok(DeploymentOutcome {
        execution_id,
        forward_success,
        undo_success,
        results,
    })
}

async fn acquire(
    ctx: &RuntimeContext,
    orchestration: &Orchestration,
    target: &TargetMapping,
) -> Result<LockHandle, DeploymentError> {
    let groups = orchestration.target_groups();
    let servers: BTreeSet<ServerId> = target
        .iter()
        .filter(|(group, _)| groups.contains(*group))
        .flat_map(|(_, servers)| servers.iter().copied())
        .collect();

    let handle = ctx
        .lock()
        .prevent(LockRequest {
            scope: orchestration.name.clone(),
            servers: servers.into_iter().collect(),
            applicant: ctx.server().id,
            watermark: None,
        })
        .await?;
    if let Err(e) = ctx.lock().lock(&handle).await {
        if let Err(release) = ctx.lock().unlock(&handle).await {
            warn!(error = %release, "🔓 LOCK: Release after failed commit also failed");
        }
        return Err(e.into());
    }
    Ok(handle)
}

#[allow(clippy::too_many_arguments)]
async fn record(
    ctx: &RuntimeContext,
    orchestration: &Orchestration,
    params: &Params,
    target: &TargetMapping,
    execution_id: Uuid,
    started_at: chrono::DateTime<Utc>,
    forward_success: Option<bool>,
    undo_success: Option<bool>,
    results: &ExecutionRecords,
) {
    let Some(sink) = ctx.sink() else {
        return;
    };
    let execution = execution_id.to_string();

    let summary = OrchestrationExecutionRecord {
        execution_id,
        orchestration_id: orchestration.id,
        orchestration_name: orchestration.name.clone(),
        version: orchestration.version,
        params: params.clone(),
        target: target.clone(),
        executor: ctx.server().id,
        forward_success,
        undo_success,
        started_at,
        finished_at: Utc::now(),
    };
    if let Err(e) = sink.record_orchestration(summary).await {
        log_error("deployment", "record_orchestration", &e.to_string(), Some(&execution));
    }

    for (key, result) in results {
        let record = StepExecutionRecord {
            execution_id,
            step_id: key.step_id,
            server_id: key.server_id,
            compensates: key.compensates,
            result: result.clone(),
        };
        if let Err(e) = sink.record_step(record).await {
            log_error("deployment", "record_step", &e.to_string(), Some(&execution));
        }
    }
}
