use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;
use tracing::info;

use super::{OperationEncapsulation, OperationResult, Params};
use crate::deployment::{deploy, DeployOptions, RuntimeContext};
use crate::models::{ActionSpec, ServerId, TargetMapping};

/// Parameter holding the target mapping of the nested run
pub const HOSTS_PARAM: &str = "hosts";

/// Runs another orchestration as a single step
///
/// The rendered code names it as `name` or `name:version` (latest version
/// when omitted). The nested run shares the runtime context and does not
/// take the deployment lock again. Its target mapping comes from the
/// `hosts` parameter, by default every step on the current server.
#[derive(Debug, Clone)]
pub struct OrchestrationOperation {
    spec: ActionSpec,
    ctx: RuntimeContext,
    timeout: Duration,
}

impl OrchestrationOperation {
    pub fn new(spec: ActionSpec, ctx: RuntimeContext) -> Self {
        let timeout = spec.timeout(ctx.config().execution.default_operation_timeout());
        Self { spec, ctx, timeout }
    }

    fn target(&self, params: &Params) -> Result<TargetMapping, String> {
        match params.get(HOSTS_PARAM) {
            None => Ok(TargetMapping::from([(
                crate::constants::system::DEFAULT_TARGET.to_string(),
                vec![self.ctx.server().id],
            )])),
            Some(hosts) => serde_json::from_value::<TargetMapping>(hosts.clone())
                .map_err(|e| format!("Invalid '{HOSTS_PARAM}' parameter: {e}")),
        }
    }
}

/// Split `name[:version]`
fn parse_reference(code: &str) -> Result<(&str, Option<u32>), String> {
    let code = code.trim();
    match code.rsplit_once(':') {
        Some((name, version)) => version
            .trim()
            .parse()
            .map(|version| (name.trim(), Some(version)))
            .map_err(|_| format!("Invalid orchestration version in '{code}'")),
        None if code.is_empty() => Err("Empty orchestration reference".to_string()),
        None => Ok((code, None)),
    }
}

#[async_trait]
impl OperationEncapsulation for OrchestrationOperation {
    fn spec(&self) -> &ActionSpec {
        &self.spec
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn run(&self, code: &str, params: &Params) -> OperationResult {
        let (name, version) = match parse_reference(code) {
            Ok(reference) => reference,
            Err(e) => return OperationResult::failure(e),
        };
        let Some(catalog) = self.ctx.catalog() else {
            return OperationResult::failure("No orchestration catalog configured");
        };
        let Some(orchestration) = catalog.find(name, version).await else {
            return OperationResult::failure(format!("Orchestration '{code}' not found"));
        };
        let target = match self.target(params) {
            Ok(target) => target,
            Err(e) => return OperationResult::failure(e),
        };

        let mut nested_params = params.clone();
        nested_params.remove(HOSTS_PARAM);
        info!(
            orchestration = %orchestration.name,
            version = orchestration.version,
            "Running nested orchestration"
        );

        let result = OperationResult::started();
        let run = deploy(
            &self.ctx,
            &orchestration,
            nested_params,
            &target,
            DeployOptions::default().without_lock(),
        );
        match tokio::time::timeout(self.timeout, run).await {
            Ok(Ok(outcome)) => {
                let servers: Vec<ServerId> = outcome.results.keys().map(|k| k.server_id).collect();
                let summary = json!({
                    "execution_id": outcome.execution_id,
                    "orchestration": orchestration.name,
                    "version": orchestration.version,
                    "forward_success": outcome.forward_success,
                    "undo_success": outcome.undo_success,
                    "steps": outcome.results.len(),
                    "servers": servers.len(),
                });
                result
                    .with_success(outcome.forward_success.unwrap_or(true))
                    .with_stdout(summary.to_string())
                    .with_rc(0)
                    .finish()
            }
            Ok(Err(e)) => result.with_success(false).with_stderr(e.to_string()).finish(),
            Err(_) => result
                .with_success(false)
                .with_stderr(format!(
                    "Timeout of {:.1}s reached",
                    self.timeout.as_secs_f64()
                ))
                .finish(),
        }
    }
}
