use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tokio::process::Command;

use super::process::run_process;
use super::{OperationEncapsulation, OperationResult, Params};
use crate::models::ActionSpec;

/// Runs the code body through `sh -c` (or `system_kwargs.shell`)
#[derive(Debug, Clone)]
pub struct ShellOperation {
    spec: ActionSpec,
    timeout: Duration,
}

impl ShellOperation {
    pub fn new(spec: ActionSpec, default_timeout: Duration) -> Self {
        let timeout = spec.timeout(default_timeout);
        Self { spec, timeout }
    }

    fn shell(&self) -> &str {
        self.spec
            .system_kwargs
            .get("shell")
            .and_then(Value::as_str)
            .unwrap_or("sh")
    }
}

#[async_trait]
impl OperationEncapsulation for ShellOperation {
    fn spec(&self) -> &ActionSpec {
        &self.spec
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn default_expected_rc(&self) -> Option<i32> {
        Some(0)
    }

    async fn run(&self, code: &str, params: &Params) -> OperationResult {
        let mut cmd = Command::new(self.shell());
        cmd.arg("-c").arg(code);
        if let Some(dir) = self.spec.system_kwargs.get("cwd").and_then(Value::as_str) {
            cmd.current_dir(dir);
        }
        run_process(cmd, params, self.timeout).await
    }
}
