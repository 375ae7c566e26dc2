use async_trait::async_trait;
use serde_json::Value;
use std::io::Write;
use std::time::Duration;
use tokio::process::Command;

use super::process::run_process;
use super::{OperationEncapsulation, OperationResult, Params};
use crate::models::ActionSpec;

/// Writes the code body to a scratch playbook and runs `ansible-playbook` on it
///
/// Parameters are passed as `--extra-vars` JSON.
#[derive(Debug, Clone)]
pub struct AnsibleOperation {
    spec: ActionSpec,
    timeout: Duration,
}

impl AnsibleOperation {
    pub fn new(spec: ActionSpec, default_timeout: Duration) -> Self {
        let timeout = spec.timeout(default_timeout);
        Self { spec, timeout }
    }

    fn program(&self) -> &str {
        self.spec
            .system_kwargs
            .get("ansible_playbook")
            .and_then(Value::as_str)
            .unwrap_or("ansible-playbook")
    }
}

#[async_trait]
impl OperationEncapsulation for AnsibleOperation {
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
        let playbook = tempfile::Builder::new()
            .prefix("fleet-playbook-")
            .suffix(".yml")
            .tempfile()
            .and_then(|mut file| file.write_all(code.as_bytes()).map(|_| file));
        // dropping the handle removes the file, keep it until the run returns
        let playbook = match playbook {
            Ok(file) => file,
            Err(e) => return OperationResult::failure(format!("Unable to write playbook: {e}")),
        };

        let extra_vars = serde_json::to_string(params).unwrap_or_else(|_| "{}".to_string());
        let mut cmd = Command::new(self.program());
        cmd.arg(playbook.path()).arg("--extra-vars").arg(extra_vars);
        if let Some(inventory) = self.spec.system_kwargs.get("inventory").and_then(Value::as_str) {
            cmd.arg("-i").arg(inventory);
        }
        run_process(cmd, params, self.timeout).await
    }
}
