use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tokio::process::Command;

use super::process::run_process;
use super::{OperationEncapsulation, OperationResult, Params};
use crate::models::ActionSpec;

/// Runs the code body with `python3 -c` (or `system_kwargs.interpreter`)
///
/// The resolved parameters are available to the script as JSON in the
/// `FLEET_PARAMS` environment variable.
#[derive(Debug, Clone)]
pub struct PythonOperation {
    spec: ActionSpec,
    timeout: Duration,
}

impl PythonOperation {
    pub fn new(spec: ActionSpec, default_timeout: Duration) -> Self {
        let timeout = spec.timeout(default_timeout);
        Self { spec, timeout }
    }

    fn interpreter(&self) -> &str {
        self.spec
            .system_kwargs
            .get("interpreter")
            .and_then(Value::as_str)
            .unwrap_or("python3")
    }
}

#[async_trait]
impl OperationEncapsulation for PythonOperation {
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
        let mut cmd = Command::new(self.interpreter());
        cmd.arg("-c").arg(code);
        run_process(cmd, params, self.timeout).await
    }
}
