use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

use super::{OperationEncapsulation, OperationResult, Params};
use crate::models::ActionSpec;

/// Built-in actions executed by the engine itself
///
/// The rendered code names the action:
///
/// - `echo`: stdout is the `message` parameter, or all parameters as JSON
/// - `sleep`: waits `seconds` (bounded by the timeout)
/// - `noop`: succeeds immediately
#[derive(Debug, Clone)]
pub struct NativeOperation {
    spec: ActionSpec,
    timeout: Duration,
}

impl NativeOperation {
    pub fn new(spec: ActionSpec, default_timeout: Duration) -> Self {
        let timeout = spec.timeout(default_timeout);
        Self { spec, timeout }
    }

    async fn sleep(&self, params: &Params) -> OperationResult {
        let result = OperationResult::started();
        let Some(seconds) = params.get("seconds").and_then(Value::as_f64) else {
            return result
                .with_success(false)
                .with_stderr("Native sleep requires a numeric 'seconds' parameter")
                .finish();
        };
        let wanted = Duration::from_secs_f64(seconds.max(0.0));
        if wanted > self.timeout {
            tokio::time::sleep(self.timeout).await;
            return result
                .with_success(false)
                .with_stderr(format!(
                    "Timeout of {:.1}s reached",
                    self.timeout.as_secs_f64()
                ))
                .finish();
        }
        tokio::time::sleep(wanted).await;
        result.with_rc(0).finish()
    }
}

#[async_trait]
impl OperationEncapsulation for NativeOperation {
    fn spec(&self) -> &ActionSpec {
        &self.spec
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn run(&self, code: &str, params: &Params) -> OperationResult {
        match code.trim() {
            "echo" => {
                let stdout = match params.get("message") {
                    Some(Value::String(message)) => message.clone(),
                    Some(other) => other.to_string(),
                    None => Value::Object(params.clone()).to_string(),
                };
                OperationResult::started()
                    .with_stdout(stdout)
                    .with_rc(0)
                    .finish()
            }
            "sleep" => self.sleep(params).await,
            "noop" => OperationResult::started().with_rc(0).finish(),
            other => OperationResult::failure(format!("Unknown native action '{other}'")),
        }
    }
}
