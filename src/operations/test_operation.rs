use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

use super::{OperationEncapsulation, OperationResult, Params};
use crate::models::ActionSpec;

/// In-process stand-in for a real action
///
/// The rendered code becomes stdout. Behaviour is steered with
/// `system_kwargs`:
///
/// - `success` (bool): explicit outcome, skips expectation checks
/// - `rc` (int): reported return code, default 0
/// - `stderr` (string): reported stderr
/// - `delay_ms` (int): time spent "running"
#[derive(Debug, Clone)]
pub struct TestOperation {
    spec: ActionSpec,
    timeout: Duration,
}

impl TestOperation {
    pub fn new(spec: ActionSpec, default_timeout: Duration) -> Self {
        let timeout = spec.timeout(default_timeout);
        Self { spec, timeout }
    }

    fn kwarg(&self, key: &str) -> Option<&Value> {
        self.spec.system_kwargs.get(key)
    }
}

#[async_trait]
impl OperationEncapsulation for TestOperation {
    fn spec(&self) -> &ActionSpec {
        &self.spec
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn run(&self, code: &str, _params: &Params) -> OperationResult {
        let mut result = OperationResult::started().with_stdout(code);

        if let Some(delay) = self.kwarg("delay_ms").and_then(Value::as_u64) {
            let delay = Duration::from_millis(delay);
            if delay > self.timeout {
                tokio::time::sleep(self.timeout).await;
                return result
                    .with_success(false)
                    .with_stderr(format!(
                        "Timeout of {:.1}s reached",
                        self.timeout.as_secs_f64()
                    ))
                    .finish();
            }
            tokio::time::sleep(delay).await;
        }

        result.rc = Some(
            self.kwarg("rc")
                .and_then(Value::as_i64)
                .and_then(|rc| i32::try_from(rc).ok())
                .unwrap_or(0),
        );
        if let Some(stderr) = self.kwarg("stderr").and_then(Value::as_str) {
            result.stderr = Some(stderr.to_string());
        }
        if let Some(success) = self.kwarg("success").and_then(Value::as_bool) {
            result.success = Some(success);
        }
        result.finish()
    }
}
