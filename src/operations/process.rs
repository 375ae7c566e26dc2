//! Child-process runner shared by the shell, python and ansible operations.

use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::warn;

use super::{OperationResult, Params};

/// Environment variable carrying the resolved parameters as JSON
pub const PARAMS_ENV_VAR: &str = "FLEET_PARAMS";

/// Run `cmd` to completion, killing it once `limit` elapses.
///
/// Spawn failures and timeouts become failed results with the error as stderr.
pub async fn run_process(mut cmd: Command, params: &Params, limit: Duration) -> OperationResult {
    let mut result = OperationResult::started();

    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Ok(encoded) = serde_json::to_string(params) {
        cmd.env(PARAMS_ENV_VAR, encoded);
    }

    let child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            warn!(error = %e, "Operation process could not be spawned");
            result.success = Some(false);
            result.stderr = Some(format!("Invalid invocation: {e}"));
            return result.finish();
        }
    };

    match timeout(limit, child.wait_with_output()).await {
        Ok(Ok(output)) => {
            result.stdout = Some(String::from_utf8_lossy(&output.stdout).into_owned());
            result.stderr = Some(String::from_utf8_lossy(&output.stderr).into_owned());
            result.rc = Some(output.status.code().unwrap_or(-1));
        }
        Ok(Err(e)) => {
            result.success = Some(false);
            result.stderr = Some(format!("Process execution failed: {e}"));
        }
        Err(_) => {
            warn!(
                timeout_secs = limit.as_secs_f64(),
                "Operation process timed out"
            );
            result.success = Some(false);
            result.stderr = Some(format!(
                "Timeout of {:.1}s reached",
                limit.as_secs_f64()
            ));
        }
    }

    result.finish()
}
