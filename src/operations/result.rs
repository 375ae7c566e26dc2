use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Execution record produced by exactly one operation run
///
/// `success` is tri-state: `None` until something decides it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationResult {
    pub success: Option<bool>,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
    pub rc: Option<i32>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    /// Failure while preparing the run or absorbing its outputs
    pub processing_error: Option<String>,
}

impl OperationResult {
    /// Empty record stamped with the current time
    pub fn started() -> Self {
        Self {
            success: None,
            stdout: None,
            stderr: None,
            rc: None,
            start_time: Utc::now(),
            end_time: None,
            processing_error: None,
        }
    }

    /// Failed record; `error` becomes stderr.
    pub fn failure(error: impl Into<String>) -> Self {
        let mut result = Self::started();
        result.success = Some(false);
        result.stderr = Some(error.into());
        result.finish()
    }

    pub fn finish(mut self) -> Self {
        self.end_time.get_or_insert_with(Utc::now);
        self
    }

    pub fn with_success(mut self, success: bool) -> Self {
        self.success = Some(success);
        self
    }

    pub fn with_stdout(mut self, stdout: impl Into<String>) -> Self {
        self.stdout = Some(stdout.into());
        self
    }

    pub fn with_stderr(mut self, stderr: impl Into<String>) -> Self {
        self.stderr = Some(stderr.into());
        self
    }

    pub fn with_rc(mut self, rc: i32) -> Self {
        self.rc = Some(rc);
        self
    }

    pub fn is_success(&self) -> bool {
        self.success == Some(true)
    }

    pub fn elapsed_ms(&self) -> Option<i64> {
        self.end_time
            .map(|end| (end - self.start_time).num_milliseconds())
    }
}
