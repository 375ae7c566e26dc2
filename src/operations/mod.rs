//! # Action Encapsulation
//!
//! Operations know how to run one unit of code given resolved parameters and
//! turn the run into an [`OperationResult`].
//!
//! Every operation goes through the same pipeline in
//! [`OperationEncapsulation::execute`]:
//!
//! 1. render `{placeholders}` in the code body from the parameters
//! 2. run the rendered code (bounded by the operation timeout)
//! 3. evaluate success: explicit success from the run, else declared
//!    expectations, else the kind's default
//!
//! Timeouts and invalid invocations are recorded as failed results, never
//! returned as errors.

pub mod ansible;
pub mod native;
pub mod orchestration;
pub mod process;
pub mod python;
pub mod registry;
pub mod result;
pub mod shell;
pub mod template;
pub mod test_operation;

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::fmt;
use std::time::Duration;
use tracing::debug;

use crate::models::ActionSpec;

pub use ansible::AnsibleOperation;
pub use native::NativeOperation;
pub use orchestration::OrchestrationOperation;
pub use python::PythonOperation;
pub use registry::{OperationError, OperationFactory, OperationRegistry};
pub use result::OperationResult;
pub use shell::ShellOperation;
pub use template::{render, RenderError};
pub use test_operation::TestOperation;

/// Resolved parameters handed to an operation
pub type Params = Map<String, Value>;

#[async_trait]
pub trait OperationEncapsulation: Send + Sync + fmt::Debug {
    fn spec(&self) -> &ActionSpec;

    fn timeout(&self) -> Duration;

    /// Return code assumed when the spec declares no expectation
    fn default_expected_rc(&self) -> Option<i32> {
        None
    }

    /// Run the already rendered code.
    async fn run(&self, code: &str, params: &Params) -> OperationResult;

    async fn execute(&self, params: &Params) -> OperationResult {
        let code = match render(&self.spec().code, params) {
            Ok(code) => code,
            Err(e) => return OperationResult::failure(e.to_string()),
        };
        debug!(
            action = %self.spec().name,
            kind = %self.spec().action_type,
            timeout_secs = self.timeout().as_secs_f64(),
            "Executing operation"
        );
        let result = self.run(&code, params).await;
        evaluate(result, self.spec(), self.default_expected_rc()).finish()
    }
}

/// Success evaluation shared by every kind.
///
/// An explicit success set by the run is kept. Otherwise every declared
/// expectation must match; with none declared, `default_rc` (if any) must
/// match and anything else counts as success.
pub fn evaluate(
    mut result: OperationResult,
    spec: &ActionSpec,
    default_rc: Option<i32>,
) -> OperationResult {
    if result.success.is_some() {
        return result;
    }

    let mut success = true;
    if let Some(expected) = &spec.expected_stdout {
        success &= trimmed(result.stdout.as_deref()) == expected.trim_end();
    }
    if let Some(expected) = &spec.expected_stderr {
        success &= trimmed(result.stderr.as_deref()) == expected.trim_end();
    }
    match (spec.expected_rc, default_rc) {
        (Some(expected), _) => success &= result.rc == Some(expected),
        (None, Some(default)) if !spec.has_expectations() => {
            success &= result.rc == Some(default)
        }
        _ => {}
    }

    result.success = Some(success);
    result
}

fn trimmed(output: Option<&str>) -> &str {
    output.unwrap_or_default().trim_end()
}
