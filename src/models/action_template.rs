use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

use super::schema::StepSchema;

/// Closed set of action kinds an operation can be built from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// In-process stub used for dry runs and tests
    Test,
    /// Command line executed by a shell
    Shell,
    /// Built-in action implemented by the engine itself
    Native,
    /// Script run through a python interpreter
    Python,
    /// Playbook run through `ansible-playbook`
    Ansible,
    /// Nested orchestration deployed with the same runtime context
    Orchestration,
}

impl ActionType {
    pub const ALL: [ActionType; 6] = [
        Self::Test,
        Self::Shell,
        Self::Native,
        Self::Python,
        Self::Ansible,
        Self::Orchestration,
    ];
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Test => write!(f, "test"),
            Self::Shell => write!(f, "shell"),
            Self::Native => write!(f, "native"),
            Self::Python => write!(f, "python"),
            Self::Ansible => write!(f, "ansible"),
            Self::Orchestration => write!(f, "orchestration"),
        }
    }
}

impl std::str::FromStr for ActionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "test" => Ok(Self::Test),
            "shell" => Ok(Self::Shell),
            "native" => Ok(Self::Native),
            "python" => Ok(Self::Python),
            "ansible" => Ok(Self::Ansible),
            "orchestration" => Ok(Self::Orchestration),
            _ => Err(format!("Invalid action type: {s}")),
        }
    }
}

/// Reusable, versioned definition of what a step executes
///
/// Steps referencing a template inherit every attribute they leave unset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionTemplate {
    pub id: Uuid,
    pub name: String,
    pub version: u32,
    pub action_type: ActionType,
    pub code: String,
    pub expected_stdout: Option<String>,
    pub expected_stderr: Option<String>,
    pub expected_rc: Option<i32>,
    /// Execution-system options such as `timeout` (seconds)
    pub system_kwargs: Map<String, Value>,
    pub schema: StepSchema,
    pub description: Option<String>,
}

impl ActionTemplate {
    pub fn new(
        name: impl Into<String>,
        version: u32,
        action_type: ActionType,
        code: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            version,
            action_type,
            code: code.into(),
            expected_stdout: None,
            expected_stderr: None,
            expected_rc: None,
            system_kwargs: Map::new(),
            schema: StepSchema::default(),
            description: None,
        }
    }

    pub fn with_expected_stdout(mut self, stdout: impl Into<String>) -> Self {
        self.expected_stdout = Some(stdout.into());
        self
    }

    pub fn with_expected_stderr(mut self, stderr: impl Into<String>) -> Self {
        self.expected_stderr = Some(stderr.into());
        self
    }

    pub fn with_expected_rc(mut self, rc: i32) -> Self {
        self.expected_rc = Some(rc);
        self
    }

    pub fn with_system_kwarg(mut self, key: impl Into<String>, value: Value) -> Self {
        self.system_kwargs.insert(key.into(), value);
        self
    }

    pub fn with_schema(mut self, schema: StepSchema) -> Self {
        self.schema = schema;
        self
    }
}

/// Fully resolved operation descriptor
///
/// Produced by layering a step over its template; this is also what travels
/// to a remote server when a step is proxied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionSpec {
    pub name: String,
    pub action_type: ActionType,
    pub code: String,
    pub expected_stdout: Option<String>,
    pub expected_stderr: Option<String>,
    pub expected_rc: Option<i32>,
    pub system_kwargs: Map<String, Value>,
}

impl ActionSpec {
    pub fn new(name: impl Into<String>, action_type: ActionType, code: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            action_type,
            code: code.into(),
            expected_stdout: None,
            expected_stderr: None,
            expected_rc: None,
            system_kwargs: Map::new(),
        }
    }

    /// Timeout from `system_kwargs.timeout` (seconds, integer or float), else `default`.
    pub fn timeout(&self, default: Duration) -> Duration {
        self.system_kwargs
            .get("timeout")
            .and_then(Value::as_f64)
            .filter(|secs| *secs > 0.0)
            .map(Duration::from_secs_f64)
            .unwrap_or(default)
    }

    pub fn has_expectations(&self) -> bool {
        self.expected_stdout.is_some() || self.expected_stderr.is_some() || self.expected_rc.is_some()
    }
}
