//! # System Constants
//!
//! Defaults, event names and status enums shared by the workflow model, the
//! command hierarchy and the task scheduler.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle events published through [`crate::events::EventPublisher`]
pub mod events {
    pub const DEPLOYMENT_STARTED: &str = "deployment.started";
    pub const DEPLOYMENT_COMPLETED: &str = "deployment.completed";
    pub const DEPLOYMENT_UNDO_STARTED: &str = "deployment.undo_started";
    pub const STEP_INVOKED: &str = "step.invoked";
    pub const STEP_UNDONE: &str = "step.undone";
}

pub mod system {
    /// Target group of forward steps that do not name one
    pub const DEFAULT_TARGET: &str = "all";

    /// Priority of command invocations submitted by composites
    pub const DEFAULT_PRIORITY: i32 = 0;

    /// Default timeout for a single operation run
    pub const DEFAULT_OPERATION_TIMEOUT_SECS: u64 = 300;

    /// Default time a proxied command waits for its completion message
    pub const DEFAULT_PROXY_TIMEOUT_SECS: u64 = 600;

    /// Default bound on a composite waiting for one level
    pub const DEFAULT_WAIT_TIMEOUT_SECS: u64 = 3600;

    /// Default number of concurrently running scheduler tasks
    pub const DEFAULT_MAX_CONCURRENCY: usize = 32;
}

/// Scheduler task lifecycle: PENDING -> RUNNING -> FINISHED | ERROR
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Registered, waiting for a free slot
    Pending,
    /// Running on its own tokio task
    Running,
    /// Returned a value
    Finished,
    /// Returned an error or panicked
    Error,
}

impl TaskStatus {
    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Error)
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::Running)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Finished => write!(f, "finished"),
            Self::Error => write!(f, "error"),
        }
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "finished" => Ok(Self::Finished),
            "error" => Ok(Self::Error),
            _ => Err(format!("Invalid task status: {s}")),
        }
    }
}
