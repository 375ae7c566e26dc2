use chrono::{DateTime, Utc};
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

use crate::constants::system::DEFAULT_PRIORITY;

pub type TaskId = Uuid;

/// Invoked once with the completion record, before the task turns terminal
pub type TaskCallback = Box<dyn FnOnce(&TaskOutcome) + Send + 'static>;

/// Completion record of one task
#[derive(Debug, Clone, PartialEq)]
pub struct TaskOutcome {
    pub task_id: TaskId,
    pub value: Option<Value>,
    /// Error or panic message raised by the task
    pub error: Option<String>,
    pub elapsed: Duration,
    pub finished_at: DateTime<Utc>,
}

impl TaskOutcome {
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Registration options
#[derive(Default)]
pub struct TaskOptions {
    pub priority: Option<i32>,
    pub callback: Option<TaskCallback>,
}

impl TaskOptions {
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_callback(mut self, callback: impl FnOnce(&TaskOutcome) + Send + 'static) -> Self {
        self.callback = Some(Box::new(callback));
        self
    }

    pub(crate) fn resolved_priority(&self) -> i32 {
        self.priority.unwrap_or(DEFAULT_PRIORITY)
    }
}

impl fmt::Debug for TaskOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskOptions")
            .field("priority", &self.priority)
            .field("callback", &self.callback.is_some())
            .finish()
    }
}
