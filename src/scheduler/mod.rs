//! # Task Scheduler
//!
//! [`AsyncOperator`] runs registered units of work with bounded concurrency
//! in priority order (lowest value first, ties in registration order).
//!
//! ## Lifecycle
//!
//! `Pending -> Running -> Finished | Error`
//!
//! Task errors and panics are captured into the task's [`TaskOutcome`] and
//! never reach the dispatch loop. The scheduler never cancels running work;
//! callers bound their waits with [`AsyncOperator::wait_tasks`]. A task
//! waiting on its own scheduler gives up its slot until the wait returns.

pub mod operator;
pub mod task;

use thiserror::Error;

pub use operator::{AsyncOperator, ProgressReporter};
pub use task::{TaskCallback, TaskId, TaskOptions, TaskOutcome};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    #[error("Scheduler backlog is full ({limit} pending tasks)")]
    Full { limit: usize },

    #[error("Scheduler has been stopped")]
    Stopped,

    #[error("Scheduler requires a running tokio runtime")]
    NoRuntime,
}
