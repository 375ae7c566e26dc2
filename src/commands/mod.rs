//! # Command Hierarchy
//!
//! Runtime, per-deployment objects that make steps invocable, undoable and
//! queryable for results.
//!
//! ## Node state machine
//!
//! `not invoked -> invoked(success) -> [undone(success | unknown)]`
//!
//! - [`UndoCommand`]: runs a compensating step once; its own `undo` is a no-op
//! - [`Command`]: runs a forward step once; `undo` runs the paired undo
//!   composite when the forward run succeeded, or failed with
//!   `undo_on_error`
//! - [`CompositeCommand`]: walks a sub-DAG level by level, submitting
//!   parallel levels to the [`crate::scheduler::AsyncOperator`]
//! - [`ProxyCommand`] / [`ProxyUndoCommand`]: same contracts, executed on a
//!   remote server through a [`RemoteDispatcher`]
//!
//! Step failures are data on the [`OperationResult`]; only scheduler
//! capacity problems and nested task failures surface as [`CommandError`].

pub mod action;
pub mod command;
pub mod composite;
pub mod proxy;
pub mod undo_command;
pub mod vars;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::models::{ServerId, StepId};
use crate::operations::OperationResult;
use crate::scheduler::SchedulerError;

pub use action::{ActionRunner, LocalRunner, StepAction};
pub use command::{Command, CommandPolicy};
pub use composite::{CompositeCommand, NodeIndex};
pub use proxy::{
    CompletionRegistry, ProxyCommand, ProxyUndoCommand, RemoteAction, RemoteCommandCompletion,
    RemoteCommandRequest, RemoteDispatcher, RemoteRunner,
};
pub use undo_command::UndoCommand;
pub use vars::VarContext;

/// Identity of a leaf node: one step on one server
///
/// An undo step shared by several do steps runs once per compensated step,
/// so undo keys also carry the do step they compensate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CommandKey {
    pub step_id: StepId,
    pub server_id: ServerId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compensates: Option<StepId>,
}

impl CommandKey {
    pub fn new(step_id: StepId, server_id: ServerId) -> Self {
        Self {
            step_id,
            server_id,
            compensates: None,
        }
    }

    pub fn compensating(step_id: StepId, server_id: ServerId, do_step: StepId) -> Self {
        Self {
            step_id,
            server_id,
            compensates: Some(do_step),
        }
    }
}

impl fmt::Display for CommandKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.step_id, self.server_id)?;
        if let Some(do_step) = self.compensates {
            write!(f, " (undo of {do_step})")?;
        }
        Ok(())
    }
}

/// Operation results of a command tree keyed by leaf identity
pub type ExecutionRecords = BTreeMap<CommandKey, OperationResult>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("Scheduler rejected node '{node}': {source}")]
    Scheduler {
        node: String,
        #[source]
        source: SchedulerError,
    },

    #[error("Node '{node}' raised: {message}")]
    Task { node: String, message: String },
}

pub type CommandResult<T> = Result<T, CommandError>;

/// A node of the command tree
#[async_trait]
pub trait Executable: Send + Sync + fmt::Debug {
    /// Leaf identity; composites have none
    fn key(&self) -> Option<CommandKey>;

    fn name(&self) -> String;

    /// Run once. Later calls return the first outcome without re-running.
    async fn invoke(&self) -> CommandResult<Option<bool>>;

    /// Compensate once; `None` when nothing was undone.
    async fn undo(&self) -> CommandResult<Option<bool>>;

    fn invoked(&self) -> bool;

    fn success(&self) -> Option<bool>;

    fn undo_success(&self) -> Option<bool>;

    /// Results of this node and everything below it
    fn result(&self) -> ExecutionRecords;

    fn stop_on_error(&self) -> bool;

    fn stop_undo_on_error(&self) -> bool;
}

pub type SharedExecutable = Arc<dyn Executable>;
