use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::debug;

use super::{CommandKey, CommandResult, CompositeCommand, Executable, ExecutionRecords, StepAction};
use crate::operations::OperationResult;

/// Error policy of one forward step, already resolved against its orchestration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandPolicy {
    pub stop_on_error: bool,
    pub stop_undo_on_error: bool,
    pub undo_on_error: bool,
}

impl Default for CommandPolicy {
    fn default() -> Self {
        Self {
            stop_on_error: true,
            stop_undo_on_error: true,
            undo_on_error: true,
        }
    }
}

/// Runs a forward step once and owns its compensation
#[derive(Debug)]
pub struct Command {
    action: StepAction,
    undo_implementation: Option<CompositeCommand>,
    policy: CommandPolicy,
    result: OnceCell<OperationResult>,
    undo_outcome: OnceCell<Option<bool>>,
}

impl Command {
    pub fn new(action: StepAction, policy: CommandPolicy) -> Self {
        Self {
            action,
            undo_implementation: None,
            policy,
            result: OnceCell::new(),
            undo_outcome: OnceCell::new(),
        }
    }

    /// Compensation run by [`Executable::undo`], usually a composite of
    /// [`super::UndoCommand`]s
    pub fn with_undo(mut self, undo: CompositeCommand) -> Self {
        self.undo_implementation = Some(undo);
        self
    }

    pub fn policy(&self) -> CommandPolicy {
        self.policy
    }

    pub fn operation_result(&self) -> Option<&OperationResult> {
        self.result.get()
    }

    fn should_undo(&self) -> bool {
        match self.result.get().and_then(|r| r.success) {
            Some(true) => true,
            Some(false) => self.policy.undo_on_error,
            None => false,
        }
    }

    async fn run_undo(&self) -> CommandResult<Option<bool>> {
        if !self.should_undo() {
            debug!(step = %self.action.name, "Undo skipped by policy");
            return Ok(None);
        }
        match &self.undo_implementation {
            Some(undo) => undo.invoke().await,
            None => Ok(None),
        }
    }
}

#[async_trait]
impl Executable for Command {
    fn key(&self) -> Option<CommandKey> {
        Some(self.action.key)
    }

    fn name(&self) -> String {
        self.action.name.clone()
    }

    async fn invoke(&self) -> CommandResult<Option<bool>> {
        let result = self.result.get_or_init(|| self.action.run()).await;
        Ok(result.success)
    }

    async fn undo(&self) -> CommandResult<Option<bool>> {
        if !self.invoked() {
            return Ok(None);
        }
        self.undo_outcome
            .get_or_try_init(|| self.run_undo())
            .await
            .copied()
    }

    fn invoked(&self) -> bool {
        self.result.initialized()
    }

    fn success(&self) -> Option<bool> {
        self.result.get().and_then(|r| r.success)
    }

    fn undo_success(&self) -> Option<bool> {
        self.undo_outcome.get().copied().flatten()
    }

    fn result(&self) -> ExecutionRecords {
        let mut records = self
            .undo_implementation
            .as_ref()
            .map(|undo| undo.result())
            .unwrap_or_default();
        if let Some(result) = self.result.get() {
            records.insert(self.action.key, result.clone());
        }
        records
    }

    fn stop_on_error(&self) -> bool {
        self.policy.stop_on_error
    }

    fn stop_undo_on_error(&self) -> bool {
        self.policy.stop_undo_on_error
    }
}
