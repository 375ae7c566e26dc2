use async_trait::async_trait;
use tokio::sync::OnceCell;

use super::{CommandKey, CommandResult, Executable, ExecutionRecords, StepAction};
use crate::operations::OperationResult;

/// Runs a compensating step; not undoable itself
#[derive(Debug)]
pub struct UndoCommand {
    action: StepAction,
    stop_undo_on_error: bool,
    result: OnceCell<OperationResult>,
}

impl UndoCommand {
    pub fn new(action: StepAction, stop_undo_on_error: bool) -> Self {
        Self {
            action,
            stop_undo_on_error,
            result: OnceCell::new(),
        }
    }

    pub fn operation_result(&self) -> Option<&OperationResult> {
        self.result.get()
    }
}

#[async_trait]
impl Executable for UndoCommand {
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
        Ok(Some(true))
    }

    fn invoked(&self) -> bool {
        self.result.initialized()
    }

    fn success(&self) -> Option<bool> {
        self.result.get().and_then(|r| r.success)
    }

    fn undo_success(&self) -> Option<bool> {
        Some(true)
    }

    fn result(&self) -> ExecutionRecords {
        self.result
            .get()
            .map(|r| ExecutionRecords::from([(self.action.key, r.clone())]))
            .unwrap_or_default()
    }

    // an undo step's failure is judged by the undo policy of the walk it runs in
    fn stop_on_error(&self) -> bool {
        self.stop_undo_on_error
    }

    fn stop_undo_on_error(&self) -> bool {
        self.stop_undo_on_error
    }
}
