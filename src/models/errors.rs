//! Graph-invariant errors raised while building a workflow.

use thiserror::Error;

use super::StepId;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("Step {step_id} does not belong to this orchestration")]
    UnknownStep { step_id: StepId },

    #[error("Step {step_id} already belongs to this orchestration")]
    DuplicateStep { step_id: StepId },

    #[error("Do step {step_id} cannot have undo step {parent_id} as parent")]
    ParentUndo { step_id: StepId, parent_id: StepId },

    #[error("Undo step {step_id} cannot have do step {child_id} as child")]
    ChildDo { step_id: StepId, child_id: StepId },

    #[error("Adding edges to step {step_id} introduces a cycle")]
    Cycle { step_id: StepId },

    #[error("Undo step {step_id} cannot declare a target")]
    UndoTarget { step_id: StepId },

    #[error("Step {step_id} resolves no action type")]
    MissingAction { step_id: StepId },

    #[error("Step {step_id} maps parameter '{parameter}' from unknown source '{source_name}'")]
    Mapping {
        step_id: StepId,
        parameter: String,
        source_name: String,
    },
}

pub type GraphResult<T> = Result<T, GraphError>;
