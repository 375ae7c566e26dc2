use async_trait::async_trait;
use serde_json::json;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use super::{CommandKey, VarContext};
use crate::constants::events::{STEP_INVOKED, STEP_UNDONE};
use crate::events::EventPublisher;
use crate::logging::log_step_operation;
use crate::models::StepSchema;
use crate::operations::{OperationEncapsulation, OperationResult, Params};

/// Where a step's operation actually runs
#[async_trait]
pub trait ActionRunner: Send + Sync + fmt::Debug {
    async fn run(&self, params: &Params) -> OperationResult;
}

/// Runs the operation in this process
#[derive(Debug)]
pub struct LocalRunner {
    operation: Box<dyn OperationEncapsulation>,
}

impl LocalRunner {
    pub fn new(operation: Box<dyn OperationEncapsulation>) -> Self {
        Self { operation }
    }
}

#[async_trait]
impl ActionRunner for LocalRunner {
    async fn run(&self, params: &Params) -> OperationResult {
        self.operation.execute(params).await
    }
}

/// One step bound to a server: parameter resolution, the run itself and
/// output absorption
#[derive(Debug, Clone)]
pub struct StepAction {
    pub key: CommandKey,
    pub name: String,
    pub undo: bool,
    schema: StepSchema,
    runner: Arc<dyn ActionRunner>,
    vars: VarContext,
    events: Option<EventPublisher>,
}

impl StepAction {
    pub fn new(
        key: CommandKey,
        name: impl Into<String>,
        undo: bool,
        schema: StepSchema,
        runner: Arc<dyn ActionRunner>,
        vars: VarContext,
    ) -> Self {
        Self {
            key,
            name: name.into(),
            undo,
            schema,
            runner,
            vars,
            events: None,
        }
    }

    pub fn with_events(mut self, events: EventPublisher) -> Self {
        self.events = Some(events);
        self
    }

    pub async fn run(&self) -> OperationResult {
        let params = self.vars.params_for(&self.schema);
        debug!(
            step = %self.name,
            key = %self.key,
            undo = self.undo,
            "Running step action"
        );

        let mut result = self.runner.run(&params).await;
        if result.is_success() {
            if let Err(error) = self.vars.absorb_outputs(&self.schema.output, &result) {
                result.success = Some(false);
                result.processing_error = Some(error);
            }
        }

        let status = match result.success {
            Some(true) => "success",
            Some(false) => "failure",
            None => "unknown",
        };
        log_step_operation(
            if self.undo { "undo_step" } else { "invoke" },
            &self.key.step_id.to_string(),
            &self.key.server_id.to_string(),
            Some(&self.name),
            status,
            result.processing_error.as_deref(),
        );
        if let Some(events) = &self.events {
            events.publish(
                if self.undo { STEP_UNDONE } else { STEP_INVOKED },
                json!({
                    "step_id": self.key.step_id,
                    "server_id": self.key.server_id,
                    "name": self.name,
                    "success": result.success,
                    "rc": result.rc,
                }),
            );
        }
        result
    }
}
