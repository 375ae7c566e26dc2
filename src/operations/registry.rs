//! Static action-kind registry.
//!
//! Every [`ActionType`] maps to a constructor fixed at startup; a kind that
//! is unknown or was removed from the registry fails when the deployment is
//! assembled, before anything runs.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use super::{
    AnsibleOperation, NativeOperation, OperationEncapsulation, OrchestrationOperation,
    PythonOperation, ShellOperation, TestOperation,
};
use crate::deployment::RuntimeContext;
use crate::models::{ActionSpec, ActionType};

pub type OperationFactory = fn(ActionSpec, &RuntimeContext) -> Box<dyn OperationEncapsulation>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OperationError {
    #[error("Unsupported action type '{action_type}'")]
    UnsupportedAction { action_type: ActionType },
}

#[derive(Clone)]
pub struct OperationRegistry {
    factories: HashMap<ActionType, OperationFactory>,
}

fn default_timeout(ctx: &RuntimeContext) -> Duration {
    ctx.config().execution.default_operation_timeout()
}

fn test_factory(spec: ActionSpec, ctx: &RuntimeContext) -> Box<dyn OperationEncapsulation> {
    Box::new(TestOperation::new(spec, default_timeout(ctx)))
}

fn shell_factory(spec: ActionSpec, ctx: &RuntimeContext) -> Box<dyn OperationEncapsulation> {
    Box::new(ShellOperation::new(spec, default_timeout(ctx)))
}

fn native_factory(spec: ActionSpec, ctx: &RuntimeContext) -> Box<dyn OperationEncapsulation> {
    Box::new(NativeOperation::new(spec, default_timeout(ctx)))
}

fn python_factory(spec: ActionSpec, ctx: &RuntimeContext) -> Box<dyn OperationEncapsulation> {
    Box::new(PythonOperation::new(spec, default_timeout(ctx)))
}

fn ansible_factory(spec: ActionSpec, ctx: &RuntimeContext) -> Box<dyn OperationEncapsulation> {
    Box::new(AnsibleOperation::new(spec, default_timeout(ctx)))
}

fn orchestration_factory(spec: ActionSpec, ctx: &RuntimeContext) -> Box<dyn OperationEncapsulation> {
    Box::new(OrchestrationOperation::new(spec, ctx.clone()))
}

impl OperationRegistry {
    /// Registry with no kinds
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry with every built-in kind
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(ActionType::Test, test_factory);
        registry.register(ActionType::Shell, shell_factory);
        registry.register(ActionType::Native, native_factory);
        registry.register(ActionType::Python, python_factory);
        registry.register(ActionType::Ansible, ansible_factory);
        registry.register(ActionType::Orchestration, orchestration_factory);
        registry
    }

    /// Install or replace the constructor for `action_type`.
    pub fn register(&mut self, action_type: ActionType, factory: OperationFactory) {
        self.factories.insert(action_type, factory);
    }

    pub fn without(mut self, action_type: ActionType) -> Self {
        self.factories.remove(&action_type);
        self
    }

    pub fn supports(&self, action_type: ActionType) -> bool {
        self.factories.contains_key(&action_type)
    }

    pub fn create(
        &self,
        spec: ActionSpec,
        ctx: &RuntimeContext,
    ) -> Result<Box<dyn OperationEncapsulation>, OperationError> {
        let factory = self
            .factories
            .get(&spec.action_type)
            .ok_or(OperationError::UnsupportedAction {
                action_type: spec.action_type,
            })?;
        Ok(factory(spec, ctx))
    }
}

impl Default for OperationRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl fmt::Debug for OperationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<String> = self.factories.keys().map(ToString::to_string).collect();
        kinds.sort();
        f.debug_struct("OperationRegistry").field("kinds", &kinds).finish()
    }
}
