use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

use super::action_template::{ActionSpec, ActionTemplate, ActionType};
use super::errors::{GraphError, GraphResult};
use super::schema::StepSchema;
use super::StepId;
use crate::constants::system::DEFAULT_TARGET;

/// Two-level attribute lookup: the step value wins, the template fills gaps.
pub fn resolve<T: Clone>(step_field: Option<&T>, template_field: Option<&T>) -> Option<T> {
    step_field.or(template_field).cloned()
}

/// Tri-state flag inheritance: `None` on the step defers to the orchestration.
pub fn resolve_flag(step_field: Option<bool>, orchestration_default: bool) -> bool {
    step_field.unwrap_or(orchestration_default)
}

/// One node of a workflow: either a forward ("do") action or its compensation ("undo")
///
/// Graph links live in the owning [`super::Orchestration`]; a step on its own
/// only carries its action definition and error policy overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub id: StepId,
    pub name: Option<String>,
    pub undo: bool,
    pub action_template: Option<Arc<ActionTemplate>>,
    pub action_type: Option<ActionType>,
    pub code: Option<String>,
    pub expected_stdout: Option<String>,
    pub expected_stderr: Option<String>,
    pub expected_rc: Option<i32>,
    /// Merged over the template's options key by key
    pub system_kwargs: Option<Map<String, Value>>,
    /// Merged over the template's schema key by key
    pub schema: Option<StepSchema>,
    pub stop_on_error: Option<bool>,
    pub stop_undo_on_error: Option<bool>,
    pub undo_on_error: Option<bool>,
    /// Target group; only meaningful on do steps
    pub target: Option<String>,
}

impl Step {
    fn blank(undo: bool) -> Self {
        Self {
            id: StepId::new_v4(),
            name: None,
            undo,
            action_template: None,
            action_type: None,
            code: None,
            expected_stdout: None,
            expected_stderr: None,
            expected_rc: None,
            system_kwargs: None,
            schema: None,
            stop_on_error: None,
            stop_undo_on_error: None,
            undo_on_error: None,
            target: None,
        }
    }

    /// Forward step
    pub fn new_do() -> Self {
        Self::blank(false)
    }

    /// Compensating step
    pub fn new_undo() -> Self {
        Self::blank(true)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_template(mut self, template: Arc<ActionTemplate>) -> Self {
        self.action_template = Some(template);
        self
    }

    /// Inline action definition, no template needed
    pub fn with_action(mut self, action_type: ActionType, code: impl Into<String>) -> Self {
        self.action_type = Some(action_type);
        self.code = Some(code.into());
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
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
        self.system_kwargs
            .get_or_insert_with(Map::new)
            .insert(key.into(), value);
        self
    }

    pub fn with_schema(mut self, schema: StepSchema) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn with_stop_on_error(mut self, value: bool) -> Self {
        self.stop_on_error = Some(value);
        self
    }

    pub fn with_stop_undo_on_error(mut self, value: bool) -> Self {
        self.stop_undo_on_error = Some(value);
        self
    }

    pub fn with_undo_on_error(mut self, value: bool) -> Self {
        self.undo_on_error = Some(value);
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// Display name: explicit name, else template name, else the id.
    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .or_else(|| self.action_template.as_ref().map(|t| t.name.clone()))
            .unwrap_or_else(|| self.id.to_string())
    }

    /// Target group of a do step; forward steps without one target [`DEFAULT_TARGET`].
    pub fn target_group(&self) -> Option<&str> {
        if self.undo {
            None
        } else {
            Some(self.target.as_deref().unwrap_or(DEFAULT_TARGET))
        }
    }

    pub fn resolved_action_type(&self) -> Option<ActionType> {
        resolve(
            self.action_type.as_ref(),
            self.action_template.as_ref().map(|t| &t.action_type),
        )
    }

    pub fn resolved_code(&self) -> Option<String> {
        resolve(
            self.code.as_ref(),
            self.action_template.as_ref().map(|t| &t.code),
        )
    }

    pub fn resolved_expected_stdout(&self) -> Option<String> {
        resolve(
            self.expected_stdout.as_ref(),
            self.action_template
                .as_ref()
                .and_then(|t| t.expected_stdout.as_ref()),
        )
    }

    pub fn resolved_expected_stderr(&self) -> Option<String> {
        resolve(
            self.expected_stderr.as_ref(),
            self.action_template
                .as_ref()
                .and_then(|t| t.expected_stderr.as_ref()),
        )
    }

    pub fn resolved_expected_rc(&self) -> Option<i32> {
        resolve(
            self.expected_rc.as_ref(),
            self.action_template
                .as_ref()
                .and_then(|t| t.expected_rc.as_ref()),
        )
    }

    pub fn resolved_system_kwargs(&self) -> Map<String, Value> {
        let mut merged = self
            .action_template
            .as_ref()
            .map(|t| t.system_kwargs.clone())
            .unwrap_or_default();
        if let Some(own) = &self.system_kwargs {
            merged.extend(own.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        merged
    }

    pub fn resolved_schema(&self) -> StepSchema {
        let base = self
            .action_template
            .as_ref()
            .map(|t| t.schema.clone())
            .unwrap_or_default();
        match &self.schema {
            Some(own) => own.layered_over(&base),
            None => base,
        }
    }

    /// Layer the step over its template into an executable descriptor.
    pub fn action_spec(&self) -> GraphResult<ActionSpec> {
        let action_type = self
            .resolved_action_type()
            .ok_or(GraphError::MissingAction { step_id: self.id })?;
        Ok(ActionSpec {
            name: self.display_name(),
            action_type,
            code: self.resolved_code().unwrap_or_default(),
            expected_stdout: self.resolved_expected_stdout(),
            expected_stderr: self.resolved_expected_stderr(),
            expected_rc: self.resolved_expected_rc(),
            system_kwargs: self.resolved_system_kwargs(),
        })
    }
}
