use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Parameter contract of a single step
///
/// `mapping` wires a step parameter to a source name: either the output of a
/// step in an earlier level or an input declared by an earlier step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepSchema {
    #[serde(default)]
    pub input: BTreeMap<String, Value>,
    #[serde(default)]
    pub required: BTreeSet<String>,
    #[serde(default)]
    pub output: BTreeSet<String>,
    /// parameter -> source
    #[serde(default)]
    pub mapping: BTreeMap<String, String>,
}

impl StepSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_input(mut self, name: impl Into<String>, descriptor: Value) -> Self {
        self.input.insert(name.into(), descriptor);
        self
    }

    pub fn with_required(mut self, name: impl Into<String>) -> Self {
        self.required.insert(name.into());
        self
    }

    pub fn with_output(mut self, name: impl Into<String>) -> Self {
        self.output.insert(name.into());
        self
    }

    pub fn with_mapping(mut self, param: impl Into<String>, source: impl Into<String>) -> Self {
        self.mapping.insert(param.into(), source.into());
        self
    }

    /// Layer `self` over `base`: entries of `self` win key by key.
    pub fn layered_over(&self, base: &StepSchema) -> StepSchema {
        let mut merged = base.clone();
        merged
            .input
            .extend(self.input.iter().map(|(k, v)| (k.clone(), v.clone())));
        merged.required.extend(self.required.iter().cloned());
        merged.output.extend(self.output.iter().cloned());
        merged
            .mapping
            .extend(self.mapping.iter().map(|(k, v)| (k.clone(), v.clone())));
        merged
    }

    pub fn is_empty(&self) -> bool {
        self.input.is_empty()
            && self.required.is_empty()
            && self.output.is_empty()
            && self.mapping.is_empty()
    }
}

/// Parameter contract of a whole orchestration, derived level by level
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrchestrationSchema {
    /// Inputs the caller may provide
    pub input: BTreeMap<String, Value>,
    /// Inputs the caller must provide
    pub required: BTreeSet<String>,
    /// Values produced by steps
    pub output: BTreeSet<String>,
}

impl OrchestrationSchema {
    /// Names from `required` missing in `params`.
    pub fn missing_required<'a>(
        &'a self,
        params: &'a serde_json::Map<String, Value>,
    ) -> impl Iterator<Item = &'a String> + 'a {
        self.required.iter().filter(|name| !params.contains_key(*name))
    }
}
