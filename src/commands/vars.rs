use parking_lot::RwLock;
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::models::StepSchema;
use crate::operations::{OperationResult, Params};

/// Deployment-scoped variables shared by every node of one command tree
///
/// Seeded with the user parameters; successful steps that declare outputs
/// write them back for later levels to consume.
#[derive(Debug, Clone, Default)]
pub struct VarContext {
    vars: Arc<RwLock<Params>>,
}

impl VarContext {
    pub fn new(params: Params) -> Self {
        Self {
            vars: Arc::new(RwLock::new(params)),
        }
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.vars.read().get(name).cloned()
    }

    pub fn set(&self, name: impl Into<String>, value: Value) {
        self.vars.write().insert(name.into(), value);
    }

    pub fn snapshot(&self) -> Params {
        self.vars.read().clone()
    }

    /// Parameters for a step: every variable, plus each mapped parameter
    /// bound to its source's value.
    pub fn params_for(&self, schema: &StepSchema) -> Params {
        let vars = self.vars.read();
        let mut params = vars.clone();
        for (parameter, source) in &schema.mapping {
            if let Some(value) = vars.get(source) {
                params.insert(parameter.clone(), value.clone());
            }
        }
        params
    }

    /// Copy declared `outputs` from a JSON object printed on stdout.
    ///
    /// Outputs missing from the object are skipped.
    pub fn absorb_outputs(
        &self,
        outputs: &BTreeSet<String>,
        result: &OperationResult,
    ) -> Result<usize, String> {
        if outputs.is_empty() {
            return Ok(0);
        }
        let stdout = result.stdout.as_deref().unwrap_or_default().trim();
        let parsed: Value = serde_json::from_str(stdout)
            .map_err(|e| format!("Declared outputs need a JSON object on stdout: {e}"))?;
        let Value::Object(values) = parsed else {
            return Err("Declared outputs need a JSON object on stdout".to_string());
        };

        let mut vars = self.vars.write();
        let mut absorbed = 0;
        for name in outputs {
            if let Some(value) = values.get(name) {
                vars.insert(name.clone(), value.clone());
                absorbed += 1;
            }
        }
        Ok(absorbed)
    }
}
