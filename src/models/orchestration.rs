//! # Orchestration
//!
//! A named, versioned workflow expressed as a DAG of [`Step`]s.
//!
//! Every edge mutation is validated as a whole before it is applied: the
//! candidate graph is computed on a copy, checked for unknown steps, do/undo
//! adjacency and cycles, and only then swapped in. A failed mutation leaves
//! the orchestration exactly as it was, which also makes `set_parents` and
//! `set_children` atomic.
//!
//! ## Invariants
//!
//! - the graph is acyclic
//! - a do step never has an undo parent
//! - an undo step never has a do child
//!
//! Undo steps hang below the do step they compensate; the sub-DAG reachable
//! from a do step's undo children is that step's rollback plan.

use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;
use uuid::Uuid;

use super::errors::{GraphError, GraphResult};
use super::schema::OrchestrationSchema;
use super::step::{resolve_flag, Step};
use super::{OrchestrationId, StepId};
use crate::utils::dag::Dag;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EdgeSide {
    Parents,
    Children,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Orchestration {
    pub id: OrchestrationId,
    pub name: String,
    pub version: u32,
    pub description: Option<String>,
    pub stop_on_error: bool,
    pub stop_undo_on_error: bool,
    pub undo_on_error: bool,
    steps: BTreeMap<StepId, Step>,
    /// insertion order of steps
    order: Vec<StepId>,
    dag: Dag<StepId>,
}

impl Orchestration {
    pub fn new(name: impl Into<String>, version: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            version,
            description: None,
            stop_on_error: true,
            stop_undo_on_error: true,
            undo_on_error: true,
            steps: BTreeMap::new(),
            order: Vec::new(),
            dag: Dag::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_stop_on_error(mut self, value: bool) -> Self {
        self.stop_on_error = value;
        self
    }

    pub fn with_stop_undo_on_error(mut self, value: bool) -> Self {
        self.stop_undo_on_error = value;
        self
    }

    pub fn with_undo_on_error(mut self, value: bool) -> Self {
        self.undo_on_error = value;
        self
    }

    /// Insert `step` linked below `parents` and above `children`.
    pub fn add_step(
        &mut self,
        step: Step,
        parents: &[StepId],
        children: &[StepId],
    ) -> GraphResult<StepId> {
        let step_id = step.id;
        if self.steps.contains_key(&step_id) {
            return Err(GraphError::DuplicateStep { step_id });
        }
        if step.undo && step.target.is_some() {
            return Err(GraphError::UndoTarget { step_id });
        }
        self.ensure_known(parents)?;
        self.ensure_known(children)?;

        let mut candidate = self.dag.clone();
        candidate.add_node(step_id);
        for parent in parents {
            self.check_adjacency(&step, self.lookup(parent)?, EdgeSide::Parents)?;
            candidate.add_edge(*parent, step_id);
        }
        for child in children {
            self.check_adjacency(&step, self.lookup(child)?, EdgeSide::Children)?;
            candidate.add_edge(step_id, *child);
        }
        if candidate.is_cyclic() {
            return Err(GraphError::Cycle { step_id });
        }

        debug!(
            orchestration = %self.name,
            step_id = %step_id,
            undo = step.undo,
            parents = parents.len(),
            children = children.len(),
            "Step added to orchestration"
        );
        self.dag = candidate;
        self.order.push(step_id);
        self.steps.insert(step_id, step);
        Ok(step_id)
    }

    pub fn add_parents(&mut self, step_id: StepId, parents: &[StepId]) -> GraphResult<()> {
        self.apply_edges(step_id, EdgeSide::Parents, &[], parents)
    }

    pub fn add_children(&mut self, step_id: StepId, children: &[StepId]) -> GraphResult<()> {
        self.apply_edges(step_id, EdgeSide::Children, &[], children)
    }

    pub fn delete_parents(&mut self, step_id: StepId, parents: &[StepId]) -> GraphResult<()> {
        self.apply_edges(step_id, EdgeSide::Parents, parents, &[])
    }

    pub fn delete_children(&mut self, step_id: StepId, children: &[StepId]) -> GraphResult<()> {
        self.apply_edges(step_id, EdgeSide::Children, children, &[])
    }

    /// Replace all parents of `step_id` in a single validated transaction.
    pub fn set_parents(&mut self, step_id: StepId, parents: &[StepId]) -> GraphResult<()> {
        let current: Vec<StepId> = self.dag.predecessors(&step_id).into_iter().collect();
        self.apply_edges(step_id, EdgeSide::Parents, &current, parents)
    }

    /// Replace all children of `step_id` in a single validated transaction.
    pub fn set_children(&mut self, step_id: StepId, children: &[StepId]) -> GraphResult<()> {
        let current: Vec<StepId> = self.dag.successors(&step_id).into_iter().collect();
        self.apply_edges(step_id, EdgeSide::Children, &current, children)
    }

    fn apply_edges(
        &mut self,
        step_id: StepId,
        side: EdgeSide,
        remove: &[StepId],
        add: &[StepId],
    ) -> GraphResult<()> {
        let step = self.lookup(&step_id)?;
        self.ensure_known(remove)?;
        self.ensure_known(add)?;

        let mut candidate = self.dag.clone();
        for other in remove {
            match side {
                EdgeSide::Parents => candidate.remove_edge(other, &step_id),
                EdgeSide::Children => candidate.remove_edge(&step_id, other),
            };
        }
        for other in add {
            self.check_adjacency(step, self.lookup(other)?, side)?;
            match side {
                EdgeSide::Parents => candidate.add_edge(*other, step_id),
                EdgeSide::Children => candidate.add_edge(step_id, *other),
            }
        }
        if candidate.is_cyclic() {
            return Err(GraphError::Cycle { step_id });
        }
        self.dag = candidate;
        Ok(())
    }

    fn check_adjacency(&self, step: &Step, other: &Step, side: EdgeSide) -> GraphResult<()> {
        let (parent, child) = match side {
            EdgeSide::Parents => (other, step),
            EdgeSide::Children => (step, other),
        };
        if parent.undo && !child.undo {
            return Err(match side {
                EdgeSide::Parents => GraphError::ParentUndo {
                    step_id: child.id,
                    parent_id: parent.id,
                },
                EdgeSide::Children => GraphError::ChildDo {
                    step_id: parent.id,
                    child_id: child.id,
                },
            });
        }
        Ok(())
    }

    fn ensure_known(&self, ids: &[StepId]) -> GraphResult<()> {
        ids.iter().try_for_each(|id| self.lookup(id).map(|_| ()))
    }

    fn lookup(&self, step_id: &StepId) -> GraphResult<&Step> {
        self.steps
            .get(step_id)
            .ok_or(GraphError::UnknownStep { step_id: *step_id })
    }

    /// Steps in insertion order.
    pub fn steps(&self) -> impl Iterator<Item = &Step> {
        self.order.iter().filter_map(|id| self.steps.get(id))
    }

    pub fn step(&self, step_id: &StepId) -> Option<&Step> {
        self.steps.get(step_id)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn dag(&self) -> &Dag<StepId> {
        &self.dag
    }

    /// Parents of `step_id`, in step insertion order.
    pub fn parents(&self, step_id: &StepId) -> Vec<&Step> {
        self.ordered(self.dag.predecessors(step_id))
    }

    /// Children of `step_id`, in step insertion order.
    pub fn children(&self, step_id: &StepId) -> Vec<&Step> {
        self.ordered(self.dag.successors(step_id))
    }

    fn ordered(&self, ids: BTreeSet<StepId>) -> Vec<&Step> {
        self.steps().filter(|s| ids.contains(&s.id)).collect()
    }

    pub fn do_steps(&self) -> impl Iterator<Item = &Step> {
        self.steps().filter(|s| !s.undo)
    }

    /// Undo steps directly compensating `step_id`.
    pub fn undo_children(&self, step_id: &StepId) -> Vec<&Step> {
        self.children(step_id).into_iter().filter(|s| s.undo).collect()
    }

    /// Target groups used by do steps.
    pub fn target_groups(&self) -> BTreeSet<String> {
        self.do_steps()
            .filter_map(|s| s.target_group().map(str::to_string))
            .collect()
    }

    pub fn is_cyclic(&self) -> bool {
        self.dag.is_cyclic()
    }

    pub fn root(&self) -> Vec<&Step> {
        self.ordered(self.dag.root().into_iter().collect())
    }

    pub fn depth(&self) -> usize {
        self.dag.depth()
    }

    pub fn get_nodes_at_level(&self, level: usize) -> Vec<&Step> {
        self.ordered(self.dag.get_nodes_at_level(level).into_iter().collect())
    }

    /// Steps reachable from `step_id`.
    pub fn reachable(&self, step_id: &StepId) -> BTreeSet<StepId> {
        self.dag.reachable(step_id)
    }

    /// Sub-DAG made of `steps` and everything reachable from them.
    pub fn subtree(&self, steps: &[StepId]) -> Dag<StepId> {
        self.dag.subtree(steps.iter())
    }

    pub fn resolve_stop_on_error(&self, step: &Step) -> bool {
        resolve_flag(step.stop_on_error, self.stop_on_error)
    }

    pub fn resolve_stop_undo_on_error(&self, step: &Step) -> bool {
        resolve_flag(step.stop_undo_on_error, self.stop_undo_on_error)
    }

    pub fn resolve_undo_on_error(&self, step: &Step) -> bool {
        resolve_flag(step.undo_on_error, self.undo_on_error)
    }

    /// Parameter contract derived by walking the graph level by level.
    ///
    /// A mapping source must be an output of a step in an earlier level or an
    /// input declared by a step in an earlier level.
    pub fn schema(&self) -> GraphResult<OrchestrationSchema> {
        let mut schema = OrchestrationSchema::default();
        let mut prior_outputs: BTreeSet<String> = BTreeSet::new();
        let mut prior_inputs: BTreeMap<String, Value> = BTreeMap::new();

        for level in self.dag.nodes_by_level() {
            let mut level_outputs = BTreeSet::new();
            let mut level_inputs = BTreeMap::new();

            for step in self.ordered(level.into_iter().collect()) {
                let step_schema = step.resolved_schema();

                for (parameter, source) in &step_schema.mapping {
                    if !prior_outputs.contains(source) && !prior_inputs.contains_key(source) {
                        return Err(GraphError::Mapping {
                            step_id: step.id,
                            parameter: parameter.clone(),
                            source_name: source.clone(),
                        });
                    }
                }

                for (name, descriptor) in &step_schema.input {
                    if step_schema.mapping.contains_key(name) || prior_outputs.contains(name) {
                        continue;
                    }
                    schema
                        .input
                        .entry(name.clone())
                        .or_insert_with(|| descriptor.clone());
                    level_inputs.insert(name.clone(), descriptor.clone());
                }

                for name in &step_schema.required {
                    if !step_schema.mapping.contains_key(name) && !prior_outputs.contains(name) {
                        schema.required.insert(name.clone());
                    }
                }

                level_outputs.extend(step_schema.output.iter().cloned());
            }

            schema.output.extend(level_outputs.iter().cloned());
            prior_outputs.extend(level_outputs);
            prior_inputs.extend(level_inputs);
        }

        Ok(schema)
    }
}
