use async_trait::async_trait;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument, warn};

use super::{CommandError, CommandKey, CommandResult, Executable, ExecutionRecords, SharedExecutable};
use crate::constants::system::{DEFAULT_PRIORITY, DEFAULT_WAIT_TIMEOUT_SECS};
use crate::scheduler::{AsyncOperator, TaskId, TaskOptions};
use crate::utils::dag::Dag;

/// Position of a child node inside its composite
pub type NodeIndex = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Invoke,
    Undo,
}

impl Phase {
    async fn apply(self, node: &SharedExecutable) -> CommandResult<Option<bool>> {
        match self {
            Phase::Invoke => node.invoke().await,
            Phase::Undo => node.undo().await,
        }
    }
}

/// A sub-DAG of command nodes executed level by level
///
/// Level N completes entirely before level N+1 starts. A level with one node
/// runs inline; larger levels are submitted to the scheduler and awaited with
/// the composite's wait timeout. A timed out level fails the composite and
/// ends the walk.
#[derive(Debug)]
pub struct CompositeCommand {
    name: String,
    nodes: Vec<SharedExecutable>,
    dag: Dag<NodeIndex>,
    operator: AsyncOperator,
    force_all: bool,
    wait_timeout: Duration,
    priority: i32,
    stop_on_error: bool,
    stop_undo_on_error: bool,
    timed_out: AtomicBool,
    invoke_outcome: OnceCell<Option<bool>>,
    undo_outcome: OnceCell<Option<bool>>,
}

impl CompositeCommand {
    pub fn new(name: impl Into<String>, operator: AsyncOperator) -> Self {
        Self {
            name: name.into(),
            nodes: Vec::new(),
            dag: Dag::new(),
            operator,
            force_all: false,
            wait_timeout: Duration::from_secs(DEFAULT_WAIT_TIMEOUT_SECS),
            priority: DEFAULT_PRIORITY,
            stop_on_error: true,
            stop_undo_on_error: true,
            timed_out: AtomicBool::new(false),
            invoke_outcome: OnceCell::new(),
            undo_outcome: OnceCell::new(),
        }
    }

    /// Run every level even after failures
    pub fn with_force_all(mut self, force_all: bool) -> Self {
        self.force_all = force_all;
        self
    }

    pub fn with_wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout = timeout;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Policy reported to a parent composite walking this one
    pub fn with_stop_on_error(mut self, stop_on_error: bool) -> Self {
        self.stop_on_error = stop_on_error;
        self
    }

    pub fn with_stop_undo_on_error(mut self, stop_undo_on_error: bool) -> Self {
        self.stop_undo_on_error = stop_undo_on_error;
        self
    }

    pub fn add_node(&mut self, node: SharedExecutable) -> NodeIndex {
        let index = self.nodes.len();
        self.nodes.push(node);
        self.dag.add_node(index);
        index
    }

    /// Returns `false` (and adds nothing) for unknown nodes or an edge that
    /// would close a cycle.
    pub fn add_edge(&mut self, parent: NodeIndex, child: NodeIndex) -> bool {
        if parent >= self.nodes.len() || child >= self.nodes.len() {
            return false;
        }
        if self.dag.would_create_cycle(&parent, &child) {
            warn!(
                composite = %self.name,
                parent, child, "Rejected command edge closing a cycle"
            );
            return false;
        }
        self.dag.add_edge(parent, child);
        true
    }

    pub fn node(&self, index: NodeIndex) -> Option<&SharedExecutable> {
        self.nodes.get(index)
    }

    pub fn nodes(&self) -> &[SharedExecutable] {
        &self.nodes
    }

    /// Node indices grouped by execution level
    pub fn levels(&self) -> Vec<Vec<NodeIndex>> {
        self.dag.nodes_by_level()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Whether a level wait exceeded the timeout
    pub fn timed_out(&self) -> bool {
        self.timed_out.load(Ordering::Acquire)
    }

    fn level_nodes(&self, indices: &[NodeIndex]) -> Vec<SharedExecutable> {
        indices
            .iter()
            .filter_map(|index| self.nodes.get(*index).cloned())
            .collect()
    }

    #[instrument(skip(self), fields(composite = %self.name, nodes = self.nodes.len()))]
    async fn walk_forward(&self) -> CommandResult<Option<bool>> {
        for (level, indices) in self.dag.nodes_by_level().into_iter().enumerate() {
            let nodes = self.level_nodes(&indices);
            debug!(level, width = nodes.len(), "Invoking level");

            if !self.run_level(&nodes, Phase::Invoke).await? {
                warn!(level, timeout_secs = self.wait_timeout.as_secs_f64(), "Level timed out");
                self.timed_out.store(true, Ordering::Release);
                break;
            }

            let stopping = nodes
                .iter()
                .any(|node| node.success() == Some(false) && node.stop_on_error());
            if stopping && !self.force_all {
                info!(level, "Stopping after failed level");
                break;
            }
        }

        if self.timed_out() {
            return Ok(Some(false));
        }
        let ran: Vec<Option<bool>> = self
            .nodes
            .iter()
            .filter(|node| node.invoked())
            .map(|node| node.success())
            .collect();
        if ran.is_empty() {
            return Ok(None);
        }
        Ok(Some(!ran.contains(&Some(false))))
    }

    #[instrument(skip(self), fields(composite = %self.name))]
    async fn walk_backward(&self) -> CommandResult<Option<bool>> {
        let mut outcomes = Vec::new();

        for (level, indices) in self.dag.nodes_by_level().into_iter().enumerate().rev() {
            let nodes: Vec<SharedExecutable> = self
                .level_nodes(&indices)
                .into_iter()
                .filter(|node| node.invoked())
                .collect();
            if nodes.is_empty() {
                continue;
            }
            debug!(level, width = nodes.len(), "Undoing level");

            if !self.run_level(&nodes, Phase::Undo).await? {
                warn!(level, "Undo level timed out");
                return Ok(Some(false));
            }

            let mut stopping = false;
            for node in &nodes {
                let outcome = node.undo_success();
                stopping |= outcome == Some(false) && node.stop_undo_on_error();
                outcomes.push(outcome);
            }
            if stopping && !self.force_all {
                info!(level, "Stopping undo after failed level");
                break;
            }
        }

        let decided: Vec<bool> = outcomes.into_iter().flatten().collect();
        if decided.is_empty() {
            return Ok(None);
        }
        Ok(Some(decided.iter().all(|ok| *ok)))
    }

    /// Run one level to completion. `Ok(false)` means the wait timed out.
    async fn run_level(&self, nodes: &[SharedExecutable], phase: Phase) -> CommandResult<bool> {
        match nodes {
            [] => Ok(true),
            [single] => {
                phase.apply(single).await?;
                Ok(true)
            }
            _ => self.run_parallel(nodes, phase).await,
        }
    }

    async fn run_parallel(&self, nodes: &[SharedExecutable], phase: Phase) -> CommandResult<bool> {
        let mut submitted: Vec<(TaskId, String)> = Vec::with_capacity(nodes.len());
        let mut rejected = None;

        for node in nodes {
            let task_node = Arc::clone(node);
            let registered = self.operator.register(
                TaskOptions::default().with_priority(self.priority),
                move |_progress| async move {
                    let outcome = phase.apply(&task_node).await?;
                    Ok(json!(outcome))
                },
            );
            match registered {
                Ok(task_id) => submitted.push((task_id, node.name())),
                Err(source) => {
                    rejected = Some(CommandError::Scheduler {
                        node: node.name(),
                        source,
                    });
                    break;
                }
            }
        }

        let task_ids: Vec<TaskId> = submitted.iter().map(|(id, _)| *id).collect();
        let completed = self
            .operator
            .wait_tasks(Some(&task_ids), self.wait_timeout)
            .await;

        let raised = submitted.iter().find_map(|(task_id, node)| {
            self.operator
                .exception(*task_id)
                .map(|message| CommandError::Task {
                    node: node.clone(),
                    message,
                })
        });
        self.operator.purge(Some(&task_ids));

        if let Some(error) = rejected.or(raised) {
            return Err(error);
        }
        Ok(completed)
    }
}

#[async_trait]
impl Executable for CompositeCommand {
    fn key(&self) -> Option<CommandKey> {
        None
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    async fn invoke(&self) -> CommandResult<Option<bool>> {
        self.invoke_outcome
            .get_or_try_init(|| self.walk_forward())
            .await
            .copied()
    }

    async fn undo(&self) -> CommandResult<Option<bool>> {
        if !self.invoked() {
            return Ok(None);
        }
        self.undo_outcome
            .get_or_try_init(|| self.walk_backward())
            .await
            .copied()
    }

    fn invoked(&self) -> bool {
        self.invoke_outcome.initialized()
    }

    fn success(&self) -> Option<bool> {
        self.invoke_outcome.get().copied().flatten()
    }

    fn undo_success(&self) -> Option<bool> {
        self.undo_outcome.get().copied().flatten()
    }

    fn result(&self) -> ExecutionRecords {
        self.nodes.iter().flat_map(|node| node.result()).collect()
    }

    fn stop_on_error(&self) -> bool {
        self.stop_on_error
    }

    fn stop_undo_on_error(&self) -> bool {
        self.stop_undo_on_error
    }
}
