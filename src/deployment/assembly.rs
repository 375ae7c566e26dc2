//! Deployment Assembly: compiles an orchestration, a target mapping and the
//! deployment variables into the root [`CompositeCommand`].
//!
//! One node is created per (do step, server). A parent step's nodes on every
//! server precede the child step's nodes on every server. Nodes on the
//! context's own server run locally, all others are proxied.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use super::{DeploymentError, RuntimeContext};
use crate::commands::{
    ActionRunner, Command, CommandKey, CommandPolicy, CompositeCommand, LocalRunner, NodeIndex,
    ProxyCommand, ProxyUndoCommand, RemoteAction, RemoteRunner, SharedExecutable, StepAction,
    UndoCommand, VarContext,
};
use crate::models::{Orchestration, ServerId, Step, StepId, TargetMapping};

/// Per-deployment inputs shared by every node
#[derive(Debug, Clone)]
pub struct AssemblyInput<'a> {
    pub execution_id: Uuid,
    pub vars: &'a VarContext,
    pub target: &'a TargetMapping,
    pub force_all: bool,
}

/// Servers of a do step's target group, deduplicated in mapping order
pub fn servers_for(step: &Step, target: &TargetMapping) -> Result<Vec<ServerId>, DeploymentError> {
    let Some(group) = step.target_group() else {
        return Ok(Vec::new());
    };
    let servers = target
        .get(group)
        .ok_or_else(|| DeploymentError::UnmappedTarget {
            target: group.to_string(),
        })?;
    let mut unique = Vec::with_capacity(servers.len());
    for server in servers {
        if !unique.contains(server) {
            unique.push(*server);
        }
    }
    Ok(unique)
}

pub fn create_cmd_from_orchestration(
    ctx: &RuntimeContext,
    orchestration: &Orchestration,
    input: &AssemblyInput<'_>,
) -> Result<CompositeCommand, DeploymentError> {
    let mut root = CompositeCommand::new(orchestration.name.clone(), ctx.operator().clone())
        .with_force_all(input.force_all)
        .with_wait_timeout(ctx.config().scheduler.wait_timeout())
        .with_stop_on_error(orchestration.stop_on_error)
        .with_stop_undo_on_error(orchestration.stop_undo_on_error);
    let mut placed: HashMap<StepId, Vec<NodeIndex>> = HashMap::new();

    for step in orchestration.do_steps() {
        let mut indices = Vec::new();
        for server_id in servers_for(step, input.target)? {
            let node = forward_node(ctx, orchestration, step, server_id, input)?;
            indices.push(root.add_node(node));
        }
        placed.insert(step.id, indices);
    }

    for step in orchestration.do_steps() {
        let Some(children) = placed.get(&step.id) else {
            continue;
        };
        for parent in orchestration.parents(&step.id) {
            let Some(parents) = placed.get(&parent.id) else {
                continue;
            };
            for parent_index in parents {
                for child_index in children {
                    root.add_edge(*parent_index, *child_index);
                }
            }
        }
    }

    debug!(
        orchestration = %orchestration.name,
        nodes = root.len(),
        levels = root.levels().len(),
        "Assembled command tree"
    );
    Ok(root)
}

fn runner(
    ctx: &RuntimeContext,
    step: &Step,
    key: CommandKey,
    action: RemoteAction,
    execution_id: Uuid,
) -> Result<(Arc<dyn ActionRunner>, bool), DeploymentError> {
    let server_id = key.server_id;
    let spec = step.action_spec()?;
    if server_id == ctx.server().id {
        let operation = ctx.registry().create(spec, ctx)?;
        return Ok((Arc::new(LocalRunner::new(operation)), false));
    }

    // unsupported kinds fail at assembly even when the step runs remotely
    if !ctx.registry().supports(spec.action_type) {
        return Err(crate::operations::OperationError::UnsupportedAction {
            action_type: spec.action_type,
        }
        .into());
    }
    let dispatcher = ctx
        .dispatcher()
        .ok_or(DeploymentError::NoTransport { server_id })?;
    Ok((
        Arc::new(RemoteRunner::new(dispatcher, execution_id, action, key, spec)),
        true,
    ))
}

fn forward_node(
    ctx: &RuntimeContext,
    orchestration: &Orchestration,
    step: &Step,
    server_id: ServerId,
    input: &AssemblyInput<'_>,
) -> Result<SharedExecutable, DeploymentError> {
    let key = CommandKey::new(step.id, server_id);
    let (runner, remote) = runner(ctx, step, key, RemoteAction::Invoke, input.execution_id)?;
    let action = StepAction::new(
        key,
        step.display_name(),
        false,
        step.resolved_schema(),
        runner,
        input.vars.clone(),
    )
    .with_events(ctx.events().clone());

    let policy = CommandPolicy {
        stop_on_error: orchestration.resolve_stop_on_error(step),
        stop_undo_on_error: orchestration.resolve_stop_undo_on_error(step),
        undo_on_error: orchestration.resolve_undo_on_error(step),
    };
    let mut command = Command::new(action, policy);
    if let Some(undo) = undo_composite(ctx, orchestration, step, server_id, input)? {
        command = command.with_undo(undo);
    }

    Ok(if remote {
        Arc::new(ProxyCommand::new(command, server_id))
    } else {
        Arc::new(command)
    })
}

/// Composite of the undo steps compensating `step`, on the same server
fn undo_composite(
    ctx: &RuntimeContext,
    orchestration: &Orchestration,
    step: &Step,
    server_id: ServerId,
    input: &AssemblyInput<'_>,
) -> Result<Option<CompositeCommand>, DeploymentError> {
    let undo_roots: Vec<StepId> = orchestration
        .undo_children(&step.id)
        .iter()
        .map(|undo| undo.id)
        .collect();
    if undo_roots.is_empty() {
        return Ok(None);
    }

    let subtree = orchestration.subtree(&undo_roots);
    let mut composite = CompositeCommand::new(
        format!("undo {} on {}", step.display_name(), server_id),
        ctx.operator().clone(),
    )
    .with_force_all(input.force_all)
    .with_wait_timeout(ctx.config().scheduler.wait_timeout());
    let mut placed: HashMap<StepId, NodeIndex> = HashMap::new();

    for undo_step in orchestration.steps().filter(|s| subtree.contains(&s.id)) {
        let key = CommandKey::compensating(undo_step.id, server_id, step.id);
        let (runner, remote) = runner(ctx, undo_step, key, RemoteAction::Undo, input.execution_id)?;
        let action = StepAction::new(
            key,
            undo_step.display_name(),
            true,
            undo_step.resolved_schema(),
            runner,
            input.vars.clone(),
        )
        .with_events(ctx.events().clone());
        let command = UndoCommand::new(action, orchestration.resolve_stop_undo_on_error(undo_step));
        let node: SharedExecutable = if remote {
            Arc::new(ProxyUndoCommand::new(command, server_id))
        } else {
            Arc::new(command)
        };
        placed.insert(undo_step.id, composite.add_node(node));
    }

    for (parent, child) in subtree.edges() {
        if let (Some(parent), Some(child)) = (placed.get(parent), placed.get(child)) {
            composite.add_edge(*parent, *child);
        }
    }
    Ok(Some(composite))
}
