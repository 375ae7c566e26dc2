use std::sync::Arc;

use super::{action, ScriptedRunner};
use fleet_core::commands::{
    Command, CommandPolicy, CompositeCommand, Executable, UndoCommand,
};
use fleet_core::scheduler::AsyncOperator;

fn undo_plan(runner: &Arc<ScriptedRunner>) -> CompositeCommand {
    let mut plan = CompositeCommand::new("undo plan", AsyncOperator::new(4, None));
    plan.add_node(Arc::new(UndoCommand::new(
        action("rollback", true, Arc::clone(runner)),
        true,
    )));
    plan
}

#[tokio::test]
async fn test_command_invokes_once() {
    let runner = ScriptedRunner::new(true);
    let command = Command::new(action("install", false, Arc::clone(&runner)), CommandPolicy::default());

    assert!(!command.invoked());
    assert_eq!(command.invoke().await.unwrap(), Some(true));
    assert_eq!(command.invoke().await.unwrap(), Some(true));
    assert_eq!(runner.runs(), 1);
    assert_eq!(command.result().len(), 1);
}

#[tokio::test]
async fn test_undo_before_invoke_does_nothing() {
    let undo_runner = ScriptedRunner::new(true);
    let command = Command::new(action("install", false, ScriptedRunner::new(true)), CommandPolicy::default())
        .with_undo(undo_plan(&undo_runner));

    assert_eq!(command.undo().await.unwrap(), None);
    assert_eq!(undo_runner.runs(), 0);

    // a later undo after invoking still runs
    command.invoke().await.unwrap();
    assert_eq!(command.undo().await.unwrap(), Some(true));
    assert_eq!(command.undo().await.unwrap(), Some(true));
    assert_eq!(undo_runner.runs(), 1);
}

#[tokio::test]
async fn test_failed_command_undo_gated_by_policy() {
    let undo_runner = ScriptedRunner::new(true);
    let command = Command::new(
        action("install", false, ScriptedRunner::new(false)),
        CommandPolicy {
            undo_on_error: false,
            ..CommandPolicy::default()
        },
    )
    .with_undo(undo_plan(&undo_runner));

    assert_eq!(command.invoke().await.unwrap(), Some(false));
    assert_eq!(command.undo().await.unwrap(), None);
    assert_eq!(undo_runner.runs(), 0);

    let undo_runner = ScriptedRunner::new(true);
    let command = Command::new(action("install", false, ScriptedRunner::new(false)), CommandPolicy::default())
        .with_undo(undo_plan(&undo_runner));
    command.invoke().await.unwrap();
    assert_eq!(command.undo().await.unwrap(), Some(true));
    assert_eq!(undo_runner.runs(), 1);
}

#[tokio::test]
async fn test_undo_command_undo_is_noop() {
    let runner = ScriptedRunner::new(true);
    let command = UndoCommand::new(action("rollback", true, Arc::clone(&runner)), true);

    assert_eq!(command.invoke().await.unwrap(), Some(true));
    assert_eq!(command.undo().await.unwrap(), Some(true));
    assert_eq!(command.undo_success(), Some(true));
    assert_eq!(runner.runs(), 1);
}

#[tokio::test]
async fn test_command_without_undo_steps_reports_nothing_undone() {
    let command = Command::new(action("check", false, ScriptedRunner::new(true)), CommandPolicy::default());
    command.invoke().await.unwrap();
    assert_eq!(command.undo().await.unwrap(), None);
    assert_eq!(command.undo_success(), None);
}
