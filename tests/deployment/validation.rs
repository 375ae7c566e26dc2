use std::sync::Arc;

use crate::common::{local_context, target_all, test_config, test_step};
use fleet_core::deployment::{
    deploy, DeployOptions, DeploymentError, DistributedLock, InProcessLock, LockError, LockRequest,
    RuntimeContext,
};
use fleet_core::models::{ActionType, Orchestration, Server, Step, StepSchema};
use fleet_core::operations::{OperationError, OperationRegistry, Params};

#[tokio::test]
async fn test_unmapped_target_group_is_rejected() {
    let local = Server::new("node1");
    let (ctx, sink) = local_context(&local);
    let mut orch = Orchestration::new("db", 1);
    orch.add_step(test_step("migrate", "m").with_target("db"), &[], &[])
        .unwrap();

    let err = deploy(&ctx, &orch, Params::new(), &target_all(&[local.id]), DeployOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, DeploymentError::UnmappedTarget { ref target } if target == "db"));
    assert!(sink.steps().is_empty());
}

#[tokio::test]
async fn test_missing_required_parameters_are_rejected() {
    let local = Server::new("node1");
    let (ctx, _sink) = local_context(&local);
    let mut orch = Orchestration::new("params", 1);
    orch.add_step(
        test_step("install", "install {package}")
            .with_schema(StepSchema::new().with_required("package")),
        &[],
        &[],
    )
    .unwrap();

    let err = deploy(&ctx, &orch, Params::new(), &target_all(&[local.id]), DeployOptions::default())
        .await
        .unwrap_err();
    match err {
        DeploymentError::MissingParameters { names } => assert_eq!(names, vec!["package"]),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_unsupported_action_type_fails_before_running() {
    let local = Server::new("node1");
    let ctx = RuntimeContext::builder(local.clone())
        .with_config(test_config())
        .with_registry(OperationRegistry::builtin().without(ActionType::Ansible))
        .build();
    let mut orch = Orchestration::new("playbook", 1);
    orch.add_step(
        Step::new_do().with_action(ActionType::Ansible, "- hosts: all"),
        &[],
        &[],
    )
    .unwrap();

    let err = deploy(&ctx, &orch, Params::new(), &target_all(&[local.id]), DeployOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DeploymentError::Operation(OperationError::UnsupportedAction {
            action_type: ActionType::Ansible
        })
    ));
}

#[tokio::test]
async fn test_contended_lock_aborts_deployment() {
    let local = Server::new("node1");
    let lock = Arc::new(InProcessLock::new());
    let (_, sink) = local_context(&local);
    let ctx = RuntimeContext::builder(local.clone())
        .with_config(test_config())
        .with_lock(lock.clone())
        .with_sink(sink.clone())
        .build();

    let held = lock
        .prevent(LockRequest {
            scope: "other".into(),
            servers: vec![local.id],
            applicant: Server::new("peer").id,
            watermark: None,
        })
        .await
        .unwrap();

    let mut orch = Orchestration::new("blocked", 1);
    orch.add_step(test_step("a", "a"), &[], &[]).unwrap();
    let err = deploy(&ctx, &orch, Params::new(), &target_all(&[local.id]), DeployOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, DeploymentError::Lock(LockError::Contended { .. })));
    assert!(sink.steps().is_empty());
    assert!(sink.orchestrations().is_empty());

    lock.unlock(&held).await.unwrap();
    let outcome = deploy(&ctx, &orch, Params::new(), &target_all(&[local.id]), DeployOptions::default())
        .await
        .unwrap();
    assert_eq!(outcome.forward_success, Some(true));
}
