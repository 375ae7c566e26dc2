use serde_json::{json, Value};
use std::sync::Arc;

use crate::common::{params, target_all, test_config, test_step};
use fleet_core::commands::CommandKey;
use fleet_core::deployment::{deploy, DeployOptions, MemoryCatalog, RuntimeContext};
use fleet_core::models::{ActionType, Orchestration, Server, Step};
use fleet_core::operations::Params;
use fleet_core::scheduler::AsyncOperator;

fn context(local: &Server, catalog: Arc<MemoryCatalog>) -> RuntimeContext {
    RuntimeContext::builder(local.clone())
        .with_config(test_config())
        .with_operator(AsyncOperator::new(8, None))
        .with_catalog(catalog)
        .build()
}

fn inner(version: u32, fail: bool) -> Orchestration {
    let mut orch = Orchestration::new("inner", version);
    let step = test_step("inner_step", "inner {release}")
        .with_system_kwarg("success", json!(!fail));
    orch.add_step(step, &[], &[]).unwrap();
    orch
}

#[tokio::test]
async fn test_nested_orchestration_runs_latest_version() {
    let local = Server::new("node1");
    let catalog = Arc::new(MemoryCatalog::new());
    catalog.insert(inner(1, true));
    catalog.insert(inner(2, false));
    let ctx = context(&local, catalog);

    let mut outer = Orchestration::new("outer", 1);
    let nested = outer
        .add_step(
            Step::new_do().with_action(ActionType::Orchestration, "inner"),
            &[],
            &[],
        )
        .unwrap();

    let outcome = deploy(
        &ctx,
        &outer,
        params(json!({"release": "r7"})),
        &target_all(&[local.id]),
        DeployOptions::default(),
    )
    .await
    .unwrap();

    assert_eq!(outcome.forward_success, Some(true));
    let summary: Value = serde_json::from_str(
        outcome.results[&CommandKey::new(nested, local.id)]
            .stdout
            .as_deref()
            .unwrap(),
    )
    .unwrap();
    assert_eq!(summary["version"], json!(2));
    assert_eq!(summary["steps"], json!(1));
}

#[tokio::test]
async fn test_nested_failure_and_unknown_reference_fail_the_step() {
    let local = Server::new("node1");
    let catalog = Arc::new(MemoryCatalog::new());
    catalog.insert(inner(1, true));
    let ctx = context(&local, catalog);

    for code in ["inner:1", "missing", "inner:9"] {
        let mut outer = Orchestration::new("outer", 1);
        outer
            .add_step(
                Step::new_do().with_action(ActionType::Orchestration, code),
                &[],
                &[],
            )
            .unwrap();
        let outcome = deploy(
            &ctx,
            &outer,
            params(json!({"release": "r1"})),
            &target_all(&[local.id]),
            DeployOptions::default(),
        )
        .await
        .unwrap();
        assert_eq!(outcome.forward_success, Some(false), "reference {code}");
    }
}

#[tokio::test]
async fn test_nested_without_catalog_fails() {
    let local = Server::new("node1");
    let ctx = RuntimeContext::builder(local.clone())
        .with_config(test_config())
        .build();
    let mut outer = Orchestration::new("outer", 1);
    outer
        .add_step(
            Step::new_do().with_action(ActionType::Orchestration, "inner"),
            &[],
            &[],
        )
        .unwrap();

    let outcome = deploy(&ctx, &outer, Params::new(), &target_all(&[local.id]), DeployOptions::default())
        .await
        .unwrap();
    assert_eq!(outcome.forward_success, Some(false));
}
