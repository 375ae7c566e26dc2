use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::common::{
    assert_ran_before, failing_step, local_context, output_step, params, target_all, test_step,
    undo_step,
};
use fleet_core::commands::CommandKey;
use fleet_core::constants::events;
use fleet_core::deployment::{deploy, DeployOptions, InProcessLock, MemorySink, RuntimeContext};
use fleet_core::models::{Orchestration, Server};
use fleet_core::operations::Params;
use fleet_core::scheduler::AsyncOperator;

#[tokio::test]
async fn test_linear_chain_succeeds_and_is_recorded() {
    let local = Server::new("node1");
    let (ctx, sink) = local_context(&local);
    let mut received = ctx.events().subscribe();

    let mut orch = Orchestration::new("chain", 1);
    let a = orch.add_step(test_step("a", "a"), &[], &[]).unwrap();
    let b = orch.add_step(test_step("b", "b"), &[a], &[]).unwrap();
    orch.add_step(test_step("c", "c"), &[b], &[]).unwrap();

    let outcome = deploy(&ctx, &orch, Params::new(), &target_all(&[local.id]), DeployOptions::default())
        .await
        .unwrap();

    assert_eq!(outcome.forward_success, Some(true));
    assert_eq!(outcome.undo_success, None);
    assert_eq!(outcome.results.len(), 3);
    assert!(outcome.results.values().all(|r| r.success == Some(true)));

    assert_eq!(sink.steps().len(), 3);
    let summary = &sink.orchestrations()[0];
    assert_eq!(summary.execution_id, outcome.execution_id);
    assert_eq!(summary.forward_success, Some(true));

    let mut names = Vec::new();
    while let Ok(event) = received.try_recv() {
        names.push(event.name);
    }
    assert_eq!(names.first().map(String::as_str), Some(events::DEPLOYMENT_STARTED));
    assert_eq!(names.last().map(String::as_str), Some(events::DEPLOYMENT_COMPLETED));
    assert_eq!(names.iter().filter(|n| *n == events::STEP_INVOKED).count(), 3);
}

#[tokio::test]
async fn test_failure_undoes_in_reverse_order() {
    let local = Server::new("node1");
    let (ctx, _sink) = local_context(&local);

    let mut orch = Orchestration::new("rollback", 1);
    let a = orch.add_step(test_step("a", "a"), &[], &[]).unwrap();
    let undo_a = orch.add_step(undo_step("undo_a"), &[a], &[]).unwrap();
    let b = orch.add_step(test_step("b", "b"), &[a], &[]).unwrap();
    let undo_b = orch.add_step(undo_step("undo_b"), &[b], &[]).unwrap();
    let c = orch.add_step(failing_step("c"), &[b], &[]).unwrap();
    let d = orch.add_step(test_step("d", "d"), &[c], &[]).unwrap();

    let outcome = deploy(&ctx, &orch, Params::new(), &target_all(&[local.id]), DeployOptions::default())
        .await
        .unwrap();

    assert_eq!(outcome.forward_success, Some(false));
    assert_eq!(outcome.undo_success, Some(true));
    let key = |step| CommandKey::new(step, local.id);
    assert!(!outcome.results.contains_key(&key(d)));
    assert_eq!(outcome.results[&key(c)].success, Some(false));
    assert_ran_before(
        &outcome.results[&CommandKey::compensating(undo_b, local.id, b)],
        &outcome.results[&CommandKey::compensating(undo_a, local.id, a)],
    );
}

#[tokio::test]
async fn test_failing_step_is_undone_before_its_parent() {
    let local = Server::new("node1");
    let (ctx, _sink) = local_context(&local);

    let mut orch = Orchestration::new("undo-failed", 1);
    let a = orch.add_step(test_step("a", "a"), &[], &[]).unwrap();
    let undo_a = orch.add_step(undo_step("undo_a"), &[a], &[]).unwrap();
    let b = orch.add_step(failing_step("b"), &[a], &[]).unwrap();
    let undo_b = orch.add_step(undo_step("undo_b"), &[b], &[]).unwrap();

    let outcome = deploy(&ctx, &orch, Params::new(), &target_all(&[local.id]), DeployOptions::default())
        .await
        .unwrap();

    assert_eq!(outcome.forward_success, Some(false));
    assert_eq!(outcome.undo_success, Some(true));
    let undone_b = &outcome.results[&CommandKey::compensating(undo_b, local.id, b)];
    let undone_a = &outcome.results[&CommandKey::compensating(undo_a, local.id, a)];
    assert_eq!(undone_b.success, Some(true));
    assert_ran_before(undone_b, undone_a);
}

#[tokio::test]
async fn test_wide_rollback_runs_with_few_slots() {
    let local = Server::new("node1");
    let sink = Arc::new(MemorySink::new());
    let mut config = crate::common::test_config();
    config.scheduler.wait_timeout_secs = 2;
    let ctx = RuntimeContext::builder(local.clone())
        .with_config(config)
        .with_operator(AsyncOperator::new(2, None))
        .with_sink(sink.clone())
        .build();
    let mut received = ctx.events().subscribe();

    let mut orch = Orchestration::new("wide-rollback", 1);
    let mut roots = Vec::new();
    for name in ["a1", "a2"] {
        let root = orch.add_step(test_step(name, name), &[], &[]).unwrap();
        for undo in ["stop", "restore"] {
            orch.add_step(undo_step(&format!("{undo}_{name}")), &[root], &[])
                .unwrap();
        }
        roots.push(root);
    }
    orch.add_step(failing_step("f"), &roots, &[]).unwrap();

    let started = Instant::now();
    let outcome = deploy(&ctx, &orch, Params::new(), &target_all(&[local.id]), DeployOptions::default())
        .await
        .unwrap();

    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(outcome.forward_success, Some(false));
    assert_eq!(outcome.undo_success, Some(true));
    assert_eq!(outcome.results.len(), 7);
    assert_eq!(sink.steps().len(), 7);

    let mut undone = 0;
    while let Ok(event) = received.try_recv() {
        if event.name == events::STEP_UNDONE {
            undone += 1;
        }
    }
    assert_eq!(undone, 4);
    assert_eq!(ctx.operator().running_count(), 0);
}

#[tokio::test]
async fn test_shared_undo_step_is_recorded_per_compensated_step() {
    let local = Server::new("node1");
    let (ctx, sink) = local_context(&local);

    let mut orch = Orchestration::new("shared-undo", 1);
    let a = orch.add_step(test_step("a", "a"), &[], &[]).unwrap();
    let b = orch.add_step(test_step("b", "b"), &[], &[]).unwrap();
    let cleanup = orch.add_step(undo_step("cleanup"), &[a, b], &[]).unwrap();
    orch.add_step(failing_step("c"), &[a, b], &[]).unwrap();

    let outcome = deploy(&ctx, &orch, Params::new(), &target_all(&[local.id]), DeployOptions::default())
        .await
        .unwrap();

    assert_eq!(outcome.undo_success, Some(true));
    for parent in [a, b] {
        let key = CommandKey::compensating(cleanup, local.id, parent);
        assert_eq!(outcome.results[&key].stdout.as_deref(), Some("cleanup"));
    }
    let cleanup_records: Vec<_> = sink
        .steps()
        .into_iter()
        .filter(|record| record.step_id == cleanup)
        .collect();
    assert_eq!(cleanup_records.len(), 2);
    assert!(cleanup_records.iter().any(|r| r.compensates == Some(a)));
    assert!(cleanup_records.iter().any(|r| r.compensates == Some(b)));
}

#[tokio::test]
async fn test_force_all_runs_parallel_siblings_past_failure() {
    let local = Server::new("node1");
    let (ctx, _sink) = local_context(&local);

    let mut orch = Orchestration::new("siblings", 1);
    let prepare = orch.add_step(test_step("prepare", "p"), &[], &[]).unwrap();
    let bad = orch.add_step(failing_step("bad"), &[prepare], &[]).unwrap();
    let good = orch.add_step(test_step("good", "g"), &[prepare], &[]).unwrap();
    let finish = orch.add_step(test_step("finish", "f"), &[bad, good], &[]).unwrap();

    let options = DeployOptions::default()
        .with_force_all(true)
        .with_undo_on_error(false);
    let outcome = deploy(&ctx, &orch, Params::new(), &target_all(&[local.id]), options)
        .await
        .unwrap();

    let key = |step| CommandKey::new(step, local.id);
    assert_eq!(outcome.forward_success, Some(false));
    assert_eq!(outcome.results[&key(bad)].success, Some(false));
    assert_eq!(outcome.results[&key(good)].success, Some(true));
    assert_eq!(outcome.results[&key(finish)].success, Some(true));
}

#[tokio::test]
async fn test_undo_disabled_keeps_successful_steps() {
    let local = Server::new("node1");
    let (ctx, _sink) = local_context(&local);

    let mut orch = Orchestration::new("keep", 1).with_undo_on_error(false);
    let a = orch.add_step(test_step("a", "a"), &[], &[]).unwrap();
    let undo_a = orch.add_step(undo_step("undo_a"), &[a], &[]).unwrap();
    orch.add_step(failing_step("b"), &[a], &[]).unwrap();

    let outcome = deploy(&ctx, &orch, Params::new(), &target_all(&[local.id]), DeployOptions::default())
        .await
        .unwrap();
    assert_eq!(outcome.forward_success, Some(false));
    assert_eq!(outcome.undo_success, None);
    assert!(!outcome
        .results
        .contains_key(&CommandKey::compensating(undo_a, local.id, a)));
}

#[tokio::test]
async fn test_force_all_runs_past_failures() {
    let local = Server::new("node1");
    let (ctx, _sink) = local_context(&local);

    let mut orch = Orchestration::new("forced", 1);
    let a = orch.add_step(failing_step("a"), &[], &[]).unwrap();
    let b = orch.add_step(test_step("b", "b"), &[a], &[]).unwrap();

    let options = DeployOptions::default()
        .with_force_all(true)
        .with_undo_on_error(false);
    let outcome = deploy(&ctx, &orch, Params::new(), &target_all(&[local.id]), options)
        .await
        .unwrap();

    assert_eq!(outcome.forward_success, Some(false));
    assert_eq!(
        outcome.results[&CommandKey::new(b, local.id)].success,
        Some(true)
    );
}

#[tokio::test]
async fn test_outputs_flow_into_later_steps() {
    let local = Server::new("node1");
    let (ctx, _sink) = local_context(&local);

    let mut orch = Orchestration::new("release", 1);
    let build = orch
        .add_step(output_step("build", json!({"version": "1.2.0"})), &[], &[])
        .unwrap();
    let ship = orch
        .add_step(test_step("ship", "ship {app} {version}"), &[build], &[])
        .unwrap();

    let outcome = deploy(
        &ctx,
        &orch,
        params(json!({"app": "web"})),
        &target_all(&[local.id]),
        DeployOptions::default(),
    )
    .await
    .unwrap();

    assert_eq!(outcome.forward_success, Some(true));
    assert_eq!(
        outcome.results[&CommandKey::new(ship, local.id)].stdout.as_deref(),
        Some("ship web 1.2.0")
    );
}

#[tokio::test]
async fn test_duplicate_servers_collapse() {
    let local = Server::new("node1");
    let (ctx, _sink) = local_context(&local);

    let mut orch = Orchestration::new("fanout", 1);
    let prepare = orch.add_step(test_step("prepare", "p"), &[], &[]).unwrap();
    orch.add_step(test_step("finish", "f").with_target("local"), &[prepare], &[])
        .unwrap();

    let mut target = target_all(&[local.id, local.id]);
    target.insert("local".into(), vec![local.id]);
    let outcome = deploy(&ctx, &orch, Params::new(), &target, DeployOptions::default())
        .await
        .unwrap();

    assert_eq!(outcome.results.len(), 2);
    assert_eq!(outcome.forward_success, Some(true));
}

#[tokio::test]
async fn test_lock_released_after_deploy() {
    let local = Server::new("node1");
    let lock = Arc::new(InProcessLock::new());
    let ctx = RuntimeContext::builder(local.clone())
        .with_config(crate::common::test_config())
        .with_operator(AsyncOperator::new(4, None))
        .with_lock(lock.clone())
        .build();

    let mut orch = Orchestration::new("locked", 1);
    orch.add_step(failing_step("a"), &[], &[]).unwrap();

    deploy(&ctx, &orch, Params::new(), &target_all(&[local.id]), DeployOptions::default())
        .await
        .unwrap();
    assert_eq!(lock.active_handles(), 0);
    assert!(!lock.is_held(&local.id));
}
