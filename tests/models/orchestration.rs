use proptest::prelude::*;

use crate::common::strategies::{edge_attempts_strategy, orchestration_name_strategy, undo_flags_strategy};
use crate::common::{test_step, undo_step};
use fleet_core::models::{GraphError, Orchestration, Step, StepId};

#[test]
fn test_invariant_violations_leave_graph_unchanged() {
    let mut orch = Orchestration::new("web", 1);
    let a = orch.add_step(test_step("a", "a"), &[], &[]).unwrap();
    let b = orch.add_step(test_step("b", "b"), &[a], &[]).unwrap();
    let undo = orch.add_step(undo_step("undo_a"), &[a], &[]).unwrap();
    let before = orch.clone();

    assert!(matches!(
        orch.add_parents(a, &[b]),
        Err(GraphError::Cycle { .. })
    ));
    assert!(matches!(
        orch.add_children(undo, &[b]),
        Err(GraphError::ChildDo { .. })
    ));
    assert!(matches!(
        orch.add_parents(b, &[undo]),
        Err(GraphError::ParentUndo { .. })
    ));
    assert!(matches!(
        orch.add_step(Step::new_undo().with_target("web"), &[], &[]),
        Err(GraphError::UndoTarget { .. })
    ));
    assert_eq!(orch, before);
}

#[test]
fn test_set_parents_is_atomic() {
    let mut orch = Orchestration::new("web", 1);
    let a = orch.add_step(test_step("a", "a"), &[], &[]).unwrap();
    let b = orch.add_step(test_step("b", "b"), &[], &[]).unwrap();
    let c = orch.add_step(test_step("c", "c"), &[a], &[b]).unwrap();

    // b -> a would close a -> c -> b -> a
    assert!(orch.set_parents(a, &[b]).is_err());
    assert_eq!(orch.dag().predecessors(&c).len(), 1);
    assert!(orch.dag().has_edge(&a, &c));

    orch.set_parents(c, &[]).unwrap();
    assert!(orch.parents(&c).is_empty());
    orch.set_parents(a, &[b]).unwrap();
    assert_eq!(orch.depth(), 2);
}

#[test]
fn test_undo_plan_is_subtree_of_undo_children() {
    let mut orch = Orchestration::new("db", 2);
    let migrate = orch.add_step(test_step("migrate", "m"), &[], &[]).unwrap();
    let rollback = orch.add_step(undo_step("rollback"), &[migrate], &[]).unwrap();
    let notify = orch.add_step(undo_step("notify"), &[rollback], &[]).unwrap();
    let next = orch.add_step(test_step("next", "n"), &[migrate], &[]).unwrap();

    let plan = orch.subtree(&[rollback]);
    assert!(plan.contains(&rollback));
    assert!(plan.contains(&notify));
    assert!(!plan.contains(&next));
    assert_eq!(orch.undo_children(&migrate).len(), 1);
    assert_eq!(orch.do_steps().count(), 2);
}

proptest! {
    #[test]
    fn prop_random_edges_keep_invariants(
        name in orchestration_name_strategy(),
        undo_flags in undo_flags_strategy(8),
        edges in edge_attempts_strategy(8),
    ) {
        let mut orch = Orchestration::new(name, 1);
        let ids: Vec<StepId> = undo_flags
            .iter()
            .enumerate()
            .map(|(i, undo)| {
                let step = if *undo { undo_step(&format!("u{i}")) } else { test_step(&format!("d{i}"), "x") };
                orch.add_step(step, &[], &[]).unwrap()
            })
            .collect();

        for (parent, child) in edges {
            let _ = orch.add_children(ids[parent], &[ids[child]]);
        }

        prop_assert!(!orch.is_cyclic());
        for (parent, child) in orch.dag().edges() {
            let parent = orch.step(parent).unwrap();
            let child = orch.step(child).unwrap();
            prop_assert!(!(parent.undo && !child.undo));
        }
    }
}
