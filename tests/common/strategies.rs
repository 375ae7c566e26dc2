use proptest::prelude::*;

/// Random edge attempts over `steps` nodes: (parent index, child index)
pub fn edge_attempts_strategy(steps: usize) -> impl Strategy<Value = Vec<(usize, usize)>> {
    prop::collection::vec((0..steps, 0..steps), 0..steps * 3)
}

/// Which of `steps` nodes are undo steps
pub fn undo_flags_strategy(steps: usize) -> impl Strategy<Value = Vec<bool>> {
    prop::collection::vec(any::<bool>(), steps)
}

/// Valid orchestration names
pub fn orchestration_name_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_-]{0,31}"
}
