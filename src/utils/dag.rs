//! # Directed Acyclic Graph
//!
//! Small adjacency-set DAG used by both the workflow model (steps) and the
//! command hierarchy (child commands of a composite).
//!
//! Nodes are kept in `BTreeMap`/`BTreeSet` so every traversal is
//! deterministic, which keeps level listings and error messages stable.
//!
//! Levels are computed as the longest path from any root, so every parent of
//! a node always sits in a strictly lower level than the node itself. That is
//! the property level-synchronous execution relies on.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dag<T: Ord + Clone> {
    /// node -> successors (children)
    children: BTreeMap<T, BTreeSet<T>>,
    /// node -> predecessors (parents)
    parents: BTreeMap<T, BTreeSet<T>>,
}

impl<T: Ord + Clone> Default for Dag<T> {
    fn default() -> Self {
        Self {
            children: BTreeMap::new(),
            parents: BTreeMap::new(),
        }
    }
}

impl<T: Ord + Clone> Dag<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from nodes and `(parent, child)` edges.
    ///
    /// Edge endpoints are added as nodes when missing.
    pub fn from_edges<I, E>(nodes: I, edges: E) -> Self
    where
        I: IntoIterator<Item = T>,
        E: IntoIterator<Item = (T, T)>,
    {
        let mut dag = Self::new();
        for node in nodes {
            dag.add_node(node);
        }
        for (from, to) in edges {
            dag.add_edge(from, to);
        }
        dag
    }

    pub fn add_node(&mut self, node: T) {
        self.children.entry(node.clone()).or_default();
        self.parents.entry(node).or_default();
    }

    /// Insert `from -> to`. Does not check for cycles; callers validate with
    /// [`Dag::is_cyclic`] or [`Dag::would_create_cycle`].
    pub fn add_edge(&mut self, from: T, to: T) {
        self.add_node(from.clone());
        self.add_node(to.clone());
        if let Some(succ) = self.children.get_mut(&from) {
            succ.insert(to.clone());
        }
        if let Some(pred) = self.parents.get_mut(&to) {
            pred.insert(from);
        }
    }

    /// Remove `from -> to`, returning whether the edge existed.
    pub fn remove_edge(&mut self, from: &T, to: &T) -> bool {
        let removed = self
            .children
            .get_mut(from)
            .map(|succ| succ.remove(to))
            .unwrap_or(false);
        if let Some(pred) = self.parents.get_mut(to) {
            pred.remove(from);
        }
        removed
    }

    pub fn contains(&self, node: &T) -> bool {
        self.children.contains_key(node)
    }

    pub fn has_edge(&self, from: &T, to: &T) -> bool {
        self.children
            .get(from)
            .map(|succ| succ.contains(to))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &T> {
        self.children.keys()
    }

    pub fn edges(&self) -> impl Iterator<Item = (&T, &T)> {
        self.children
            .iter()
            .flat_map(|(from, succ)| succ.iter().map(move |to| (from, to)))
    }

    pub fn successors(&self, node: &T) -> BTreeSet<T> {
        self.children.get(node).cloned().unwrap_or_default()
    }

    pub fn predecessors(&self, node: &T) -> BTreeSet<T> {
        self.parents.get(node).cloned().unwrap_or_default()
    }

    /// Nodes without parents.
    pub fn root(&self) -> Vec<T> {
        self.parents
            .iter()
            .filter(|(_, pred)| pred.is_empty())
            .map(|(node, _)| node.clone())
            .collect()
    }

    /// Every node reachable from `start`, excluding `start` unless it sits on a cycle.
    pub fn reachable(&self, start: &T) -> BTreeSet<T> {
        let mut seen = BTreeSet::new();
        let mut queue: VecDeque<T> = self.successors(start).into_iter().collect();
        while let Some(node) = queue.pop_front() {
            if seen.insert(node.clone()) {
                queue.extend(self.successors(&node));
            }
        }
        seen
    }

    /// True when adding `from -> to` would close a cycle.
    pub fn would_create_cycle(&self, from: &T, to: &T) -> bool {
        from == to || self.reachable(to).contains(from)
    }

    /// Kahn's algorithm; a cycle leaves nodes with unresolved in-degree.
    pub fn is_cyclic(&self) -> bool {
        self.topological_order().is_none()
    }

    /// Topological order, or `None` when the graph has a cycle.
    pub fn topological_order(&self) -> Option<Vec<T>> {
        let mut in_degree: BTreeMap<&T, usize> = self
            .parents
            .iter()
            .map(|(node, pred)| (node, pred.len()))
            .collect();
        let mut ready: VecDeque<&T> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(node, _)| *node)
            .collect();
        let mut order = Vec::with_capacity(self.len());

        while let Some(node) = ready.pop_front() {
            order.push(node.clone());
            if let Some(succ) = self.children.get(node) {
                for child in succ {
                    if let Some(degree) = in_degree.get_mut(child) {
                        *degree -= 1;
                        if *degree == 0 {
                            ready.push_back(child);
                        }
                    }
                }
            }
        }

        (order.len() == self.len()).then_some(order)
    }

    /// Level of every node (longest path from a root). Empty map on cycles.
    pub fn levels(&self) -> BTreeMap<T, usize> {
        let mut levels = BTreeMap::new();
        let Some(order) = self.topological_order() else {
            return levels;
        };
        for node in order {
            let level = self
                .predecessors(&node)
                .iter()
                .filter_map(|parent| levels.get(parent))
                .map(|level| level + 1)
                .max()
                .unwrap_or(0);
            levels.insert(node, level);
        }
        levels
    }

    pub fn get_nodes_at_level(&self, level: usize) -> Vec<T> {
        self.levels()
            .into_iter()
            .filter(|(_, l)| *l == level)
            .map(|(node, _)| node)
            .collect()
    }

    /// Nodes grouped by level, lowest level first.
    pub fn nodes_by_level(&self) -> Vec<Vec<T>> {
        let mut grouped: Vec<Vec<T>> = Vec::new();
        for (node, level) in self.levels() {
            if grouped.len() <= level {
                grouped.resize_with(level + 1, Vec::new);
            }
            grouped[level].push(node);
        }
        grouped
    }

    /// Number of levels (0 for an empty graph).
    pub fn depth(&self) -> usize {
        self.levels()
            .values()
            .max()
            .map(|deepest| deepest + 1)
            .unwrap_or(0)
    }

    /// Sub-graph induced by `nodes` and everything reachable from them.
    pub fn subtree<'a, I>(&self, nodes: I) -> Dag<T>
    where
        I: IntoIterator<Item = &'a T>,
        T: 'a,
    {
        let mut keep = BTreeSet::new();
        for node in nodes {
            if self.contains(node) {
                keep.insert(node.clone());
                keep.extend(self.reachable(node));
            }
        }
        let mut sub = Dag::new();
        for node in &keep {
            sub.add_node(node.clone());
            for child in self.successors(node) {
                if keep.contains(&child) {
                    sub.add_edge(node.clone(), child);
                }
            }
        }
        sub
    }
}
