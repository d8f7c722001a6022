//! Condition dependency graph.
//!
//! Conditional mods read attributes in their conditions and write
//! attributes when active. If mod B's condition reads an attribute that
//! mod A writes, B depends on A and A is checked first. The graph provides
//! that order and reports loops, which can only be settled by the bounded
//! verification passes in the aggregator.

use crate::error::BuildError;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{HashMap, HashSet};

/// A directed graph over conditional mods, keyed by their position in the
/// aggregator's conditional list.
///
/// # Examples
///
/// ```rust
/// use buildscore::graph::ConditionGraph;
///
/// let mut graph = ConditionGraph::new();
/// graph.add_node(0, "A");
/// graph.add_node(1, "B");
/// // B reads what A writes
/// graph.add_edge(1, 0);
///
/// assert_eq!(graph.topological_order().unwrap(), vec![0, 1]);
/// ```
#[derive(Debug, Default)]
pub struct ConditionGraph {
    graph: DiGraph<usize, ()>,
    node_map: HashMap<usize, NodeIndex>,
    labels: HashMap<usize, String>,
}

impl ConditionGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node if it doesn't exist; returns its index either way.
    pub fn add_node(&mut self, key: usize, label: &str) -> NodeIndex {
        if let Some(&idx) = self.node_map.get(&key) {
            return idx;
        }
        let idx = self.graph.add_node(key);
        self.node_map.insert(key, idx);
        self.labels.insert(key, label.to_string());
        idx
    }

    /// `from` depends on `to`: `to` must be checked before `from`.
    ///
    /// Unknown keys are added with their key as label.
    pub fn add_edge(&mut self, from: usize, to: usize) {
        let from_idx = self.add_node(from, &from.to_string());
        let to_idx = self.add_node(to, &to.to_string());
        self.graph.update_edge(to_idx, from_idx, ());
    }

    pub fn contains_node(&self, key: usize) -> bool {
        self.node_map.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Find a dependency loop.
    ///
    /// The reported path lists mod labels and repeats the first at the end.
    pub fn detect_cycles(&self) -> Result<(), BuildError> {
        let mut visited = HashSet::new();
        let mut on_stack = HashSet::new();

        for node in self.graph.node_indices() {
            if !visited.contains(&node) {
                let mut path = Vec::new();
                if let Some(cycle) = self.dfs_cycle(node, &mut visited, &mut on_stack, &mut path) {
                    return Err(BuildError::ConditionCycle { path: cycle });
                }
            }
        }
        Ok(())
    }

    fn dfs_cycle(
        &self,
        node: NodeIndex,
        visited: &mut HashSet<NodeIndex>,
        on_stack: &mut HashSet<NodeIndex>,
        path: &mut Vec<NodeIndex>,
    ) -> Option<Vec<String>> {
        visited.insert(node);
        on_stack.insert(node);
        path.push(node);

        for next in self
            .graph
            .neighbors_directed(node, petgraph::Direction::Outgoing)
        {
            if !visited.contains(&next) {
                if let Some(cycle) = self.dfs_cycle(next, visited, on_stack, path) {
                    return Some(cycle);
                }
            } else if on_stack.contains(&next) {
                let start = path.iter().position(|n| *n == next).unwrap_or(0);
                let mut cycle: Vec<String> = path[start..].iter().map(|n| self.label(*n)).collect();
                cycle.push(self.label(next));
                return Some(cycle);
            }
        }

        on_stack.remove(&node);
        path.pop();
        None
    }

    fn label(&self, node: NodeIndex) -> String {
        let key = self.graph[node];
        self.labels
            .get(&key)
            .cloned()
            .unwrap_or_else(|| key.to_string())
    }

    /// Keys ordered so that every dependency precedes its dependents.
    pub fn topological_order(&self) -> Result<Vec<usize>, BuildError> {
        self.detect_cycles()?;
        toposort(&self.graph, None)
            .map(|order| order.into_iter().map(|idx| self.graph[idx]).collect())
            .map_err(|cycle| BuildError::ConditionCycle {
                path: vec![self.label(cycle.node_id())],
            })
    }

    /// Topological order when acyclic, insertion order otherwise.
    pub fn check_order(&self) -> (Vec<usize>, Option<BuildError>) {
        match self.topological_order() {
            Ok(order) => (order, None),
            Err(err) => (
                self.graph.node_indices().map(|idx| self.graph[idx]).collect(),
                Some(err),
            ),
        }
    }
}
