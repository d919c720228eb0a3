//! Topological analysis of graphs.
//!
//! Provides algorithms for:
//! - Topological sorting (propagation order)
//! - Reachability (cycle prevention)
//! - Upstream closure (readiness gating)

use crate::core::error::{GraphError, GraphResult, NodeId};
use crate::graph::structure::Graph;
use indexmap::IndexMap;
use std::collections::{HashSet, VecDeque};

/// Analyzer for graph topology.
pub struct TopologyAnalyzer<'a> {
    graph: &'a Graph,
}

impl<'a> TopologyAnalyzer<'a> {
    /// Create a new analyzer for the given graph.
    pub fn new(graph: &'a Graph) -> Self {
        Self { graph }
    }

    /// Get the topological sort order (Kahn's algorithm).
    ///
    /// Returns nodes in an order where dependencies come before dependents.
    /// Ties are broken by insertion order, so the result is deterministic.
    pub fn topological_sort(&self) -> GraphResult<Vec<NodeId>> {
        let mut in_degree: IndexMap<NodeId, usize> =
            self.graph.node_ids().map(|id| (id, 0)).collect();

        for node_id in self.graph.node_ids() {
            for successor in self.graph.successors(node_id) {
                if let Some(degree) = in_degree.get_mut(&successor) {
                    *degree += 1;
                }
            }
        }

        // Start with nodes that have no incoming edges
        let mut queue: VecDeque<NodeId> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(&id, _)| id)
            .collect();

        let mut result = Vec::with_capacity(self.graph.node_count());

        while let Some(node) = queue.pop_front() {
            result.push(node);

            for neighbor in self.graph.successors(node) {
                if let Some(degree) = in_degree.get_mut(&neighbor) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(neighbor);
                    }
                }
            }
        }

        // If we haven't visited all nodes, there's a cycle
        if result.len() != self.graph.node_count() {
            let remaining: Vec<NodeId> = in_degree
                .iter()
                .filter(|(_, degree)| **degree > 0)
                .map(|(&id, _)| id)
                .collect();

            return Err(GraphError::CycleDetected { nodes: remaining });
        }

        Ok(result)
    }

    /// Check if the graph has any cycles.
    pub fn has_cycle(&self) -> bool {
        self.topological_sort().is_err()
    }

    /// Whether `to` can be reached from `from` by following links.
    ///
    /// A node always reaches itself.
    pub fn is_reachable(&self, from: NodeId, to: NodeId) -> bool {
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();
        queue.push_back(from);

        while let Some(current) = queue.pop_front() {
            if current == to {
                return true;
            }
            if visited.insert(current) {
                queue.extend(self.graph.successors(current));
            }
        }

        false
    }

    /// All nodes strictly upstream of `node_id`.
    pub fn upstream(&self, node_id: NodeId) -> HashSet<NodeId> {
        self.closure(node_id, |id| self.graph.predecessors(id))
    }

    /// Whether any transitive upstream node is still dirty or computing.
    ///
    /// A node with pending upstream work must not be dispatched yet: it
    /// would run on inputs about to be replaced.
    pub fn has_pending_upstream(&self, node_id: NodeId) -> bool {
        self.upstream(node_id).into_iter().any(|id| {
            self.graph
                .node(id)
                .map(|node| node.state().is_pending())
                .unwrap_or(false)
        })
    }

    fn closure<F>(&self, start: NodeId, next: F) -> HashSet<NodeId>
    where
        F: Fn(NodeId) -> Vec<NodeId>,
    {
        let mut visited = HashSet::new();
        let mut queue: VecDeque<NodeId> = next(start).into();

        while let Some(current) = queue.pop_front() {
            if visited.insert(current) {
                queue.extend(next(current));
            }
        }

        visited
    }
}
