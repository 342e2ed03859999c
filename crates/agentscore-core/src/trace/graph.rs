use crate::error::{AgentScoreError, Result};
use crate::trace::call::{Call, Edge, OverlapType, Workflow};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::HashMap;

/// Edge weight in the workflow graph.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CallEdge {
    pub overlap_score: f64,
    pub overlap_type: OverlapType,
}

/// Dependency graph of one workflow's calls.
///
/// Edges point from producer to consumer. Parallel edges between the same
/// pair of calls are allowed; edges are never removed.
#[derive(Debug, Clone)]
pub struct WorkflowGraph {
    pub workflow_id: String,
    pub graph: DiGraph<Call, CallEdge>,
    pub node_map: HashMap<String, NodeIndex>,
}

impl WorkflowGraph {
    pub fn new(workflow_id: impl Into<String>) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            graph: DiGraph::new(),
            node_map: HashMap::new(),
        }
    }

    /// Build the graph for a snapshot of calls and edges.
    ///
    /// Edges are restricted to calls in scope: an edge whose endpoints do not
    /// both resolve to calls of this workflow is dropped.
    pub fn build(workflow_id: &str, calls: &[Call], edges: &[Edge]) -> Self {
        let mut graph = Self::new(workflow_id);

        for call in calls {
            if call.workflow_id != workflow_id {
                tracing::debug!(call = %call.id, workflow = workflow_id, "skipping call from another workflow");
                continue;
            }
            graph.add_call(call.clone());
        }

        for edge in edges {
            if let Err(e) = graph.add_edge(edge) {
                tracing::debug!(
                    source = %edge.source_id,
                    target = %edge.target_id,
                    error = %e,
                    "dropping edge outside graph scope"
                );
            }
        }

        graph
    }

    pub fn from_workflow(workflow: &Workflow) -> Self {
        Self::build(&workflow.id, &workflow.calls, &workflow.edges)
    }

    /// Add a call node, returning its index. A repeated id keeps the first node.
    pub fn add_call(&mut self, call: Call) -> NodeIndex {
        if let Some(&idx) = self.node_map.get(&call.id) {
            tracing::warn!(call = %call.id, "duplicate call id in workflow, keeping first");
            return idx;
        }
        let id = call.id.clone();
        let idx = self.graph.add_node(call);
        self.node_map.insert(id, idx);
        idx
    }

    /// Add a producer -> consumer edge between two calls already in the graph.
    pub fn add_edge(&mut self, edge: &Edge) -> Result<()> {
        if edge.workflow_id != self.workflow_id {
            return Err(AgentScoreError::CrossWorkflowEdge {
                source_id: edge.source_id.clone(),
                target_id: edge.target_id.clone(),
                edge_workflow: edge.workflow_id.clone(),
                workflow: self.workflow_id.clone(),
            });
        }
        let from = *self
            .node_map
            .get(&edge.source_id)
            .ok_or_else(|| AgentScoreError::UnknownCall(edge.source_id.clone()))?;
        let to = *self
            .node_map
            .get(&edge.target_id)
            .ok_or_else(|| AgentScoreError::UnknownCall(edge.target_id.clone()))?;

        self.graph.add_edge(
            from,
            to,
            CallEdge {
                overlap_score: edge.overlap_score.clamp(0.0, 1.0),
                overlap_type: edge.overlap_type,
            },
        );
        Ok(())
    }

    /// Calls nothing depends on (zero outgoing edges).
    pub fn leaf_calls(&self) -> Vec<NodeIndex> {
        self.graph
            .node_indices()
            .filter(|&idx| {
                self.graph
                    .neighbors_directed(idx, Direction::Outgoing)
                    .next()
                    .is_none()
            })
            .collect()
    }

    /// Calls with no producers (zero incoming edges).
    pub fn root_calls(&self) -> Vec<NodeIndex> {
        self.graph
            .node_indices()
            .filter(|&idx| {
                self.graph
                    .neighbors_directed(idx, Direction::Incoming)
                    .next()
                    .is_none()
            })
            .collect()
    }

    pub fn call_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn get_call(&self, id: &str) -> Option<&Call> {
        self.node_map.get(id).map(|idx| &self.graph[*idx])
    }

    pub fn total_cost(&self) -> f64 {
        self.graph.node_weights().map(|c| c.cost).sum()
    }

    pub fn total_tokens(&self) -> u64 {
        self.graph.node_weights().map(Call::total_tokens).sum()
    }

    /// Whether the producer -> consumer relation contains a cycle.
    pub fn is_cyclic(&self) -> bool {
        petgraph::algo::is_cyclic_directed(&self.graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::call::NodeType;
    use chrono::{TimeZone, Utc};

    fn call(id: &str) -> Call {
        Call {
            id: id.to_string(),
            workflow_id: "wf".to_string(),
            parent_id: None,
            model: "gpt-4o-mini".to_string(),
            prompt: None,
            response: None,
            tokens_in: 10,
            tokens_out: 5,
            cost: 0.001,
            latency_ms: 100,
            created_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            node_type: NodeType::Normal,
        }
    }

    fn edge(from: &str, to: &str) -> Edge {
        Edge {
            workflow_id: "wf".to_string(),
            source_id: from.to_string(),
            target_id: to.to_string(),
            overlap_score: 1.0,
            overlap_type: OverlapType::Exact,
        }
    }

    #[test]
    fn test_roots_and_leaves() {
        let calls = vec![call("a"), call("b"), call("c")];
        let graph = WorkflowGraph::build("wf", &calls, &[edge("a", "b"), edge("a", "c")]);

        let roots: Vec<_> = graph.root_calls().iter().map(|&i| graph.graph[i].id.clone()).collect();
        let mut leaves: Vec<_> = graph.leaf_calls().iter().map(|&i| graph.graph[i].id.clone()).collect();
        leaves.sort();
        assert_eq!(roots, vec!["a"]);
        assert_eq!(leaves, vec!["b", "c"]);
        assert_eq!(graph.total_tokens(), 45);
    }

    #[test]
    fn test_out_of_scope_edges_dropped() {
        let calls = vec![call("a"), call("b")];
        let mut foreign = edge("a", "b");
        foreign.workflow_id = "other".to_string();
        let graph = WorkflowGraph::build("wf", &calls, &[edge("a", "ghost"), foreign]);
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn test_add_edge_unknown_call() {
        let mut graph = WorkflowGraph::new("wf");
        graph.add_call(call("a"));
        let err = graph.add_edge(&edge("a", "missing")).unwrap_err();
        assert!(matches!(err, AgentScoreError::UnknownCall(id) if id == "missing"));
    }

    #[test]
    fn test_parallel_edges_allowed() {
        let calls = vec![call("a"), call("b")];
        let graph = WorkflowGraph::build("wf", &calls, &[edge("a", "b"), edge("a", "b")]);
        assert_eq!(graph.edge_count(), 2);
        assert!(!graph.is_cyclic());
    }

    #[test]
    fn test_cycle_detection() {
        let calls = vec![call("a"), call("b")];
        let graph = WorkflowGraph::build("wf", &calls, &[edge("a", "b"), edge("b", "a")]);
        assert!(graph.is_cyclic());
        assert!(graph.leaf_calls().is_empty());
    }

    #[test]
    fn test_duplicate_call_keeps_first() {
        let mut graph = WorkflowGraph::new("wf");
        let first = graph.add_call(call("a"));
        let mut dup = call("a");
        dup.cost = 9.0;
        let second = graph.add_call(dup);
        assert_eq!(first, second);
        assert_eq!(graph.call_count(), 1);
        assert_eq!(graph.get_call("a").unwrap().cost, 0.001);
    }
}
