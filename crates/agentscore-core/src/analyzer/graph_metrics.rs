use crate::analyzer::critical_path::{find_critical_path, CriticalPath};
use crate::analyzer::dead_branch::{find_dead_calls, select_intended_output, DeadBranchAnalysis, IntendedOutputPolicy};
use crate::pricing::round_to;
use crate::trace::call::{NodeType, Workflow, WorkflowMetrics};
use crate::trace::graph::WorkflowGraph;
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Everything graph recomputation derives for one workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphMetrics {
    pub intended_output: Option<String>,
    pub dead_calls: Vec<String>,
    pub critical_path: Vec<String>,
    pub dead_branch_cost: f64,
    pub critical_path_latency_ms: u64,
    pub information_efficiency: f64,
    pub cycle_detected: bool,
    /// Reporting tag per call id; critical wins over dead.
    pub classifications: BTreeMap<String, NodeType>,
}

impl GraphMetrics {
    /// Workflow-level aggregate to persist back.
    pub fn workflow_metrics(&self) -> WorkflowMetrics {
        WorkflowMetrics {
            dead_branch_cost: self.dead_branch_cost,
            critical_path_latency_ms: self.critical_path_latency_ms,
            information_efficiency: self.information_efficiency,
            graph_computed: true,
        }
    }

    pub fn node_type(&self, call_id: &str) -> NodeType {
        self.classifications.get(call_id).copied().unwrap_or_default()
    }

    /// Write node types and the aggregate onto a workflow.
    pub fn apply_to(&self, workflow: &mut Workflow) {
        for call in &mut workflow.calls {
            call.node_type = self.node_type(&call.id);
        }
        workflow.metrics = Some(self.workflow_metrics());
    }
}

/// Proxy for how much produced information reached the final output:
/// `100 * sum(overlap score of edges into alive calls) / call count`.
///
/// Defined as 0 for workflows without tokens.
pub fn information_efficiency(graph: &WorkflowGraph, dead: &DeadBranchAnalysis) -> f64 {
    let call_count = graph.call_count();
    if call_count == 0 || graph.total_tokens() == 0 {
        return 0.0;
    }

    let useful: f64 = graph
        .graph
        .edge_references()
        .filter(|edge| dead.alive.contains(&edge.target()))
        .map(|edge| edge.weight().overlap_score)
        .sum();

    round_to(100.0 * useful / call_count as f64, 2)
}

/// Recompute dead branches, the critical path and information efficiency.
///
/// Pure over the graph snapshot: running it again on the same calls and
/// edges gives the same result.
pub fn compute_metrics(graph: &WorkflowGraph, policy: &IntendedOutputPolicy) -> GraphMetrics {
    let intended = select_intended_output(graph, policy);
    let dead = find_dead_calls(graph, intended);
    let critical: CriticalPath = find_critical_path(graph);
    let efficiency = information_efficiency(graph, &dead);

    let g = &graph.graph;
    let mut classifications: BTreeMap<String, NodeType> = g
        .node_indices()
        .map(|idx| {
            let tag = if dead.is_dead(idx) { NodeType::Dead } else { NodeType::Normal };
            (g[idx].id.clone(), tag)
        })
        .collect();
    for &idx in &critical.path {
        classifications.insert(g[idx].id.clone(), NodeType::Critical);
    }

    tracing::debug!(
        workflow = %graph.workflow_id,
        calls = graph.call_count(),
        dead = dead.dead.len(),
        critical_latency_ms = critical.latency_ms,
        "graph metrics computed"
    );

    GraphMetrics {
        intended_output: dead.intended_output.map(|idx| g[idx].id.clone()),
        dead_calls: dead.dead.iter().map(|&idx| g[idx].id.clone()).collect(),
        critical_path: critical.path.iter().map(|&idx| g[idx].id.clone()).collect(),
        dead_branch_cost: dead.dead_cost,
        critical_path_latency_ms: critical.latency_ms,
        information_efficiency: efficiency,
        cycle_detected: critical.cycle_detected,
        classifications,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::call::{Call, Edge, OverlapType};
    use chrono::{TimeZone, Utc};

    fn call(id: &str, at: i64, latency_ms: u64, cost: f64) -> Call {
        Call {
            id: id.to_string(),
            workflow_id: "wf".to_string(),
            parent_id: None,
            model: "gpt-4o-mini".to_string(),
            prompt: None,
            response: None,
            tokens_in: 200,
            tokens_out: 100,
            cost,
            latency_ms,
            created_at: Utc.timestamp_opt(1_700_000_000 + at, 0).unwrap(),
            node_type: NodeType::Normal,
        }
    }

    fn exact(from: &str, to: &str) -> Edge {
        Edge {
            workflow_id: "wf".to_string(),
            source_id: from.to_string(),
            target_id: to.to_string(),
            overlap_score: 1.0,
            overlap_type: OverlapType::Exact,
        }
    }

    fn scenario() -> WorkflowGraph {
        let calls = vec![
            call("a", 0, 100, 0.01),
            call("b", 1, 200, 0.02),
            call("d", 2, 5000, 0.005),
            call("c", 3, 300, 0.03),
        ];
        WorkflowGraph::build("wf", &calls, &[exact("a", "b"), exact("b", "c")])
    }

    #[test]
    fn test_chain_with_disconnected_call() {
        let metrics = compute_metrics(&scenario(), &IntendedOutputPolicy::LatestLeaf);
        assert_eq!(metrics.intended_output.as_deref(), Some("c"));
        assert_eq!(metrics.dead_calls, vec!["d"]);
        assert_eq!(metrics.dead_branch_cost, 0.005);
        // 2 edges of score 1.0 into alive calls over 4 calls
        assert_eq!(metrics.information_efficiency, 50.0);
    }

    #[test]
    fn test_critical_takes_precedence_over_dead() {
        // d is dead but also the slowest call, so it is the critical path.
        let metrics = compute_metrics(&scenario(), &IntendedOutputPolicy::LatestLeaf);
        assert_eq!(metrics.critical_path, vec!["d"]);
        assert_eq!(metrics.critical_path_latency_ms, 5000);
        assert_eq!(metrics.node_type("d"), NodeType::Critical);
        assert_eq!(metrics.node_type("a"), NodeType::Normal);
    }

    #[test]
    fn test_zero_tokens_gives_zero_efficiency() {
        let mut a = call("a", 0, 10, 0.0);
        let mut b = call("b", 1, 10, 0.0);
        for c in [&mut a, &mut b] {
            c.tokens_in = 0;
            c.tokens_out = 0;
        }
        let graph = WorkflowGraph::build("wf", &[a, b], &[exact("a", "b")]);
        assert_eq!(compute_metrics(&graph, &IntendedOutputPolicy::LatestLeaf).information_efficiency, 0.0);
    }

    #[test]
    fn test_recompute_is_idempotent() {
        let graph = scenario();
        let first = compute_metrics(&graph, &IntendedOutputPolicy::LatestLeaf);
        let second = compute_metrics(&graph, &IntendedOutputPolicy::LatestLeaf);
        assert_eq!(first, second);
    }

    #[test]
    fn test_apply_to_workflow() {
        let graph = scenario();
        let mut workflow = Workflow::new("wf");
        workflow.calls = graph.graph.node_weights().cloned().collect();

        let metrics = compute_metrics(&graph, &IntendedOutputPolicy::LatestLeaf);
        metrics.apply_to(&mut workflow);

        let aggregate = workflow.metrics.clone().unwrap();
        assert!(aggregate.graph_computed);
        assert_eq!(aggregate.dead_branch_cost, 0.005);
        assert_eq!(workflow.get_call("d").unwrap().node_type, NodeType::Critical);
        assert_eq!(workflow.get_call("b").unwrap().node_type, NodeType::Normal);
    }

    #[test]
    fn test_empty_graph() {
        let metrics = compute_metrics(&WorkflowGraph::new("wf"), &IntendedOutputPolicy::LatestLeaf);
        assert!(metrics.intended_output.is_none());
        assert!(metrics.classifications.is_empty());
        assert_eq!(metrics.critical_path_latency_ms, 0);
        assert_eq!(metrics.information_efficiency, 0.0);
    }
}
