use crate::pricing::round_to;
use crate::trace::graph::WorkflowGraph;
use petgraph::graph::NodeIndex;
use petgraph::visit::{Bfs, Reversed};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// How the workflow's final answer is chosen among its calls.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IntendedOutputPolicy {
    /// The most recently created leaf.
    #[default]
    LatestLeaf,
    /// The leaf with the most backward-reachable ancestors, ties to the latest.
    WidestLeaf,
    /// A named call. Falls back to `LatestLeaf` when the id is not in the graph.
    Explicit(String),
}

/// Result of walking backwards from the intended output.
#[derive(Debug, Clone, Default)]
pub struct DeadBranchAnalysis {
    pub intended_output: Option<NodeIndex>,
    pub alive: HashSet<NodeIndex>,
    /// Dead calls in graph insertion order.
    pub dead: Vec<NodeIndex>,
    pub dead_cost: f64,
}

impl DeadBranchAnalysis {
    pub fn is_dead(&self, idx: NodeIndex) -> bool {
        !self.alive.contains(&idx)
    }
}

/// Pick the call treated as the workflow's final output.
///
/// Returns `None` when the graph has no leaves, which only happens when
/// every call sits on or feeds into a cycle.
pub fn select_intended_output(graph: &WorkflowGraph, policy: &IntendedOutputPolicy) -> Option<NodeIndex> {
    let leaves = graph.leaf_calls();

    match policy {
        IntendedOutputPolicy::LatestLeaf => latest(graph, &leaves),
        IntendedOutputPolicy::WidestLeaf => leaves
            .iter()
            .copied()
            .max_by_key(|&idx| (ancestors(graph, idx).len(), graph.graph[idx].created_at, idx)),
        IntendedOutputPolicy::Explicit(id) => match graph.node_map.get(id) {
            Some(&idx) => Some(idx),
            None => {
                tracing::debug!(call = %id, "explicit intended output not in workflow, using latest leaf");
                latest(graph, &leaves)
            }
        },
    }
}

fn latest(graph: &WorkflowGraph, leaves: &[NodeIndex]) -> Option<NodeIndex> {
    // Equal timestamps resolve to the later-inserted call.
    leaves
        .iter()
        .copied()
        .max_by_key(|&idx| (graph.graph[idx].created_at, idx))
}

/// Every call that transitively feeds `target`, including `target` itself.
fn ancestors(graph: &WorkflowGraph, target: NodeIndex) -> HashSet<NodeIndex> {
    let reversed = Reversed(&graph.graph);
    let mut bfs = Bfs::new(reversed, target);
    let mut seen = HashSet::new();
    while let Some(idx) = bfs.next(reversed) {
        seen.insert(idx);
    }
    seen
}

/// Classify calls as alive (their output flows into the intended output) or dead.
///
/// With no intended output nothing is marked dead.
pub fn find_dead_calls(graph: &WorkflowGraph, intended_output: Option<NodeIndex>) -> DeadBranchAnalysis {
    let Some(target) = intended_output else {
        return DeadBranchAnalysis {
            intended_output: None,
            alive: graph.graph.node_indices().collect(),
            dead: Vec::new(),
            dead_cost: 0.0,
        };
    };

    let alive = ancestors(graph, target);
    let dead: Vec<NodeIndex> = graph
        .graph
        .node_indices()
        .filter(|idx| !alive.contains(idx))
        .collect();
    let dead_cost = round_to(dead.iter().map(|&idx| graph.graph[idx].cost).sum(), 6);

    DeadBranchAnalysis {
        intended_output: Some(target),
        alive,
        dead,
        dead_cost,
    }
}
