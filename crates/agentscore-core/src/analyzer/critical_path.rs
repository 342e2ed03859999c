use crate::trace::graph::WorkflowGraph;
use petgraph::graph::NodeIndex;
use petgraph::visit::EdgeRef;

/// The highest-latency chain of calls in a workflow.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CriticalPath {
    /// Calls from the first producer to the last consumer.
    pub path: Vec<NodeIndex>,
    pub latency_ms: u64,
    /// The graph had a cycle and `path` is only the single slowest call.
    pub cycle_detected: bool,
}

/// Find the critical path through the workflow graph.
///
/// Each call's own latency is its node weight. The longest cumulative
/// latency ending at every call is found by relaxing
/// `dist[v] = latency[v] + max(dist[src])` over all edges until nothing
/// changes, so edges need not be in topological order. Graphs with a cycle
/// have no longest path; they report the slowest single call instead.
pub fn find_critical_path(graph: &WorkflowGraph) -> CriticalPath {
    let g = &graph.graph;
    let node_count = g.node_count();
    if node_count == 0 {
        return CriticalPath::default();
    }

    if graph.is_cyclic() {
        tracing::warn!(
            workflow = %graph.workflow_id,
            "cycle in workflow graph, critical path reduced to slowest call"
        );
        let slowest = first_max(g.node_indices().map(|idx| (idx, g[idx].latency_ms)));
        return CriticalPath {
            path: slowest.into_iter().collect(),
            latency_ms: slowest.map(|idx| g[idx].latency_ms).unwrap_or(0),
            cycle_detected: true,
        };
    }

    let mut dist: Vec<u64> = g.node_indices().map(|idx| g[idx].latency_ms).collect();
    let mut parent: Vec<Option<NodeIndex>> = vec![None; node_count];

    for _ in 0..node_count {
        let mut changed = false;
        for edge in g.edge_references() {
            let (src, tgt) = (edge.source(), edge.target());
            let candidate = dist[src.index()].saturating_add(g[tgt].latency_ms);
            if candidate > dist[tgt.index()] {
                dist[tgt.index()] = candidate;
                parent[tgt.index()] = Some(src);
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }

    let Some(end) = first_max(g.node_indices().map(|idx| (idx, dist[idx.index()]))) else {
        return CriticalPath::default();
    };

    let mut path = vec![end];
    let mut current = end;
    while let Some(pred) = parent[current.index()] {
        if path.len() > node_count {
            break;
        }
        path.push(pred);
        current = pred;
    }
    path.reverse();

    CriticalPath {
        path,
        latency_ms: dist[end.index()],
        cycle_detected: false,
    }
}

/// First node carrying the maximum value.
fn first_max(values: impl Iterator<Item = (NodeIndex, u64)>) -> Option<NodeIndex> {
    let mut best: Option<(NodeIndex, u64)> = None;
    for (idx, value) in values {
        if best.map_or(true, |(_, b)| value > b) {
            best = Some((idx, value));
        }
    }
    best.map(|(idx, _)| idx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::call::{Call, Edge, NodeType};
    use chrono::Utc;

    fn call(id: &str, latency_ms: u64) -> Call {
        Call {
            id: id.to_string(),
            workflow_id: "wf".to_string(),
            parent_id: None,
            model: "gpt-4o".to_string(),
            prompt: None,
            response: None,
            tokens_in: 0,
            tokens_out: 0,
            cost: 0.0,
            latency_ms,
            created_at: Utc::now(),
            node_type: NodeType::Normal,
        }
    }

    fn path_ids(graph: &WorkflowGraph, cp: &CriticalPath) -> Vec<String> {
        cp.path.iter().map(|&i| graph.graph[i].id.clone()).collect()
    }

    #[test]
    fn test_critical_path_linear() {
        let calls = vec![call("a", 100), call("b", 200), call("c", 300)];
        let edges = vec![Edge::declared("wf", "a", "b"), Edge::declared("wf", "b", "c")];
        let graph = WorkflowGraph::build("wf", &calls, &edges);

        let cp = find_critical_path(&graph);
        assert_eq!(path_ids(&graph, &cp), vec!["a", "b", "c"]);
        assert_eq!(cp.latency_ms, 600);
        assert!(!cp.cycle_detected);
    }

    #[test]
    fn test_single_call_latency() {
        let graph = WorkflowGraph::build("wf", &[call("solo", 750)], &[]);
        let cp = find_critical_path(&graph);
        assert_eq!(cp.latency_ms, 750);
        assert_eq!(path_ids(&graph, &cp), vec!["solo"]);
    }

    #[test]
    fn test_edges_out_of_topological_order() {
        // Edges listed consumer-first; relaxation must still converge.
        let calls = vec![call("a", 10), call("b", 20), call("c", 30), call("d", 40)];
        let edges = vec![
            Edge::declared("wf", "c", "d"),
            Edge::declared("wf", "b", "c"),
            Edge::declared("wf", "a", "b"),
        ];
        let graph = WorkflowGraph::build("wf", &calls, &edges);
        let cp = find_critical_path(&graph);
        assert_eq!(cp.latency_ms, 100);
        assert_eq!(path_ids(&graph, &cp), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_picks_slower_branch() {
        //   a -> fast -> join
        //   a -> slow -> join
        let calls = vec![call("a", 100), call("fast", 50), call("slow", 900), call("join", 10)];
        let edges = vec![
            Edge::declared("wf", "a", "fast"),
            Edge::declared("wf", "a", "slow"),
            Edge::declared("wf", "fast", "join"),
            Edge::declared("wf", "slow", "join"),
        ];
        let graph = WorkflowGraph::build("wf", &calls, &edges);
        let cp = find_critical_path(&graph);
        assert_eq!(path_ids(&graph, &cp), vec!["a", "slow", "join"]);
        assert_eq!(cp.latency_ms, 1010);
    }

    #[test]
    fn test_disconnected_slow_call_can_dominate() {
        let calls = vec![call("a", 100), call("b", 100), call("lone", 5000)];
        let graph = WorkflowGraph::build("wf", &calls, &[Edge::declared("wf", "a", "b")]);
        let cp = find_critical_path(&graph);
        assert_eq!(path_ids(&graph, &cp), vec!["lone"]);
        assert_eq!(cp.latency_ms, 5000);
    }

    #[test]
    fn test_cycle_falls_back_to_slowest_call() {
        let calls = vec![call("a", 100), call("b", 400), call("c", 50)];
        let edges = vec![
            Edge::declared("wf", "a", "b"),
            Edge::declared("wf", "b", "a"),
            Edge::declared("wf", "b", "c"),
        ];
        let graph = WorkflowGraph::build("wf", &calls, &edges);
        let cp = find_critical_path(&graph);
        assert!(cp.cycle_detected);
        assert_eq!(path_ids(&graph, &cp), vec!["b"]);
        assert_eq!(cp.latency_ms, 400);
    }

    #[test]
    fn test_empty_graph() {
        let graph = WorkflowGraph::new("wf");
        assert_eq!(find_critical_path(&graph), CriticalPath::default());
    }
}
