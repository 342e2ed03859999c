use crate::analyzer::graph_metrics::GraphMetrics;
use crate::analyzer::report::{format_cost, format_latency};
use crate::trace::call::{NodeType, OverlapType};
use crate::trace::graph::WorkflowGraph;
use petgraph::graph::NodeIndex;
use petgraph::visit::EdgeRef;

const DEAD_FILL: &str = "#ef4444";
const CRITICAL_FILL: &str = "#f59e0b";
const OUTPUT_FILL: &str = "#3b82f6";
const NORMAL_FILL: &str = "#64748b";

/// Call ids are arbitrary strings, so diagrams use positional node names.
fn node_name(idx: NodeIndex) -> String {
    format!("n{}", idx.index())
}

fn escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "'")
}

fn node_label(graph: &WorkflowGraph, idx: NodeIndex) -> String {
    let call = &graph.graph[idx];
    format!(
        "{}\\n{}\\n{} · {}",
        escape(&call.id),
        escape(&call.model),
        format_latency(call.latency_ms),
        format_cost(call.cost)
    )
}

fn fill_for(graph: &WorkflowGraph, metrics: &GraphMetrics, idx: NodeIndex) -> &'static str {
    let id = &graph.graph[idx].id;
    if metrics.intended_output.as_deref() == Some(id.as_str()) {
        return OUTPUT_FILL;
    }
    match metrics.node_type(id) {
        NodeType::Dead => DEAD_FILL,
        NodeType::Critical => CRITICAL_FILL,
        NodeType::Normal => NORMAL_FILL,
    }
}

/// Generate a Mermaid flowchart of a workflow graph.
///
/// Inferred edges are labelled with their overlap score; declared parent
/// edges are dotted.
pub fn to_mermaid(graph: &WorkflowGraph, metrics: &GraphMetrics) -> String {
    let mut lines = vec!["graph LR".to_string()];

    for idx in graph.graph.node_indices() {
        lines.push(format!("    {}[\"{}\"]", node_name(idx), node_label(graph, idx)));
    }

    for edge in graph.graph.edge_references() {
        let (from, to) = (node_name(edge.source()), node_name(edge.target()));
        let weight = edge.weight();
        match weight.overlap_type {
            OverlapType::None => lines.push(format!("    {} -.-> {}", from, to)),
            _ => lines.push(format!("    {} -->|{:.2}| {}", from, weight.overlap_score, to)),
        }
    }

    for idx in graph.graph.node_indices() {
        lines.push(format!(
            "    style {} fill:{},color:#fff",
            node_name(idx),
            fill_for(graph, metrics, idx)
        ));
    }

    lines.join("\n")
}

/// Generate a DOT (Graphviz) representation of a workflow graph.
pub fn to_dot(graph: &WorkflowGraph, metrics: &GraphMetrics) -> String {
    let mut lines = vec![
        format!("digraph \"{}\" {{", escape(&graph.workflow_id)),
        "    rankdir=LR;".to_string(),
        "    node [shape=box, style=\"rounded,filled\", fontname=\"Helvetica\", fontcolor=\"#ffffff\"];".to_string(),
        "    edge [color=\"#666666\"];".to_string(),
        String::new(),
    ];

    for idx in graph.graph.node_indices() {
        let mut attrs = format!(
            "label=\"{}\", fillcolor=\"{}\"",
            node_label(graph, idx),
            fill_for(graph, metrics, idx)
        );
        if metrics.node_type(&graph.graph[idx].id) == NodeType::Critical {
            attrs.push_str(", penwidth=3");
        }
        lines.push(format!("    {} [{}];", node_name(idx), attrs));
    }

    lines.push(String::new());

    for edge in graph.graph.edge_references() {
        let weight = edge.weight();
        let attrs = match weight.overlap_type {
            OverlapType::None => "style=dashed".to_string(),
            _ => format!("label=\"{:.2}\"", weight.overlap_score),
        };
        lines.push(format!(
            "    {} -> {} [{}];",
            node_name(edge.source()),
            node_name(edge.target()),
            attrs
        ));
    }

    lines.push("}".to_string());
    lines.join("\n")
}
