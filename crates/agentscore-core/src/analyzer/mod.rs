pub mod critical_path;
pub mod dead_branch;
pub mod graph_metrics;
pub mod report;

use crate::config::AgentScoreConfig;
use crate::scoring::findings::Findings;
use crate::scoring::EfficiencyScorer;
use crate::trace::call::Workflow;
use crate::trace::graph::WorkflowGraph;
use graph_metrics::compute_metrics;
use report::{CallSummary, WorkflowReport};

/// Run graph analysis, and scoring when findings are supplied, over one workflow.
pub fn analyze(workflow: &Workflow, findings: Option<&Findings>, config: &AgentScoreConfig) -> WorkflowReport {
    let graph = WorkflowGraph::from_workflow(workflow);
    let metrics = compute_metrics(&graph, &config.graph.intended_output);

    let calls = workflow
        .chronological_calls()
        .into_iter()
        .map(|call| CallSummary {
            id: call.id.clone(),
            model: call.model.clone(),
            tokens_in: call.tokens_in,
            tokens_out: call.tokens_out,
            cost: call.cost,
            latency_ms: call.latency_ms,
            node_type: metrics.node_type(&call.id),
        })
        .collect();

    let efficiency = findings.map(|f| EfficiencyScorer::from_config(config).score(f, &workflow.calls));

    WorkflowReport {
        workflow_id: workflow.id.clone(),
        name: workflow.name.clone(),
        call_count: graph.call_count(),
        edge_count: graph.edge_count(),
        total_cost: crate::pricing::round_to(graph.total_cost(), 6),
        total_tokens: graph.total_tokens(),
        graph: metrics,
        calls,
        efficiency,
    }
}
