use crate::analyzer::graph_metrics::GraphMetrics;
use crate::scoring::EfficiencyScore;
use crate::trace::call::NodeType;
use serde::{Deserialize, Serialize};

/// One call as shown in a report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallSummary {
    pub id: String,
    pub model: String,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub cost: f64,
    pub latency_ms: u64,
    pub node_type: NodeType,
}

/// The complete analysis report for a workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowReport {
    pub workflow_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub call_count: usize,
    pub edge_count: usize,
    pub total_cost: f64,
    pub total_tokens: u64,
    pub graph: GraphMetrics,
    /// Calls in chronological order.
    pub calls: Vec<CallSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub efficiency: Option<EfficiencyScore>,
}

impl WorkflowReport {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.workflow_id)
    }

    /// Share of total cost spent on dead calls, in percent.
    pub fn dead_cost_pct(&self) -> f64 {
        if self.total_cost <= 0.0 {
            return 0.0;
        }
        self.graph.dead_branch_cost / self.total_cost * 100.0
    }

    pub fn dead_count(&self) -> usize {
        self.graph.dead_calls.len()
    }

    pub fn critical_count(&self) -> usize {
        self.graph.critical_path.len()
    }
}

/// Format milliseconds into a human-readable latency.
pub fn format_latency(ms: u64) -> String {
    if ms < 1_000 {
        return format!("{}ms", ms);
    }
    let total_secs = (ms as f64 / 1000.0).round() as u64;
    let minutes = total_secs / 60;
    let seconds = total_secs % 60;
    if minutes > 0 {
        format!("{}:{:02}", minutes, seconds)
    } else {
        format!("{:.1}s", ms as f64 / 1000.0)
    }
}

/// Format a dollar amount with precision suited to its size.
pub fn format_cost(cost: f64) -> String {
    if cost == 0.0 {
        "$0".to_string()
    } else if cost.abs() < 0.01 {
        format!("${:.6}", cost)
    } else {
        format!("${:.4}", cost)
    }
}
