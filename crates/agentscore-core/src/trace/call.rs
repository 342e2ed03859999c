use crate::pricing::PricingTable;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Classification written back onto each call by graph recomputation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    #[default]
    Normal,
    Dead,
    Critical,
}

/// How an edge's overlap was established.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlapType {
    /// The producer's full response appears verbatim in the consumer's prompt.
    Exact,
    /// Several fixed-size chunks of the producer's response appear in the prompt.
    Partial,
    /// Declared relationship with no measured text overlap.
    #[default]
    None,
}

/// A raw call record as it arrives from an SDK or a trace file.
///
/// Every field except the identifiers is optional; [`CallRecord::finalize`]
/// fills the gaps. Both camelCase and the SDK's snake_case keys are accepted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRecord {
    #[serde(alias = "run_id")]
    pub id: String,
    /// May be left empty inside a trace file; the loader fills it in.
    #[serde(default, alias = "workflow_id")]
    pub workflow_id: String,
    #[serde(default, alias = "parent_run_id", skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default, alias = "event_type", skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    #[serde(default)]
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
    #[serde(default, alias = "tokens_in")]
    pub tokens_in: u64,
    #[serde(default, alias = "tokens_out")]
    pub tokens_out: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
    #[serde(default, alias = "latency_ms", skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(default, alias = "created_at", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl CallRecord {
    pub fn new(id: impl Into<String>, workflow_id: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            workflow_id: workflow_id.into(),
            parent_id: None,
            event_type: Some("llm_call".to_string()),
            model: model.into(),
            prompt: None,
            response: None,
            tokens_in: 0,
            tokens_out: 0,
            cost: None,
            latency_ms: None,
            created_at: None,
        }
    }

    /// Turn the record into an immutable [`Call`].
    ///
    /// A missing cost is priced from the model and token counts. A supplied
    /// cost of zero with non-zero tokens is treated as missing, since SDKs
    /// send `0.0` and leave pricing to the backend.
    pub fn finalize(self, pricing: &PricingTable) -> Call {
        let has_tokens = self.tokens_in > 0 || self.tokens_out > 0;
        let cost = match self.cost {
            Some(cost) if cost > 0.0 || !has_tokens => cost.max(0.0),
            _ => pricing.cost(&self.model, self.tokens_in, self.tokens_out),
        };

        Call {
            id: self.id,
            workflow_id: self.workflow_id,
            parent_id: self.parent_id,
            model: self.model,
            prompt: self.prompt,
            response: self.response,
            tokens_in: self.tokens_in,
            tokens_out: self.tokens_out,
            cost,
            latency_ms: self.latency_ms.unwrap_or(0),
            created_at: self.created_at.unwrap_or_else(Utc::now),
            node_type: NodeType::Normal,
        }
    }
}

/// One recorded model invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Call {
    #[serde(alias = "run_id")]
    pub id: String,
    #[serde(alias = "workflow_id")]
    pub workflow_id: String,
    #[serde(default, alias = "parent_run_id")]
    pub parent_id: Option<String>,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
    #[serde(default, alias = "tokens_in")]
    pub tokens_in: u64,
    #[serde(default, alias = "tokens_out")]
    pub tokens_out: u64,
    #[serde(default)]
    pub cost: f64,
    #[serde(default, alias = "latency_ms")]
    pub latency_ms: u64,
    #[serde(alias = "created_at")]
    pub created_at: DateTime<Utc>,
    #[serde(default, alias = "node_type")]
    pub node_type: NodeType,
}

impl Call {
    pub fn total_tokens(&self) -> u64 {
        self.tokens_in + self.tokens_out
    }

    /// The prompt flattened to plain text.
    pub fn prompt_text(&self) -> String {
        self.prompt.as_ref().map(flatten_text).unwrap_or_default()
    }

    /// The response flattened to plain text.
    pub fn response_text(&self) -> String {
        self.response.as_ref().map(flatten_text).unwrap_or_default()
    }
}

/// Flatten a prompt/response payload into text.
///
/// Strings pass through; message lists (`[{type, content}, ...]`) join their
/// contents line by line; anything else is rendered as compact JSON.
pub fn flatten_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(|item| match item.get("content") {
                Some(content) => flatten_text(content),
                None => flatten_text(item),
            })
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("\n"),
        Value::Object(map) => match map.get("content").or_else(|| map.get("text")) {
            Some(inner) => flatten_text(inner),
            None => value.to_string(),
        },
        other => other.to_string(),
    }
}

/// A directed producer -> consumer relationship between two calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    #[serde(default, alias = "workflow_id")]
    pub workflow_id: String,
    #[serde(alias = "source_id")]
    pub source_id: String,
    #[serde(alias = "target_id")]
    pub target_id: String,
    #[serde(default, alias = "overlap_score")]
    pub overlap_score: f64,
    #[serde(default, alias = "overlap_type")]
    pub overlap_type: OverlapType,
}

impl Edge {
    /// An explicitly declared parent relationship.
    pub fn declared(
        workflow_id: impl Into<String>,
        parent_id: impl Into<String>,
        child_id: impl Into<String>,
    ) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            source_id: parent_id.into(),
            target_id: child_id.into(),
            overlap_score: 0.0,
            overlap_type: OverlapType::None,
        }
    }
}

/// Workflow-level aggregates derived by graph recomputation.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowMetrics {
    pub dead_branch_cost: f64,
    pub critical_path_latency_ms: u64,
    pub information_efficiency: f64,
    pub graph_computed: bool,
}

/// All calls and edges sharing one workflow identifier.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub calls: Vec<Call>,
    #[serde(default)]
    pub edges: Vec<Edge>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<WorkflowMetrics>,
}

impl Workflow {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn total_calls(&self) -> usize {
        self.calls.len()
    }

    pub fn total_cost(&self) -> f64 {
        self.calls.iter().map(|c| c.cost).sum()
    }

    pub fn get_call(&self, id: &str) -> Option<&Call> {
        self.calls.iter().find(|c| c.id == id)
    }

    pub fn chronological_calls(&self) -> Vec<&Call> {
        chronological(&self.calls)
    }
}

/// Calls ordered by creation time, ties kept in arrival order.
pub fn chronological(calls: &[Call]) -> Vec<&Call> {
    let mut ordered: Vec<&Call> = calls.iter().collect();
    ordered.sort_by_key(|c| c.created_at);
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_finalize_prices_missing_cost() {
        let mut record = CallRecord::new("a", "wf", "gpt-4");
        record.tokens_in = 1000;
        record.tokens_out = 1000;
        let call = record.finalize(&PricingTable::builtin());
        assert_eq!(call.cost, 0.09);
        assert_eq!(call.latency_ms, 0);
        assert_eq!(call.node_type, NodeType::Normal);
    }

    #[test]
    fn test_finalize_keeps_supplied_cost() {
        let mut record = CallRecord::new("a", "wf", "gpt-4");
        record.tokens_in = 1000;
        record.cost = Some(0.5);
        let call = record.finalize(&PricingTable::builtin());
        assert_eq!(call.cost, 0.5);
    }

    #[test]
    fn test_finalize_reprices_zero_cost_with_tokens() {
        let mut record = CallRecord::new("a", "wf", "gpt-4");
        record.tokens_in = 1000;
        record.tokens_out = 1000;
        record.cost = Some(0.0);
        let call = record.finalize(&PricingTable::builtin());
        assert_eq!(call.cost, 0.09);
    }

    #[test]
    fn test_record_accepts_sdk_snake_case() {
        let record: CallRecord = serde_json::from_value(json!({
            "run_id": "r1",
            "workflow_id": "wf",
            "parent_run_id": "p0",
            "event_type": "llm_call",
            "model": "gemini-2.5-flash",
            "prompt": [{"type": "human", "content": "hello"}],
            "response": "world",
            "tokens_in": 12,
            "tokens_out": 3,
            "cost": 0.0,
            "latency_ms": 420
        }))
        .unwrap();
        assert_eq!(record.id, "r1");
        assert_eq!(record.parent_id.as_deref(), Some("p0"));
        assert_eq!(record.latency_ms, Some(420));

        let call = record.finalize(&PricingTable::builtin());
        assert_eq!(call.prompt_text(), "hello");
        assert_eq!(call.response_text(), "world");
        assert!(call.cost > 0.0);
    }

    #[test]
    fn test_flatten_message_list() {
        let prompt = json!([
            {"type": "system", "content": "You are terse."},
            {"type": "human", "content": "Summarize this."}
        ]);
        assert_eq!(flatten_text(&prompt), "You are terse.\nSummarize this.");
        assert_eq!(flatten_text(&json!({"text": "hi"})), "hi");
        assert_eq!(flatten_text(&Value::Null), "");
    }

    #[test]
    fn test_node_type_wire_format() {
        assert_eq!(serde_json::to_string(&NodeType::Critical).unwrap(), "\"critical\"");
        let edge: Edge = serde_json::from_value(json!({
            "workflow_id": "wf",
            "source_id": "a",
            "target_id": "b",
            "overlap_score": 1.0,
            "overlap_type": "exact"
        }))
        .unwrap();
        assert_eq!(edge.overlap_type, OverlapType::Exact);
    }
}
