use crate::config::{AgentScoreConfig, DetectorConfig};
use crate::error::AgentScoreError;
use crate::pricing::PricingTable;
use crate::relationship::{RelationshipDetector, ResponseCache};
use crate::trace::call::{chronological, Call, CallRecord, Edge, Workflow};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

/// On-disk shape of a recorded workflow.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TraceFile {
    #[serde(default, alias = "workflow_id", alias = "id")]
    workflow_id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    calls: Vec<CallRecord>,
    #[serde(default)]
    edges: Option<Vec<Edge>>,
}

/// Loads JSON trace files into workflows.
#[derive(Debug, Clone)]
pub struct TraceLoader {
    pricing: PricingTable,
    detector: DetectorConfig,
}

impl Default for TraceLoader {
    fn default() -> Self {
        Self {
            pricing: PricingTable::builtin(),
            detector: DetectorConfig::default(),
        }
    }
}

impl TraceLoader {
    pub fn from_config(config: &AgentScoreConfig) -> Self {
        Self {
            pricing: config.pricing_table(),
            detector: config.detector.clone(),
        }
    }

    /// Parse a trace file into a workflow.
    pub fn parse_file(&self, path: &Path) -> Result<Workflow> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read trace file: {}", path.display()))?;
        self.parse(&content)
            .with_context(|| format!("Invalid trace file: {}", path.display()))
    }

    /// Parse trace JSON into a workflow.
    ///
    /// Edges listed in the file are taken as recorded. When the file has no
    /// `edges` key, calls are replayed in creation order through the
    /// relationship detector and declared parents become edges as well.
    pub fn parse(&self, content: &str) -> Result<Workflow> {
        let trace: TraceFile = serde_json::from_str(content).context("Failed to parse trace JSON")?;

        let workflow_id = match trace.workflow_id.trim() {
            "" => match trace.calls.iter().find(|c| !c.workflow_id.is_empty()) {
                Some(call) => call.workflow_id.clone(),
                None => return Err(AgentScoreError::TraceParse("trace has no workflow id".to_string()).into()),
            },
            id => id.to_string(),
        };

        let mut seen = HashSet::new();
        let mut calls = Vec::with_capacity(trace.calls.len());
        for mut record in trace.calls {
            if record.workflow_id.is_empty() {
                record.workflow_id = workflow_id.clone();
            } else if record.workflow_id != workflow_id {
                tracing::warn!(
                    call = %record.id,
                    workflow = %record.workflow_id,
                    expected = %workflow_id,
                    "call belongs to another workflow, skipping"
                );
                continue;
            }
            if !seen.insert(record.id.clone()) {
                tracing::warn!(call = %record.id, "duplicate call id in trace, keeping the first");
                continue;
            }
            calls.push(record.finalize(&self.pricing));
        }

        let edges = match trace.edges {
            Some(mut edges) => {
                for edge in edges.iter_mut().filter(|e| e.workflow_id.is_empty()) {
                    edge.workflow_id = workflow_id.clone();
                }
                edges
            }
            None => self.infer_edges(&workflow_id, &calls),
        };

        Ok(Workflow {
            id: workflow_id,
            name: trace.name,
            calls,
            edges,
            metrics: None,
        })
    }

    fn infer_edges(&self, workflow_id: &str, calls: &[Call]) -> Vec<Edge> {
        let cache = ResponseCache::with_max_history(self.detector.max_history);
        let detector = RelationshipDetector::from_config(&self.detector);
        let ids: HashSet<&str> = calls.iter().map(|c| c.id.as_str()).collect();

        let mut edges = Vec::new();
        for call in chronological(calls) {
            let mut inferred = detector.detect_and_record(
                &cache,
                workflow_id,
                &call.id,
                &call.prompt_text(),
                &call.response_text(),
            );

            if let Some(parent) = call.parent_id.as_deref() {
                let already = inferred.iter().any(|e| e.source_id == parent);
                if !already && parent != call.id && ids.contains(parent) {
                    inferred.push(Edge::declared(workflow_id, parent, &call.id));
                }
            }
            edges.extend(inferred);
        }

        tracing::debug!(workflow = workflow_id, edges = edges.len(), "inferred trace edges");
        edges
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::call::OverlapType;

    #[test]
    fn test_parse_infers_edges_in_creation_order() {
        // Listed out of order on purpose.
        let json = r#"{
            "workflowId": "wf-1",
            "name": "Trip planner",
            "calls": [
                {"id": "b", "model": "gpt-4o", "prompt": "Expand on: Visit Kyoto", "response": "Temples.",
                 "latencyMs": 200, "createdAt": "2024-05-01T10:00:02Z"},
                {"id": "a", "model": "gpt-4o", "prompt": "Pick a city.", "response": "Visit Kyoto",
                 "latencyMs": 100, "createdAt": "2024-05-01T10:00:00Z"}
            ]
        }"#;

        let workflow = TraceLoader::default().parse(json).unwrap();
        assert_eq!(workflow.id, "wf-1");
        assert_eq!(workflow.name.as_deref(), Some("Trip planner"));
        assert_eq!(workflow.calls.len(), 2);
        assert!(workflow.calls.iter().all(|c| c.workflow_id == "wf-1"));
        assert_eq!(workflow.edges.len(), 1);
        assert_eq!(workflow.edges[0].source_id, "a");
        assert_eq!(workflow.edges[0].target_id, "b");
        assert_eq!(workflow.edges[0].overlap_type, OverlapType::Exact);
    }

    #[test]
    fn test_parse_keeps_recorded_edges() {
        let json = r#"{
            "workflow_id": "wf-2",
            "calls": [
                {"run_id": "a", "model": "gpt-4o", "response": "x"},
                {"run_id": "b", "model": "gpt-4o", "prompt": "x"}
            ],
            "edges": [{"source_id": "b", "target_id": "a", "overlap_score": 0.4, "overlap_type": "partial"}]
        }"#;

        let workflow = TraceLoader::default().parse(json).unwrap();
        assert_eq!(workflow.edges.len(), 1);
        assert_eq!(workflow.edges[0].workflow_id, "wf-2");
        assert_eq!(workflow.edges[0].source_id, "b");
    }

    #[test]
    fn test_declared_parent_becomes_edge() {
        let json = r#"{
            "workflowId": "wf",
            "calls": [
                {"id": "root", "model": "gpt-4o", "prompt": "one", "response": "two", "createdAt": "2024-05-01T10:00:00Z"},
                {"id": "child", "parentId": "root", "model": "gpt-4o", "prompt": "three", "createdAt": "2024-05-01T10:00:01Z"},
                {"id": "orphan", "parentId": "ghost", "model": "gpt-4o", "prompt": "four", "createdAt": "2024-05-01T10:00:02Z"}
            ]
        }"#;

        let workflow = TraceLoader::default().parse(json).unwrap();
        assert_eq!(workflow.edges, vec![Edge::declared("wf", "root", "child")]);
    }

    #[test]
    fn test_foreign_and_duplicate_calls_are_skipped() {
        let json = r#"{
            "workflowId": "wf",
            "calls": [
                {"id": "a", "model": "gpt-4o"},
                {"id": "a", "model": "gpt-4o-mini"},
                {"id": "z", "workflowId": "other", "model": "gpt-4o"}
            ]
        }"#;

        let workflow = TraceLoader::default().parse(json).unwrap();
        assert_eq!(workflow.calls.len(), 1);
        assert_eq!(workflow.calls[0].model, "gpt-4o");
    }

    #[test]
    fn test_workflow_id_taken_from_calls() {
        let json = r#"{"calls": [{"id": "a", "workflow_id": "from-call", "model": "gpt-4o"}]}"#;
        let workflow = TraceLoader::default().parse(json).unwrap();
        assert_eq!(workflow.id, "from-call");
    }

    #[test]
    fn test_missing_workflow_id_is_an_error() {
        let err = TraceLoader::default().parse(r#"{"calls": []}"#).unwrap_err();
        assert!(err.to_string().contains("no workflow id"));
        assert!(TraceLoader::default().parse("not json").is_err());
    }

    #[test]
    fn test_parse_file_reports_path() {
        let err = TraceLoader::default()
            .parse_file(Path::new("/definitely/missing/trace.json"))
            .unwrap_err();
        assert!(format!("{err:#}").contains("/definitely/missing/trace.json"));
    }

    #[test]
    fn test_config_pricing_applies() {
        let mut config = AgentScoreConfig::default();
        config.pricing.models.insert(
            "house-model".to_string(),
            crate::pricing::ModelRates { input: 1.0, output: 1.0 },
        );
        let json = r#"{"workflowId": "wf", "calls": [{"id": "a", "model": "house-model", "tokensIn": 500000, "tokensOut": 500000}]}"#;
        let workflow = TraceLoader::from_config(&config).parse(json).unwrap();
        assert_eq!(workflow.calls[0].cost, 1.0);
    }
}
