use crate::error::{AgentScoreError, Result};
use crate::trace::call::{Call, Edge, NodeType, Workflow, WorkflowMetrics};
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

/// Persistence for calls, edges and derived workflow fields.
///
/// Calls and edges are append-only. Derived fields (node types, workflow
/// metrics) are overwritten by each graph recomputation.
pub trait TraceStore: Send + Sync {
    fn insert_call(&self, call: Call) -> Result<()>;

    /// Append edges. Every endpoint must already be a call of the edge's workflow.
    fn insert_edges(&self, edges: &[Edge]) -> Result<()>;

    fn get_call(&self, workflow_id: &str, call_id: &str) -> Result<Option<Call>>;

    /// Snapshot of a workflow's calls and edges.
    fn load_workflow(&self, workflow_id: &str) -> Result<Option<Workflow>>;

    fn update_node_types(&self, workflow_id: &str, node_types: &BTreeMap<String, NodeType>) -> Result<()>;

    fn update_metrics(&self, workflow_id: &str, metrics: WorkflowMetrics) -> Result<()>;

    fn workflow_ids(&self) -> Result<Vec<String>>;
}

/// In-process [`TraceStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    workflows: RwLock<HashMap<String, Workflow>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn poisoned() -> AgentScoreError {
        AgentScoreError::Store("memory store lock poisoned".to_string())
    }
}

impl TraceStore for MemoryStore {
    fn insert_call(&self, call: Call) -> Result<()> {
        let mut workflows = self.workflows.write().map_err(|_| Self::poisoned())?;
        let workflow = workflows
            .entry(call.workflow_id.clone())
            .or_insert_with(|| Workflow::new(call.workflow_id.clone()));

        if workflow.get_call(&call.id).is_some() {
            return Err(AgentScoreError::DuplicateCall {
                workflow_id: call.workflow_id,
                call_id: call.id,
            });
        }
        workflow.calls.push(call);
        Ok(())
    }

    fn insert_edges(&self, edges: &[Edge]) -> Result<()> {
        let mut workflows = self.workflows.write().map_err(|_| Self::poisoned())?;

        for edge in edges {
            let workflow = workflows
                .get(&edge.workflow_id)
                .ok_or_else(|| AgentScoreError::UnknownWorkflow(edge.workflow_id.clone()))?;
            for id in [&edge.source_id, &edge.target_id] {
                if workflow.get_call(id).is_none() {
                    return Err(AgentScoreError::UnknownCall(id.clone()));
                }
            }
        }

        for edge in edges {
            if let Some(workflow) = workflows.get_mut(&edge.workflow_id) {
                workflow.edges.push(edge.clone());
            }
        }
        Ok(())
    }

    fn get_call(&self, workflow_id: &str, call_id: &str) -> Result<Option<Call>> {
        let workflows = self.workflows.read().map_err(|_| Self::poisoned())?;
        Ok(workflows
            .get(workflow_id)
            .and_then(|w| w.get_call(call_id))
            .cloned())
    }

    fn load_workflow(&self, workflow_id: &str) -> Result<Option<Workflow>> {
        let workflows = self.workflows.read().map_err(|_| Self::poisoned())?;
        Ok(workflows.get(workflow_id).cloned())
    }

    fn update_node_types(&self, workflow_id: &str, node_types: &BTreeMap<String, NodeType>) -> Result<()> {
        let mut workflows = self.workflows.write().map_err(|_| Self::poisoned())?;
        let workflow = workflows
            .get_mut(workflow_id)
            .ok_or_else(|| AgentScoreError::UnknownWorkflow(workflow_id.to_string()))?;
        for call in &mut workflow.calls {
            if let Some(node_type) = node_types.get(&call.id) {
                call.node_type = *node_type;
            }
        }
        Ok(())
    }

    fn update_metrics(&self, workflow_id: &str, metrics: WorkflowMetrics) -> Result<()> {
        let mut workflows = self.workflows.write().map_err(|_| Self::poisoned())?;
        let workflow = workflows
            .get_mut(workflow_id)
            .ok_or_else(|| AgentScoreError::UnknownWorkflow(workflow_id.to_string()))?;
        workflow.metrics = Some(metrics);
        Ok(())
    }

    fn workflow_ids(&self) -> Result<Vec<String>> {
        let workflows = self.workflows.read().map_err(|_| Self::poisoned())?;
        let mut ids: Vec<String> = workflows.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pricing::PricingTable;
    use crate::trace::call::CallRecord;

    fn call(id: &str, workflow_id: &str) -> Call {
        CallRecord::new(id, workflow_id, "gpt-4o-mini").finalize(&PricingTable::builtin())
    }

    #[test]
    fn test_insert_and_load() {
        let store = MemoryStore::new();
        store.insert_call(call("a", "wf")).unwrap();
        store.insert_call(call("b", "wf")).unwrap();
        store.insert_edges(&[Edge::declared("wf", "a", "b")]).unwrap();

        let workflow = store.load_workflow("wf").unwrap().unwrap();
        assert_eq!(workflow.total_calls(), 2);
        assert_eq!(workflow.edges.len(), 1);
        assert!(store.load_workflow("other").unwrap().is_none());
    }

    #[test]
    fn test_duplicate_call_rejected() {
        let store = MemoryStore::new();
        store.insert_call(call("a", "wf")).unwrap();
        let err = store.insert_call(call("a", "wf")).unwrap_err();
        assert!(matches!(err, AgentScoreError::DuplicateCall { .. }));
    }

    #[test]
    fn test_edge_endpoints_must_exist() {
        let store = MemoryStore::new();
        store.insert_call(call("a", "wf")).unwrap();
        store.insert_call(call("x", "other")).unwrap();

        let err = store.insert_edges(&[Edge::declared("wf", "a", "x")]).unwrap_err();
        assert!(matches!(err, AgentScoreError::UnknownCall(id) if id == "x"));
        assert!(store.load_workflow("wf").unwrap().unwrap().edges.is_empty());
    }

    #[test]
    fn test_derived_fields_overwritten() {
        let store = MemoryStore::new();
        store.insert_call(call("a", "wf")).unwrap();

        let mut types = BTreeMap::new();
        types.insert("a".to_string(), NodeType::Dead);
        store.update_node_types("wf", &types).unwrap();
        types.insert("a".to_string(), NodeType::Critical);
        store.update_node_types("wf", &types).unwrap();

        assert_eq!(store.get_call("wf", "a").unwrap().unwrap().node_type, NodeType::Critical);
        assert!(store.update_metrics("missing", WorkflowMetrics::default()).is_err());
        assert_eq!(store.workflow_ids().unwrap(), vec!["wf"]);
    }
}
