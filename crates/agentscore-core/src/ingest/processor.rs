use crate::analyzer::dead_branch::IntendedOutputPolicy;
use crate::analyzer::graph_metrics::{compute_metrics, GraphMetrics};
use crate::config::AgentScoreConfig;
use crate::error::{AgentScoreError, Result};
use crate::ingest::middleware::MiddlewareChain;
use crate::ingest::store::TraceStore;
use crate::pricing::PricingTable;
use crate::relationship::{RelationshipDetector, ResponseCache};
use crate::trace::call::{Call, CallRecord, Edge};
use crate::trace::graph::WorkflowGraph;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;

/// What recording one call produced.
#[derive(Debug)]
pub struct Recorded {
    pub call: Call,
    pub edges: Vec<Edge>,
    /// Background graph recomputation, when a runtime was available to spawn it.
    pub recompute: Option<JoinHandle<()>>,
}

/// Turns incoming call records into stored calls, edges and graph metrics.
///
/// Owns the response cache used for edge inference, so two processors never
/// share inference state. Cloning is cheap and clones share the cache.
#[derive(Clone)]
pub struct WorkflowProcessor {
    store: Arc<dyn TraceStore>,
    cache: Arc<ResponseCache>,
    detector: RelationshipDetector,
    pricing: Arc<PricingTable>,
    middleware: Arc<MiddlewareChain>,
    policy: IntendedOutputPolicy,
    /// One lock per workflow; a recompute holds it from snapshot to write-back.
    recompute_locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl std::fmt::Debug for WorkflowProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowProcessor")
            .field("detector", &self.detector)
            .field("middleware", &self.middleware)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl WorkflowProcessor {
    pub fn new(store: Arc<dyn TraceStore>, config: &AgentScoreConfig) -> Self {
        Self {
            store,
            cache: Arc::new(ResponseCache::with_max_history(config.detector.max_history)),
            detector: RelationshipDetector::from_config(&config.detector),
            pricing: Arc::new(config.pricing_table()),
            middleware: Arc::new(MiddlewareChain::new()),
            policy: config.graph.intended_output.clone(),
            recompute_locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn with_middleware(mut self, middleware: MiddlewareChain) -> Self {
        self.middleware = Arc::new(middleware);
        self
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub fn store(&self) -> &Arc<dyn TraceStore> {
        &self.store
    }

    /// Record one finished call.
    ///
    /// Middleware runs first, then the record is priced and finalized, edges
    /// are inferred from earlier responses (plus the declared parent when it
    /// is a known call of the same workflow), call and edges are persisted,
    /// and the response joins the cache. Graph metrics are then recomputed
    /// in the background; outside a tokio runtime they are recomputed inline.
    pub fn record(&self, record: CallRecord) -> Result<Recorded> {
        let call = self.middleware.apply(record).finalize(&self.pricing);
        let workflow_id = call.workflow_id.clone();

        let mut edges = self
            .detector
            .infer_edges(&self.cache, &workflow_id, &call.id, &call.prompt_text());

        if let Some(parent_id) = call.parent_id.as_deref() {
            let declared = edges.iter().any(|e| e.source_id == parent_id);
            if !declared && parent_id != call.id {
                match self.store.get_call(&workflow_id, parent_id)? {
                    Some(_) => edges.push(Edge::declared(&workflow_id, parent_id, &call.id)),
                    None => tracing::debug!(
                        call = %call.id,
                        parent = parent_id,
                        "declared parent not in workflow, skipping edge"
                    ),
                }
            }
        }

        self.store.insert_call(call.clone())?;
        self.store.insert_edges(&edges)?;
        self.cache.record(&workflow_id, &call.id, &call.response_text());

        let recompute = self.schedule_recompute(workflow_id);
        Ok(Recorded { call, edges, recompute })
    }

    fn schedule_recompute(&self, workflow_id: String) -> Option<JoinHandle<()>> {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let processor = self.clone();
                Some(handle.spawn_blocking(move || {
                    if let Err(e) = processor.recompute(&workflow_id) {
                        tracing::warn!(workflow = %workflow_id, error = %e, "graph recomputation failed");
                    }
                }))
            }
            Err(_) => {
                if let Err(e) = self.recompute(&workflow_id) {
                    tracing::warn!(workflow = %workflow_id, error = %e, "graph recomputation failed");
                }
                None
            }
        }
    }

    /// Recompute graph metrics from the stored snapshot and write back node
    /// types and the workflow aggregate.
    ///
    /// Recomputes of one workflow run one at a time, so the last to finish
    /// always loaded a snapshot containing every call recorded before it
    /// was scheduled.
    pub fn recompute(&self, workflow_id: &str) -> Result<GraphMetrics> {
        let lock = self.workflow_lock(workflow_id);
        let _guard = lock.lock().unwrap_or_else(|poisoned| {
            tracing::warn!(workflow = workflow_id, "recompute lock poisoned, continuing");
            poisoned.into_inner()
        });

        let workflow = self
            .store
            .load_workflow(workflow_id)?
            .ok_or_else(|| AgentScoreError::UnknownWorkflow(workflow_id.to_string()))?;

        let graph = WorkflowGraph::from_workflow(&workflow);
        let metrics = compute_metrics(&graph, &self.policy);

        self.store.update_node_types(workflow_id, &metrics.classifications)?;
        self.store.update_metrics(workflow_id, metrics.workflow_metrics())?;
        Ok(metrics)
    }

    fn workflow_lock(&self, workflow_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self
            .recompute_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(locks.entry(workflow_id.to_string()).or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::middleware::DemoPricing;
    use crate::ingest::store::MemoryStore;
    use crate::trace::call::{NodeType, OverlapType};
    use chrono::{Duration, TimeZone, Utc};
    use serde_json::json;

    fn record(id: &str, step: i64, prompt: &str, response: &str, latency_ms: u64) -> CallRecord {
        let mut record = CallRecord::new(id, "wf", "gpt-4o-mini");
        record.prompt = Some(json!(prompt));
        record.response = Some(json!(response));
        record.tokens_in = 100;
        record.tokens_out = 50;
        record.latency_ms = Some(latency_ms);
        record.created_at = Some(Utc.timestamp_opt(1_700_000_000, 0).unwrap() + Duration::seconds(step));
        record
    }

    fn processor() -> WorkflowProcessor {
        WorkflowProcessor::new(Arc::new(MemoryStore::new()), &AgentScoreConfig::default())
    }

    #[test]
    fn test_inline_recompute_without_runtime() {
        let processor = processor();
        processor.record(record("a", 0, "Name a fruit.", "Mango", 100)).unwrap();
        let b = processor
            .record(record("b", 1, "Describe the taste of mango.", "Sweet and floral.", 200))
            .unwrap();
        assert!(b.recompute.is_none());
        assert_eq!(b.edges.len(), 1);
        assert_eq!(b.edges[0].overlap_type, OverlapType::Exact);

        let workflow = processor.store().load_workflow("wf").unwrap().unwrap();
        let metrics = workflow.metrics.clone().unwrap();
        assert!(metrics.graph_computed);
        assert_eq!(metrics.critical_path_latency_ms, 300);
        assert_eq!(workflow.get_call("a").unwrap().node_type, NodeType::Critical);
    }

    #[test]
    fn test_declared_parent_edge() {
        let processor = processor();
        processor.record(record("root", 0, "Plan the trip.", "Day one: museums.", 100)).unwrap();

        let mut child = record("child", 1, "Book tickets.", "Booked.", 100);
        child.parent_id = Some("root".to_string());
        let recorded = processor.record(child).unwrap();
        assert_eq!(recorded.edges, vec![Edge::declared("wf", "root", "child")]);

        let mut orphan = record("orphan", 2, "Anything else?", "No.", 100);
        orphan.parent_id = Some("not-recorded".to_string());
        assert!(processor.record(orphan).unwrap().edges.is_empty());
    }

    #[test]
    fn test_middleware_applies_before_pricing() {
        let processor = processor().with_middleware(MiddlewareChain::new().with(DemoPricing));
        let recorded = processor.record(record("a", 0, "hi", "hello", 10)).unwrap();
        assert_eq!(recorded.call.model, "gpt-4o-mini-demo");
        // (0.15 * 100 + 0.60 * 50) / 1M * 10_000
        assert_eq!(recorded.call.cost, 0.45);
    }

    #[test]
    fn test_duplicate_record_is_an_error() {
        let processor = processor();
        processor.record(record("a", 0, "hi", "hello", 10)).unwrap();
        assert!(processor.record(record("a", 1, "hi", "hello", 10)).is_err());
    }

    #[test]
    fn test_recompute_unknown_workflow() {
        let err = processor().recompute("nope").unwrap_err();
        assert!(matches!(err, AgentScoreError::UnknownWorkflow(_)));
    }

    #[tokio::test]
    async fn test_background_recompute_converges() {
        let processor = processor();
        let mut handles = Vec::new();
        for (i, (prompt, response)) in [
            ("Start.", "alpha"),
            ("Use alpha next.", "beta"),
            ("Now beta please.", "gamma"),
        ]
        .into_iter()
        .enumerate()
        {
            let recorded = processor
                .record(record(&format!("c{i}"), i as i64, prompt, response, 100))
                .unwrap();
            handles.extend(recorded.recompute);
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let after_burst = processor.store().load_workflow("wf").unwrap().unwrap();
        let once_more = processor.recompute("wf").unwrap();
        assert_eq!(after_burst.metrics, Some(once_more.workflow_metrics()));
        assert_eq!(once_more.critical_path, vec!["c0", "c1", "c2"]);
        assert_eq!(once_more.critical_path_latency_ms, 300);
        assert!(once_more.dead_calls.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_parallel_recomputes_end_on_full_call_set() {
        let processor = processor();
        let mut handles = Vec::new();
        for i in 0..40 {
            let prompt = if i == 0 { "Begin.".to_string() } else { format!("Continue from <{}>.", i - 1) };
            let recorded = processor
                .record(record(&format!("c{i}"), i, &prompt, &format!("<{i}>"), 10 + i as u64))
                .unwrap();
            handles.extend(recorded.recompute);
        }
        assert_eq!(handles.len(), 40);
        for handle in handles {
            handle.await.unwrap();
        }

        let stored = processor.store().load_workflow("wf").unwrap().unwrap();
        let fresh = processor.recompute("wf").unwrap();
        assert_eq!(stored.metrics, Some(fresh.workflow_metrics()));
        assert_eq!(fresh.critical_path.len(), 40);
        for call in &stored.calls {
            assert_eq!(call.node_type, NodeType::Critical, "stale node type on {}", call.id);
        }
    }
}
