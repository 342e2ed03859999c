pub mod analyzer;
pub mod config;
pub mod delivery;
pub mod error;
pub mod export;
pub mod ingest;
pub mod pricing;
pub mod relationship;
pub mod scoring;
pub mod trace;

pub use analyzer::analyze;
pub use analyzer::graph_metrics::GraphMetrics;
pub use analyzer::report::WorkflowReport;
pub use config::{load_config, AgentScoreConfig};
pub use delivery::{DeliveryOutcome, EventSender};
pub use error::{AgentScoreError, Result};
pub use ingest::processor::WorkflowProcessor;
pub use ingest::store::{MemoryStore, TraceStore};
pub use pricing::{calculate_cost, PricingTable};
pub use relationship::{RelationshipDetector, ResponseCache};
pub use scoring::findings::Findings;
pub use scoring::{score_workflow, EfficiencyScore, EfficiencyScorer};
pub use trace::call::{Call, CallRecord, Edge, NodeType, OverlapType, Workflow};
pub use trace::graph::WorkflowGraph;
pub use trace::loader::TraceLoader;
