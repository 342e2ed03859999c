//! Heuristic producer -> consumer edge inference.
//!
//! A call is considered to consume an earlier call's output when that output
//! shows up in its prompt, either whole or as several fixed-size chunks. The
//! heuristic tolerates false negatives (reworded output is missed) and is
//! kept strict enough that unrelated long texts sharing a stock phrase do
//! not produce edges.

use crate::config::DetectorConfig;
use crate::trace::call::{Edge, OverlapType};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

/// One prior response remembered for a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedResponse {
    pub call_id: String,
    pub text: String,
}

/// Per-workflow memory of past responses.
///
/// Owned by whoever processes a workflow's calls and passed by reference into
/// the detector. Two calls recorded concurrently may miss an edge between them.
#[derive(Debug)]
pub struct ResponseCache {
    entries: RwLock<HashMap<String, Vec<CachedResponse>>>,
    max_history: usize,
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::with_max_history(64)
    }

    /// Keep at most `max_history` responses per workflow, oldest evicted first.
    pub fn with_max_history(max_history: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            max_history: max_history.max(1),
        }
    }

    /// Remember a call's response. Empty responses are ignored.
    pub fn record(&self, workflow_id: &str, call_id: &str, text: &str) {
        if text.trim().is_empty() {
            return;
        }
        let Ok(mut guard) = self.entries.write() else {
            tracing::warn!(workflow = workflow_id, "response cache lock poisoned, skipping record");
            return;
        };
        let history = guard.entry(workflow_id.to_string()).or_default();
        history.push(CachedResponse {
            call_id: call_id.to_string(),
            text: text.to_string(),
        });
        if history.len() > self.max_history {
            let overflow = history.len() - self.max_history;
            history.drain(..overflow);
        }
    }

    /// Copy of a workflow's remembered responses, oldest first.
    pub fn snapshot(&self, workflow_id: &str) -> Vec<CachedResponse> {
        match self.entries.read() {
            Ok(guard) => guard.get(workflow_id).cloned().unwrap_or_default(),
            Err(_) => {
                tracing::warn!(workflow = workflow_id, "response cache lock poisoned, returning empty history");
                Vec::new()
            }
        }
    }

    /// Forget a finished workflow.
    pub fn clear(&self, workflow_id: &str) {
        if let Ok(mut guard) = self.entries.write() {
            guard.remove(workflow_id);
        }
    }

    pub fn workflow_count(&self) -> usize {
        self.entries.read().map(|g| g.len()).unwrap_or(0)
    }
}

/// An inferred edge into a new call, before it is bound to a workflow.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectedEdge {
    pub source_id: String,
    pub overlap_score: f64,
    pub overlap_type: OverlapType,
}

/// Text-overlap edge detector.
#[derive(Debug, Clone)]
pub struct RelationshipDetector {
    chunk_size: usize,
    min_chunked_length: usize,
    min_score: f64,
    min_matched_chunks: usize,
}

impl Default for RelationshipDetector {
    fn default() -> Self {
        Self {
            chunk_size: 50,
            min_chunked_length: 100,
            min_score: 0.1,
            min_matched_chunks: 2,
        }
    }
}

impl RelationshipDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &DetectorConfig) -> Self {
        Self {
            chunk_size: config.chunk_size.max(1),
            min_chunked_length: config.min_chunked_length,
            min_score: config.min_score,
            min_matched_chunks: config.min_matched_chunks.max(1),
        }
    }

    /// Infer edges from earlier responses into a new prompt.
    pub fn detect(&self, history: &[CachedResponse], prompt: &str) -> Vec<DetectedEdge> {
        let prompt = prompt.to_lowercase();
        if prompt.is_empty() {
            return Vec::new();
        }

        history
            .iter()
            .filter_map(|prior| {
                let (overlap_score, overlap_type) = self.overlap(&prior.text.to_lowercase(), &prompt)?;
                (overlap_score >= self.min_score).then(|| DetectedEdge {
                    source_id: prior.call_id.clone(),
                    overlap_score,
                    overlap_type,
                })
            })
            .collect()
    }

    fn overlap(&self, response: &str, prompt: &str) -> Option<(f64, OverlapType)> {
        if response.trim().is_empty() {
            return None;
        }
        if prompt.contains(response) {
            return Some((1.0, OverlapType::Exact));
        }

        if response.chars().count() <= self.min_chunked_length {
            return None;
        }

        let chunks = self.chunks(response);
        let matched = chunks.iter().filter(|chunk| prompt.contains(chunk.as_str())).count();
        if matched < self.min_matched_chunks {
            return None;
        }

        Some((matched as f64 / chunks.len() as f64, OverlapType::Partial))
    }

    /// Fixed-size character chunks; the last one may be shorter.
    fn chunks(&self, text: &str) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        chars.chunks(self.chunk_size).map(|c| c.iter().collect()).collect()
    }

    /// Edges from a workflow's remembered responses into a new call.
    pub fn infer_edges(&self, cache: &ResponseCache, workflow_id: &str, call_id: &str, prompt: &str) -> Vec<Edge> {
        self.detect(&cache.snapshot(workflow_id), prompt)
            .into_iter()
            .filter(|d| d.source_id != call_id)
            .map(|d| Edge {
                workflow_id: workflow_id.to_string(),
                source_id: d.source_id,
                target_id: call_id.to_string(),
                overlap_score: d.overlap_score,
                overlap_type: d.overlap_type,
            })
            .collect()
    }

    /// Detect edges for a new call and remember its response afterwards.
    pub fn detect_and_record(
        &self,
        cache: &ResponseCache,
        workflow_id: &str,
        call_id: &str,
        prompt: &str,
        response: &str,
    ) -> Vec<Edge> {
        let edges = self.infer_edges(cache, workflow_id, call_id, prompt);
        cache.record(workflow_id, call_id, response);
        edges
    }
}
