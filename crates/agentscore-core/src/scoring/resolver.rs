use crate::scoring::findings::CallRef;
use crate::trace::call::{chronological, Call};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::OnceLock;

/// Prefix used when calls are presented to the finding producer.
pub const CALL_LABEL_PREFIX: &str = "call_";

/// The trailing integer of any reference.
fn trailing_number() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(\d+)$").ok()).as_ref()
}

/// Maps finding references back to concrete calls.
///
/// A reference ending in digits is tried first as a 1-based position in
/// chronological order; when that misses it is matched as a real call id.
#[derive(Debug, Clone)]
pub struct CallResolver<'a> {
    ordered: Vec<&'a Call>,
    by_id: HashMap<&'a str, &'a Call>,
}

impl<'a> CallResolver<'a> {
    pub fn new(calls: &'a [Call]) -> Self {
        let ordered = chronological(calls);
        let mut by_id = HashMap::with_capacity(ordered.len());
        for call in &ordered {
            by_id.entry(call.id.as_str()).or_insert(*call);
        }
        Self { ordered, by_id }
    }

    pub fn resolve(&self, reference: &CallRef) -> Option<&'a Call> {
        let resolved = match reference {
            CallRef::Index(n) => self.by_position(*n),
            CallRef::Label(label) => {
                let label = label.trim();
                trailing_number()
                    .and_then(|re| re.captures(label))
                    .and_then(|caps| caps.get(1))
                    .and_then(|m| m.as_str().parse::<u64>().ok())
                    .and_then(|n| self.by_position(n))
                    .or_else(|| self.by_id.get(label).copied())
            }
        };

        if resolved.is_none() {
            tracing::debug!(reference = %reference, "finding reference does not resolve to a call");
        }
        resolved
    }

    fn by_position(&self, position: u64) -> Option<&'a Call> {
        let index = usize::try_from(position).ok()?.checked_sub(1)?;
        self.ordered.get(index).copied()
    }
}

/// One call as presented to the finding producer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledCall {
    pub call_id: String,
    pub model: String,
    pub prompt: String,
    pub response: String,
    pub tokens_in: u64,
    pub tokens_out: u64,
}

/// Label calls `call_1..call_N` in chronological order.
///
/// [`CallResolver`] maps these labels back to the same calls.
pub fn label_calls(calls: &[Call]) -> Vec<LabeledCall> {
    chronological(calls)
        .into_iter()
        .enumerate()
        .map(|(i, call)| LabeledCall {
            call_id: format!("{CALL_LABEL_PREFIX}{}", i + 1),
            model: call.model.clone(),
            prompt: call.prompt_text(),
            response: call.response_text(),
            tokens_in: call.tokens_in,
            tokens_out: call.tokens_out,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::call::NodeType;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn call(id: &str, at: i64) -> Call {
        Call {
            id: id.to_string(),
            workflow_id: "wf".to_string(),
            parent_id: None,
            model: "gpt-4".to_string(),
            prompt: Some(json!(format!("prompt {id}"))),
            response: Some(json!(format!("response {id}"))),
            tokens_in: 10,
            tokens_out: 10,
            cost: 0.001,
            latency_ms: 10,
            created_at: Utc.timestamp_opt(1_700_000_000 + at, 0).unwrap(),
            node_type: NodeType::Normal,
        }
    }

    fn calls() -> Vec<Call> {
        // Inserted out of chronological order.
        vec![
            call("5f0c1e2a-9b7d-4c11-8e3f-2a9d0b6c7e14", 20),
            call("first", 0),
            call("second", 10),
        ]
    }

    #[test]
    fn test_label_is_chronological_position() {
        let calls = calls();
        let resolver = CallResolver::new(&calls);
        assert_eq!(resolver.resolve(&"call_1".into()).unwrap().id, "first");
        assert_eq!(resolver.resolve(&"call_2".into()).unwrap().id, "second");
        assert_eq!(resolver.resolve(&CallRef::Index(3)).unwrap().id, calls[0].id);
        assert_eq!(resolver.resolve(&"Call 2".into()).unwrap().id, "second");
    }

    #[test]
    fn test_trailing_number_wins_over_inner_digits() {
        let calls = calls();
        let resolver = CallResolver::new(&calls);
        assert_eq!(resolver.resolve(&"step2-call_3".into()).unwrap().id, calls[0].id);
        assert_eq!(resolver.resolve(&"v2/call 1".into()).unwrap().id, "first");
    }

    #[test]
    fn test_real_ids_resolve() {
        let calls = calls();
        let resolver = CallResolver::new(&calls);
        let uuid = calls[0].id.clone();
        assert_eq!(resolver.resolve(&CallRef::Label(uuid.clone())).unwrap().id, uuid);
        assert_eq!(resolver.resolve(&"second".into()).unwrap().id, "second");
    }

    #[test]
    fn test_out_of_range_falls_back_to_id() {
        let mut calls = calls();
        calls.push(call("run-42", 30));
        let resolver = CallResolver::new(&calls);
        assert_eq!(resolver.resolve(&"run-42".into()).unwrap().id, "run-42");
    }

    #[test]
    fn test_unresolvable_references() {
        let calls = calls();
        let resolver = CallResolver::new(&calls);
        assert!(resolver.resolve(&"call_9".into()).is_none());
        assert!(resolver.resolve(&"call_0".into()).is_none());
        assert!(resolver.resolve(&CallRef::Index(0)).is_none());
        assert!(resolver.resolve(&"ghost".into()).is_none());
    }

    #[test]
    fn test_label_calls_round_trips_through_resolver() {
        let calls = calls();
        let labeled = label_calls(&calls);
        assert_eq!(labeled[0].call_id, "call_1");
        assert_eq!(labeled[0].prompt, "prompt first");

        let resolver = CallResolver::new(&calls);
        for item in &labeled {
            let call = resolver.resolve(&CallRef::Label(item.call_id.clone())).unwrap();
            assert_eq!(call.response_text(), item.response);
        }
    }
}
