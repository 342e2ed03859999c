use crate::error::Result;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;

/// Severity attached to an externally produced finding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    High,
    #[default]
    Medium,
    Low,
}

impl Severity {
    /// Case-insensitive parse. Unknown labels are treated as medium.
    pub fn parse(label: &str) -> Self {
        match label.trim().to_ascii_uppercase().as_str() {
            "HIGH" | "CRITICAL" => Severity::High,
            "LOW" | "INFO" => Severity::Low,
            _ => Severity::Medium,
        }
    }

    pub fn priority(&self) -> u8 {
        match self {
            Severity::High => 3,
            Severity::Medium => 2,
            Severity::Low => 1,
        }
    }

    pub fn symbol(&self) -> &str {
        match self {
            Severity::High => "HIGH",
            Severity::Medium => "MEDIUM",
            Severity::Low => "LOW",
        }
    }
}

fn lenient_severity<'de, D>(deserializer: D) -> std::result::Result<Option<Severity>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<Value> = Option::deserialize(deserializer)?;
    Ok(match raw {
        Some(Value::String(s)) => Some(Severity::parse(&s)),
        _ => None,
    })
}

fn lenient_confidence<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<Value> = Option::deserialize(deserializer)?;
    Ok(match raw {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    })
}

/// A call reference as written by the finding producer: either a short
/// label such as `call_3`, a real call id, or a bare 1-based index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CallRef {
    Index(u64),
    Label(String),
}

impl fmt::Display for CallRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallRef::Index(n) => write!(f, "{n}"),
            CallRef::Label(s) => f.write_str(s),
        }
    }
}

impl From<&str> for CallRef {
    fn from(s: &str) -> Self {
        CallRef::Label(s.to_string())
    }
}

/// Shared view over the three finding kinds.
pub trait Finding {
    fn confidence(&self) -> f64;
    fn severity(&self) -> Severity;
}

/// A group of calls judged to be semantic duplicates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedundancyFinding {
    #[serde(default)]
    pub call_ids: Vec<CallRef>,
    #[serde(default, alias = "keep", skip_serializing_if = "Option::is_none")]
    pub keep_call_id: Option<CallRef>,
    /// Explicit waste set; overrides `call_ids` minus the kept call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duplicate_call_ids: Option<Vec<CallRef>>,
    #[serde(default, deserialize_with = "lenient_confidence")]
    pub confidence: f64,
    #[serde(default, deserialize_with = "lenient_severity", skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fix_suggestion: Option<String>,
    /// Dollar waste attributed by scoring.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub savings: Option<f64>,
}

/// A call that used a pricier model than its task needed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverkillFinding {
    pub call_id: CallRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommended_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_type: Option<String>,
    #[serde(default, deserialize_with = "lenient_confidence")]
    pub confidence: f64,
    #[serde(default, deserialize_with = "lenient_severity", skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fix_suggestion: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub savings: Option<f64>,
}

/// A prompt carrying more input tokens than the task needed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BloatFinding {
    pub call_id: CallRef,
    /// Token count as reported by the producer; scoring uses the call's own count.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_tokens: Option<u64>,
    #[serde(default)]
    pub estimated_necessary_tokens: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unnecessary_content: Option<String>,
    #[serde(default, deserialize_with = "lenient_confidence")]
    pub confidence: f64,
    #[serde(default, deserialize_with = "lenient_severity", skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fix_suggestion: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub savings: Option<f64>,
}

macro_rules! impl_finding {
    ($($ty:ty),*) => {
        $(impl Finding for $ty {
            fn confidence(&self) -> f64 {
                self.confidence
            }

            fn severity(&self) -> Severity {
                self.severity.unwrap_or_default()
            }
        })*
    };
}

impl_finding!(RedundancyFinding, OverkillFinding, BloatFinding);

/// Findings for one workflow, normalized from the producer's loose JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Findings {
    #[serde(default)]
    pub redundancies: Vec<RedundancyFinding>,
    #[serde(default)]
    pub model_overkill: Vec<OverkillFinding>,
    #[serde(default)]
    pub prompt_bloat: Vec<BloatFinding>,
    /// Top issues supplied by the producer's own summary, if any.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub summary_top_issues: Vec<String>,
}

impl Findings {
    /// Normalize a producer payload.
    ///
    /// Each category may be a bare list or an `{items: [...]}` wrapper.
    /// Redundancies are read from `redundancies` or `redundant_calls`.
    /// Items that do not parse are dropped.
    pub fn from_value(value: &Value) -> Self {
        let redundancy_key = if value.get("redundancies").is_some_and(|v| !v.is_null()) {
            "redundancies"
        } else {
            "redundant_calls"
        };

        let summary_top_issues = value
            .get("analysis_summary")
            .and_then(|s| s.get("top_issues"))
            .and_then(Value::as_array)
            .map(|issues| {
                issues
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Self {
            redundancies: parse_category(value, redundancy_key),
            model_overkill: parse_category(value, "model_overkill"),
            prompt_bloat: parse_category(value, "prompt_bloat"),
            summary_top_issues,
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(json)?;
        Ok(Self::from_value(&value))
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn len(&self) -> usize {
        self.redundancies.len() + self.model_overkill.len() + self.prompt_bloat.len()
    }
}

fn category_items<'a>(value: &'a Value, key: &str) -> &'a [Value] {
    match value.get(key) {
        Some(Value::Array(items)) => items,
        Some(wrapper @ Value::Object(_)) => wrapper
            .get("items")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[]),
        _ => &[],
    }
}

fn parse_category<T: DeserializeOwned>(value: &Value, key: &str) -> Vec<T> {
    category_items(value, key)
        .iter()
        .filter_map(|item| match T::deserialize(item) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                tracing::debug!(category = key, error = %e, "dropping unparseable finding");
                None
            }
        })
        .collect()
}
