use crate::analyzer::dead_branch::IntendedOutputPolicy;
use crate::error::AgentScoreError;
use crate::pricing::{ModelRates, PricingTable};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Environment variable overriding `delivery.backend_url`.
pub const BACKEND_URL_ENV: &str = "AGENTSCORE_BACKEND_URL";

/// Configuration loaded from `.agentscore/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AgentScoreConfig {
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub graph: GraphConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
    #[serde(default)]
    pub pricing: PricingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Findings below this confidence are ignored.
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,

    /// Scale each finding's waste by its confidence before aggregating.
    #[serde(default)]
    pub confidence_weighted: bool,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            min_confidence: default_min_confidence(),
            confidence_weighted: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Responses at or below this many characters only match exactly.
    #[serde(default = "default_min_chunked_length")]
    pub min_chunked_length: usize,

    #[serde(default = "default_min_score")]
    pub min_score: f64,

    #[serde(default = "default_min_matched_chunks")]
    pub min_matched_chunks: usize,

    /// Responses remembered per workflow.
    #[serde(default = "default_max_history")]
    pub max_history: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            min_chunked_length: default_min_chunked_length(),
            min_score: default_min_score(),
            min_matched_chunks: default_min_matched_chunks(),
            max_history: default_max_history(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GraphConfig {
    #[serde(default)]
    pub intended_output: IntendedOutputPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    #[serde(default = "default_backend_url")]
    pub backend_url: String,

    /// Upper bound on how long a sender waits for acknowledgment.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            backend_url: default_backend_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Extra or overriding model rates, per million tokens.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PricingConfig {
    #[serde(default)]
    pub models: HashMap<String, ModelRates>,
}

/// Lowest accepted `scoring.min_confidence`; findings below it never count.
pub const MIN_CONFIDENCE_FLOOR: f64 = 0.7;

fn default_min_confidence() -> f64 {
    MIN_CONFIDENCE_FLOOR
}

fn default_chunk_size() -> usize {
    50
}

fn default_min_chunked_length() -> usize {
    100
}

fn default_min_score() -> f64 {
    0.1
}

fn default_min_matched_chunks() -> usize {
    2
}

fn default_max_history() -> usize {
    64
}

fn default_backend_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_timeout_secs() -> u64 {
    5
}

impl AgentScoreConfig {
    /// Load `.agentscore/config.toml` under `dir` if present, else defaults.
    pub fn discover(dir: &Path) -> anyhow::Result<Self> {
        let path = dir.join(".agentscore").join("config.toml");
        let mut config = if path.is_file() {
            load_config(&path)?
        } else {
            Self::default()
        };
        config.apply_env();
        Ok(config)
    }

    /// Apply environment overrides.
    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(BACKEND_URL_ENV) {
            if !url.trim().is_empty() {
                self.delivery.backend_url = url;
            }
        }
    }

    /// The built-in price list extended with configured models.
    pub fn pricing_table(&self) -> PricingTable {
        self.pricing
            .models
            .iter()
            .fold(PricingTable::builtin(), |table, (name, rates)| {
                table.with_model(name.clone(), *rates)
            })
    }
}

/// Load configuration from a TOML file.
pub fn load_config(path: &Path) -> anyhow::Result<AgentScoreConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path.display(), e))?;
    let config: AgentScoreConfig = toml::from_str(&content)
        .map_err(|e| anyhow::anyhow!("Failed to parse config file '{}': {}", path.display(), e))?;

    if !(MIN_CONFIDENCE_FLOOR..=1.0).contains(&config.scoring.min_confidence) {
        return Err(AgentScoreError::Config(format!(
            "scoring.min_confidence must be within [{}, 1], got {}",
            MIN_CONFIDENCE_FLOOR, config.scoring.min_confidence
        ))
        .into());
    }
    Ok(config)
}
