use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::OnceLock;

/// Reserved model-name suffix that stages high-cost demonstration traces.
pub const DEMO_SUFFIX: &str = "-demo";

/// Cost multiplier applied to models carrying [`DEMO_SUFFIX`].
pub const DEMO_MULTIPLIER: f64 = 10_000.0;

const VENDOR_PREFIXES: &[&str] = &["models/", "openai/", "anthropic/", "google/"];

const COST_DECIMALS: i32 = 6;

/// Input/output price per one million tokens, in USD.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelRates {
    pub input: f64,
    pub output: f64,
}

impl ModelRates {
    pub const fn new(input: f64, output: f64) -> Self {
        Self { input, output }
    }
}

/// Static per-model price list.
///
/// Lookups normalize the model name first: vendor path prefixes are removed
/// and the demo suffix is split off. The remaining name must match an entry
/// exactly; dated snapshots are listed as their own entries.
#[derive(Debug, Clone)]
pub struct PricingTable {
    models: HashMap<String, ModelRates>,
}

impl Default for PricingTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl PricingTable {
    /// Paid-tier list prices, January 2026.
    pub fn builtin() -> Self {
        let entries: &[(&str, f64, f64)] = &[
            // Google Gemini
            ("gemini-3-pro", 2.00, 12.00),
            ("gemini-3-pro-preview", 2.00, 12.00),
            ("gemini-3-flash", 0.50, 3.00),
            ("gemini-3-flash-preview", 0.50, 3.00),
            ("gemini-2.5-pro", 1.25, 10.00),
            ("gemini-2.5-flash", 0.30, 2.50),
            ("gemini-2.5-flash-lite", 0.10, 0.40),
            ("gemini-2.0-flash", 0.10, 0.40),
            ("gemini-2.0-flash-lite", 0.075, 0.30),
            ("gemini-2.0-flash-exp", 0.10, 0.40),
            ("gemini-1.5-pro-002", 1.25, 5.00),
            ("gemini-1.5-flash", 0.075, 0.30),
            ("gemini-flash", 0.30, 2.50),
            // OpenAI
            ("gpt-5.2", 1.75, 14.00),
            ("gpt-5.2-pro", 21.00, 168.00),
            ("gpt-5-mini", 0.25, 2.00),
            ("gpt-4.1", 3.00, 12.00),
            ("gpt-4.1-mini", 0.80, 3.20),
            ("gpt-4.1-nano", 0.20, 0.80),
            ("gpt-4", 30.00, 60.00),
            ("gpt-4o", 5.00, 15.00),
            ("gpt-4o-2024-08-06", 5.00, 15.00),
            ("gpt-4o-mini", 0.15, 0.60),
            ("gpt-4o-mini-2024-07-18", 0.15, 0.60),
            ("gpt-3.5-turbo", 0.50, 1.50),
            // Anthropic
            ("claude-opus-4.5", 5.00, 25.00),
            ("claude-opus-4.1", 15.00, 75.00),
            ("claude-opus-4", 15.00, 75.00),
            ("claude-sonnet-4.5", 3.00, 15.00),
            ("claude-sonnet-4", 3.00, 15.00),
            ("claude-haiku-4.5", 1.00, 5.00),
            ("claude-haiku-3.5", 0.80, 4.00),
            ("claude-haiku-3", 0.25, 1.25),
            ("claude-3-haiku", 0.25, 1.25),
        ];

        let models = entries
            .iter()
            .map(|&(name, input, output)| (name.to_string(), ModelRates::new(input, output)))
            .collect();

        Self { models }
    }

    /// Add or override the rates for one model.
    pub fn with_model(mut self, name: impl Into<String>, rates: ModelRates) -> Self {
        self.models.insert(name.into(), rates);
        self
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Rates for a model name after normalization, if the table knows it.
    pub fn rates(&self, model: &str) -> Option<ModelRates> {
        let (base, _) = split_demo_suffix(normalize_model_name(model));
        self.lookup(base)
    }

    fn lookup(&self, name: &str) -> Option<ModelRates> {
        self.models.get(name).copied()
    }

    /// Dollar cost of one invocation.
    ///
    /// Unknown models cost 0 and log a warning; pricing never fails the caller.
    pub fn cost(&self, model: &str, tokens_in: u64, tokens_out: u64) -> f64 {
        let normalized = normalize_model_name(model);
        let (base, is_demo) = split_demo_suffix(normalized);

        let Some(rates) = self.lookup(base) else {
            tracing::warn!(model, normalized = base, "unknown model, pricing at zero");
            return 0.0;
        };

        let multiplier = if is_demo { DEMO_MULTIPLIER } else { 1.0 };
        let input_cost = rates.input / 1_000_000.0 * tokens_in as f64 * multiplier;
        let output_cost = rates.output / 1_000_000.0 * tokens_out as f64 * multiplier;

        round_to(input_cost + output_cost, COST_DECIMALS)
    }
}

/// Strip known vendor path prefixes (`models/`, `openai/`, ...).
pub fn normalize_model_name(model: &str) -> &str {
    let mut normalized = model.trim();
    for prefix in VENDOR_PREFIXES {
        if let Some(rest) = normalized.strip_prefix(prefix) {
            normalized = rest;
        }
    }
    normalized
}

/// Whether a model name carries the reserved demo suffix.
pub fn is_demo_model(model: &str) -> bool {
    split_demo_suffix(normalize_model_name(model)).1
}

fn split_demo_suffix(model: &str) -> (&str, bool) {
    match model.strip_suffix(DEMO_SUFFIX) {
        Some(base) => (base, true),
        None => (model, false),
    }
}

/// Cost against the built-in table.
pub fn calculate_cost(model: &str, tokens_in: u64, tokens_out: u64) -> f64 {
    static BUILTIN: OnceLock<PricingTable> = OnceLock::new();
    BUILTIN
        .get_or_init(PricingTable::builtin)
        .cost(model, tokens_in, tokens_out)
}

pub(crate) fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
