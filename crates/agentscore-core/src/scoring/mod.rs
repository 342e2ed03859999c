//! Cost-based efficiency scoring.
//!
//! The score is the share of a workflow's spend that was necessary:
//! `100 * (total_cost - waste) / total_cost`, where waste is reconciled from
//! externally produced findings against the calls' own cost and token data.

pub mod findings;
pub mod grade;
pub mod resolver;

use crate::config::{AgentScoreConfig, MIN_CONFIDENCE_FLOOR};
use crate::pricing::{round_to, PricingTable};
use crate::trace::call::Call;
use findings::{Finding, Findings, Severity};
use grade::Grade;
use resolver::CallResolver;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Floor for total cost so an all-free workflow never divides by zero.
const MIN_TOTAL_COST: f64 = 1e-6;

const MAX_TOP_ISSUES: usize = 3;

/// Per-category diagnostic scores, each in [0, 100].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubScores {
    pub redundancy: u8,
    pub model_fit: u8,
    pub context_efficiency: u8,
}

impl SubScores {
    pub const PERFECT: SubScores = SubScores {
        redundancy: 100,
        model_fit: 100,
        context_efficiency: 100,
    };
}

/// Dollar waste per category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavingsBreakdown {
    pub redundancy_savings: f64,
    pub model_fit_savings: f64,
    pub context_efficiency_savings: f64,
    pub total_savings: f64,
}

/// Accepted findings by severity. Missing severities count as medium.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityCounts {
    #[serde(rename = "HIGH")]
    pub high: usize,
    #[serde(rename = "MEDIUM")]
    pub medium: usize,
    #[serde(rename = "LOW")]
    pub low: usize,
}

impl SeverityCounts {
    fn add(&mut self, severity: Severity) {
        match severity {
            Severity::High => self.high += 1,
            Severity::Medium => self.medium += 1,
            Severity::Low => self.low += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.high + self.medium + self.low
    }
}

/// Result of scoring one workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EfficiencyScore {
    pub score: u8,
    pub grade: Grade,
    pub sub_scores: SubScores,
    pub savings_breakdown: SavingsBreakdown,
    /// Every detected waste is assumed removable, so this is always 100.
    pub optimized_score: u8,
    pub optimized_sub_scores: SubScores,
    pub total_cost: f64,
    pub optimized_cost: f64,
    pub severity_counts: SeverityCounts,
    pub top_issues: Vec<String>,
    /// Accepted findings, each annotated with its dollar `savings`.
    pub findings: Findings,
}

impl EfficiencyScore {
    /// Result for a workflow with nothing to score.
    pub fn perfect() -> Self {
        Self {
            score: 100,
            grade: Grade::A,
            sub_scores: SubScores::PERFECT,
            savings_breakdown: SavingsBreakdown::default(),
            optimized_score: 100,
            optimized_sub_scores: SubScores::PERFECT,
            total_cost: 0.0,
            optimized_cost: 0.0,
            severity_counts: SeverityCounts::default(),
            top_issues: Vec::new(),
            findings: Findings::default(),
        }
    }
}

/// Reconciles findings against calls and produces an [`EfficiencyScore`].
#[derive(Debug, Clone)]
pub struct EfficiencyScorer {
    min_confidence: f64,
    confidence_weighted: bool,
    pricing: PricingTable,
}

impl Default for EfficiencyScorer {
    fn default() -> Self {
        Self {
            min_confidence: MIN_CONFIDENCE_FLOOR,
            confidence_weighted: false,
            pricing: PricingTable::builtin(),
        }
    }
}

impl EfficiencyScorer {
    pub fn new() -> Self {
        Self::default()
    }

    /// A `min_confidence` below [`MIN_CONFIDENCE_FLOOR`] is raised to it.
    pub fn from_config(config: &AgentScoreConfig) -> Self {
        let configured = config.scoring.min_confidence;
        if configured < MIN_CONFIDENCE_FLOOR {
            tracing::warn!(configured, floor = MIN_CONFIDENCE_FLOOR, "min_confidence below floor, using floor");
        }
        Self {
            min_confidence: configured.max(MIN_CONFIDENCE_FLOOR),
            confidence_weighted: config.scoring.confidence_weighted,
            pricing: config.pricing_table(),
        }
    }

    /// Score a workflow's calls against a set of findings.
    ///
    /// Pure over its inputs; findings below the confidence threshold and
    /// references that resolve to no call are ignored.
    pub fn score(&self, findings: &Findings, calls: &[Call]) -> EfficiencyScore {
        if calls.is_empty() {
            return EfficiencyScore::perfect();
        }

        let resolver = CallResolver::new(calls);
        let mut accepted = Findings {
            redundancies: self.accept(&findings.redundancies),
            model_overkill: self.accept(&findings.model_overkill),
            prompt_bloat: self.accept(&findings.prompt_bloat),
            summary_top_issues: findings.summary_top_issues.clone(),
        };

        let mut redundancy_waste = 0.0;
        for finding in &mut accepted.redundancies {
            let waste = redundancy_waste_of(&resolver, finding);
            finding.savings = Some(round_to(waste, 6));
            redundancy_waste += self.weighted(waste, finding.confidence);
        }

        let mut overkill_waste = 0.0;
        for finding in &mut accepted.model_overkill {
            let waste = match (resolver.resolve(&finding.call_id), finding.recommended_model.as_deref()) {
                (Some(call), Some(recommended)) => self.overkill_waste_of(call, recommended),
                _ => 0.0,
            };
            finding.savings = Some(round_to(waste, 6));
            overkill_waste += self.weighted(waste, finding.confidence);
        }

        let mut bloat_waste = 0.0;
        for finding in &mut accepted.prompt_bloat {
            let waste = match resolver.resolve(&finding.call_id) {
                Some(call) if call.tokens_in > finding.estimated_necessary_tokens => {
                    let excess = call.tokens_in - finding.estimated_necessary_tokens;
                    self.pricing.cost(&call.model, excess, 0)
                }
                _ => 0.0,
            };
            finding.savings = Some(round_to(waste, 6));
            bloat_waste += self.weighted(waste, finding.confidence);
        }

        let total_cost = calls.iter().map(|c| c.cost).sum::<f64>().max(MIN_TOTAL_COST);
        let total_waste = redundancy_waste + overkill_waste + bloat_waste;
        let optimized_cost = (total_cost - total_waste).max(0.0);
        let score = percentage(optimized_cost / total_cost);

        let sub_scores = SubScores {
            redundancy: 100 - percentage(redundancy_waste / total_cost),
            model_fit: 100 - percentage(overkill_waste / total_cost),
            context_efficiency: 100 - percentage(bloat_waste / total_cost),
        };

        let mut severity_counts = SeverityCounts::default();
        accepted.redundancies.iter().for_each(|f| severity_counts.add(f.severity()));
        accepted.model_overkill.iter().for_each(|f| severity_counts.add(f.severity()));
        accepted.prompt_bloat.iter().for_each(|f| severity_counts.add(f.severity()));

        let top_issues = top_issues(&accepted, &resolver, redundancy_waste);

        tracing::debug!(
            score,
            total_cost,
            total_waste,
            findings = accepted.len(),
            "efficiency score computed"
        );

        EfficiencyScore {
            score,
            grade: Grade::from_score(score),
            sub_scores,
            savings_breakdown: SavingsBreakdown {
                redundancy_savings: round_to(redundancy_waste, 6),
                model_fit_savings: round_to(overkill_waste, 6),
                context_efficiency_savings: round_to(bloat_waste, 6),
                total_savings: round_to(total_waste, 6),
            },
            optimized_score: 100,
            optimized_sub_scores: SubScores::PERFECT,
            total_cost: round_to(total_cost, 6),
            optimized_cost: round_to(optimized_cost, 6),
            severity_counts,
            top_issues,
            findings: accepted,
        }
    }

    fn accept<T: Finding + Clone>(&self, items: &[T]) -> Vec<T> {
        items
            .iter()
            .filter(|f| f.confidence() >= self.min_confidence)
            .cloned()
            .collect()
    }

    fn weighted(&self, waste: f64, confidence: f64) -> f64 {
        if self.confidence_weighted {
            waste * confidence.clamp(0.0, 1.0)
        } else {
            waste
        }
    }

    /// Price difference between the model the call actually used and the
    /// recommended one, never negative. A call whose model is not in the
    /// price list falls back to its recorded cost.
    fn overkill_waste_of(&self, call: &Call, recommended: &str) -> f64 {
        let actual = if self.pricing.rates(&call.model).is_some() {
            self.pricing.cost(&call.model, call.tokens_in, call.tokens_out)
        } else {
            call.cost
        };
        let cheaper = self.pricing.cost(recommended, call.tokens_in, call.tokens_out);
        (actual - cheaper).max(0.0)
    }
}

/// Cost of every duplicate in a redundancy group except the kept call.
/// Each call counts once per group.
fn redundancy_waste_of(resolver: &CallResolver<'_>, finding: &findings::RedundancyFinding) -> f64 {
    let keep_ref = finding.keep_call_id.as_ref().or(finding.call_ids.first());
    let kept_id = keep_ref.and_then(|r| resolver.resolve(r)).map(|c| c.id.as_str());

    let candidates = match &finding.duplicate_call_ids {
        Some(duplicates) if !duplicates.is_empty() => duplicates.as_slice(),
        _ => finding.call_ids.as_slice(),
    };

    let mut seen: HashSet<&str> = HashSet::new();
    let mut waste = 0.0;
    for reference in candidates.iter().filter(|r| Some(*r) != keep_ref) {
        let Some(call) = resolver.resolve(reference) else {
            continue;
        };
        let id = call.id.as_str();
        if Some(id) != kept_id && seen.insert(id) {
            waste += call.cost;
        }
    }
    waste
}

/// `round(100 * ratio)` clamped to [0, 100].
fn percentage(ratio: f64) -> u8 {
    (ratio * 100.0).round().clamp(0.0, 100.0) as u8
}

fn top_issues(accepted: &Findings, resolver: &CallResolver<'_>, redundancy_waste: f64) -> Vec<String> {
    if !accepted.summary_top_issues.is_empty() {
        return accepted
            .summary_top_issues
            .iter()
            .take(MAX_TOP_ISSUES)
            .cloned()
            .collect();
    }

    let mut issues = Vec::new();

    if !accepted.redundancies.is_empty() {
        issues.push(format!(
            "{} redundant call group(s) costing ${:.4}",
            accepted.redundancies.len(),
            redundancy_waste
        ));
    }

    if !accepted.model_overkill.is_empty() {
        let mut by_model: HashMap<String, usize> = HashMap::new();
        for finding in &accepted.model_overkill {
            let model = resolver
                .resolve(&finding.call_id)
                .map(|c| c.model.clone())
                .or_else(|| finding.current_model.clone())
                .unwrap_or_else(|| "an oversized model".to_string());
            *by_model.entry(model).or_default() += 1;
        }
        if let Some((model, _)) = by_model.into_iter().max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(&a.0))) {
            issues.push(format!(
                "{} call(s) using {} for simple tasks; switch to a cheaper model",
                accepted.model_overkill.len(),
                model
            ));
        }
    }

    let excess_tokens: u64 = accepted
        .prompt_bloat
        .iter()
        .filter_map(|f| {
            resolver
                .resolve(&f.call_id)
                .map(|c| c.tokens_in.saturating_sub(f.estimated_necessary_tokens))
        })
        .sum();
    if excess_tokens > 0 {
        issues.push(format!(
            "{} unnecessary prompt tokens across {} call(s)",
            excess_tokens,
            accepted.prompt_bloat.len()
        ));
    }

    issues.truncate(MAX_TOP_ISSUES);
    issues
}

/// Score with default settings and the built-in price list.
pub fn score_workflow(findings: &Findings, calls: &[Call]) -> EfficiencyScore {
    EfficiencyScorer::new().score(findings, calls)
}
