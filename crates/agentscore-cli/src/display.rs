use agentscore_core::analyzer::report::{format_cost, format_latency, WorkflowReport};
use agentscore_core::delivery::DeliveryOutcome;
use agentscore_core::pricing::ModelRates;
use agentscore_core::scoring::findings::{Finding, Severity};
use agentscore_core::scoring::grade::Grade;
use agentscore_core::scoring::EfficiencyScore;
use agentscore_core::NodeType;
use colored::*;
use std::path::Path;

/// Print a full workflow analysis to the terminal.
pub fn print_workflow_report(file: &Path, report: &WorkflowReport) {
    println!();
    println!(
        "{}",
        format!(
            " AgentScore v{} — Analyzing {}",
            env!("CARGO_PKG_VERSION"),
            file.display()
        )
        .bold()
    );
    println!();

    println!(" {}", "Workflow".bold().underline());
    println!(" {} {}", "|-".dimmed(), report.display_name().cyan());
    println!(
        " {} {} calls, {} edges",
        "|-".dimmed(),
        report.call_count,
        report.edge_count
    );
    println!(
        " {} Total cost: {} ({} tokens)",
        "|-".dimmed(),
        format_cost(report.total_cost),
        report.total_tokens
    );
    if let Some(output) = &report.graph.intended_output {
        println!(" {} Intended output: {}", "|-".dimmed(), output.blue());
    }
    println!();

    println!(" {}", "=".repeat(60).dimmed());
    println!();

    println!(" {}", "Calls".bold().underline());
    for call in &report.calls {
        let tag = match call.node_type {
            NodeType::Dead => " DEAD ".on_red().white().bold().to_string(),
            NodeType::Critical => " CRIT ".on_yellow().black().bold().to_string(),
            NodeType::Normal => "      ".to_string(),
        };
        println!(
            " {} {:<24} {:<22} {:>8} {:>12}",
            tag,
            call.id,
            call.model.dimmed(),
            format_latency(call.latency_ms),
            format_cost(call.cost)
        );
    }
    println!();

    println!(" {}", "=".repeat(60).dimmed());
    println!();

    println!(" {}", "Graph".bold().underline());
    if report.graph.cycle_detected {
        println!(
            " {} {} cycle detected, critical path reduced to the slowest call",
            "|-".dimmed(),
            "WARN".yellow().bold()
        );
    }
    println!(
        " {} Critical path: {} ({}, {} calls)",
        "|-".dimmed(),
        report.graph.critical_path.join(" -> "),
        format_latency(report.graph.critical_path_latency_ms),
        report.critical_count()
    );

    if report.dead_count() == 0 {
        println!(" {} {} No dead branches", "|-".dimmed(), "OK".green().bold());
    } else {
        println!(
            " {} Dead calls: {} costing {} ({:.1}% of spend)",
            "|-".dimmed(),
            report.dead_count().to_string().red().bold(),
            format_cost(report.graph.dead_branch_cost).red(),
            report.dead_cost_pct()
        );
    }
    println!(
        " {} Information efficiency: {:.2}",
        "|-".dimmed(),
        report.graph.information_efficiency
    );
    println!();

    if let Some(score) = &report.efficiency {
        print_score_body(score);
    }
}

/// Print an efficiency score on its own.
pub fn print_efficiency_score(workflow_id: &str, score: &EfficiencyScore) {
    println!();
    println!(
        "{}",
        format!(" AgentScore v{} — Scoring {}", env!("CARGO_PKG_VERSION"), workflow_id).bold()
    );
    println!();
    print_score_body(score);
}

fn grade_colored(grade: Grade, text: String) -> ColoredString {
    match grade {
        Grade::A => text.green().bold(),
        Grade::B => text.cyan().bold(),
        Grade::C => text.yellow().bold(),
        Grade::D | Grade::F => text.red().bold(),
    }
}

fn severity_tag(severity: Severity) -> String {
    let label = format!(" {} ", severity.symbol());
    match severity {
        Severity::High => label.on_red().white().bold().to_string(),
        Severity::Medium => label.on_yellow().black().bold().to_string(),
        Severity::Low => label.dimmed().to_string(),
    }
}

fn print_score_body(score: &EfficiencyScore) {
    println!(" {}", "Efficiency".bold().underline());
    println!(
        " {} Score: {} {} ({})",
        "|-".dimmed(),
        score.grade.emoji(),
        grade_colored(score.grade, format!("{}/100, grade {}", score.score, score.grade.label())),
        score.grade.description().cyan()
    );
    println!(
        " {} Redundancy {} | Model fit {} | Context {}",
        "|-".dimmed(),
        score.sub_scores.redundancy,
        score.sub_scores.model_fit,
        score.sub_scores.context_efficiency
    );
    println!(
        " {} Cost: {} -> {} optimized (save {})",
        "|-".dimmed(),
        format_cost(score.total_cost),
        format_cost(score.optimized_cost).green(),
        format_cost(score.savings_breakdown.total_savings).green()
    );
    println!(
        " {} Findings: {} high, {} medium, {} low",
        "|-".dimmed(),
        if score.severity_counts.high > 0 {
            score.severity_counts.high.to_string().red().bold().to_string()
        } else {
            "0".to_string()
        },
        score.severity_counts.medium,
        score.severity_counts.low
    );
    println!();

    let findings = &score.findings;
    for finding in &findings.redundancies {
        print_finding(
            finding.severity(),
            &format!("Redundant calls: {}", join_refs(&finding.call_ids)),
            finding.reason.as_deref(),
            finding.savings,
            finding.confidence(),
        );
    }
    for finding in &findings.model_overkill {
        let title = match &finding.recommended_model {
            Some(model) => format!("Model overkill on {}: use {}", finding.call_id, model),
            None => format!("Model overkill on {}", finding.call_id),
        };
        print_finding(
            finding.severity(),
            &title,
            finding.reason.as_deref(),
            finding.savings,
            finding.confidence(),
        );
    }
    for finding in &findings.prompt_bloat {
        print_finding(
            finding.severity(),
            &format!(
                "Prompt bloat on {}: ~{} tokens needed",
                finding.call_id, finding.estimated_necessary_tokens
            ),
            finding.unnecessary_content.as_deref(),
            finding.savings,
            finding.confidence(),
        );
    }

    if !score.top_issues.is_empty() {
        println!(" {}", "Top issues".bold().underline());
        for (i, issue) in score.top_issues.iter().enumerate() {
            println!(" {} {}. {}", "|-".dimmed(), i + 1, issue);
        }
        println!();
    }
}

fn join_refs<T: std::fmt::Display>(refs: &[T]) -> String {
    refs.iter().map(|r| r.to_string()).collect::<Vec<_>>().join(", ")
}

fn print_finding(severity: Severity, title: &str, detail: Option<&str>, savings: Option<f64>, confidence: f64) {
    println!(" {} {}", severity_tag(severity), title.bold());
    if let Some(detail) = detail {
        println!("   {} {}", "|".dimmed(), detail);
    }
    if let Some(savings) = savings {
        println!("   {} Savings: {}", "|".dimmed(), format_cost(savings).green());
    }
    println!("   {} Confidence: {:.0}%", "|".dimmed(), confidence * 100.0);
    println!();
}

/// Print the price of a single call.
pub fn print_call_cost(model: &str, tokens_in: u64, tokens_out: u64, cost: f64, rates: Option<ModelRates>) {
    println!();
    println!(" {}", "Call Cost".bold().underline());
    println!(" {} Model: {}", "|-".dimmed(), model.cyan());
    println!(" {} Tokens: {} in / {} out", "|-".dimmed(), tokens_in, tokens_out);
    match rates {
        Some(rates) => println!(
            " {} Rates: ${}/M in, ${}/M out",
            "|-".dimmed(),
            rates.input,
            rates.output
        ),
        None => println!(" {} {} unknown model, priced at zero", "|-".dimmed(), "WARN".yellow().bold()),
    }
    println!(" {} Cost: {}", "|-".dimmed(), format_cost(cost).bold());
    println!();
}

/// Print per-call delivery outcomes and a tally.
pub fn print_delivery_summary(endpoint: &str, outcomes: &[(String, DeliveryOutcome)]) {
    println!();
    println!(" {} {}", "Delivering to".bold(), endpoint.cyan());
    for (call_id, outcome) in outcomes {
        let status = match outcome {
            DeliveryOutcome::Delivered => "sent".green().to_string(),
            DeliveryOutcome::Rejected(code) => format!("rejected ({})", code).red().to_string(),
            DeliveryOutcome::Failed(error) => format!("failed: {}", error).red().to_string(),
            DeliveryOutcome::TimedOut => "timed out".yellow().to_string(),
        };
        println!(" {} {:<24} {}", "|-".dimmed(), call_id, status);
    }

    let delivered = outcomes.iter().filter(|(_, o)| o.is_delivered()).count();
    println!();
    println!(
        " {}/{} events delivered",
        if delivered == outcomes.len() {
            delivered.to_string().green().bold()
        } else {
            delivered.to_string().yellow().bold()
        },
        outcomes.len()
    );
    println!();
}
