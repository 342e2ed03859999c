mod display;

use agentscore_core::analyzer;
use agentscore_core::analyzer::graph_metrics::compute_metrics;
use agentscore_core::config::{load_config, AgentScoreConfig};
use agentscore_core::delivery::EventSender;
use agentscore_core::export;
use agentscore_core::ingest::middleware::{DemoPricing, MiddlewareChain};
use agentscore_core::scoring::findings::Findings;
use agentscore_core::scoring::EfficiencyScorer;
use agentscore_core::trace::graph::WorkflowGraph;
use agentscore_core::trace::loader::TraceLoader;
use agentscore_core::{CallRecord, PricingTable};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "agentscore",
    version,
    about = "AgentScore — cost and dataflow analysis for LLM agent workflows",
    long_about = "Reconstruct the dataflow graph of an agent workflow from its recorded calls, \
        find dead branches and the critical path, and score how much of the spend was necessary."
)]
struct Cli {
    /// Configuration file (defaults to .agentscore/config.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, ValueEnum)]
enum GraphFormat {
    Mermaid,
    Dot,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze workflow traces: dead branches, critical path, information efficiency
    Analyze {
        /// Trace file or directory containing trace files
        path: PathBuf,

        /// Findings JSON to score the workflow against
        #[arg(long)]
        findings: Option<PathBuf>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Score a workflow's cost efficiency from findings
    Score {
        /// Trace file
        trace: PathBuf,

        /// Findings JSON file
        findings: PathBuf,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Price a single call
    Cost {
        /// Model name, e.g. gpt-4o or gemini-2.5-flash
        model: String,

        /// Input tokens
        tokens_in: u64,

        /// Output tokens
        tokens_out: u64,
    },

    /// Render a workflow graph as Mermaid or Graphviz DOT
    Graph {
        /// Trace file
        trace: PathBuf,

        /// Diagram format
        #[arg(short, long, value_enum, default_value = "mermaid")]
        format: GraphFormat,
    },

    /// Deliver a trace's calls to an ingestion backend
    Send {
        /// Trace file
        trace: PathBuf,

        /// Backend base URL (overrides config and AGENTSCORE_BACKEND_URL)
        #[arg(long)]
        backend: Option<String>,

        /// Tag every model with the demo suffix before sending
        #[arg(long)]
        demo: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = resolve_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Analyze { path, findings, format } => {
            cmd_analyze(&path, findings.as_deref(), format, &config)
        }
        Commands::Score { trace, findings, format } => cmd_score(&trace, &findings, format, &config),
        Commands::Cost { model, tokens_in, tokens_out } => {
            cmd_cost(&model, tokens_in, tokens_out, &config);
            Ok(())
        }
        Commands::Graph { trace, format } => cmd_graph(&trace, format, &config),
        Commands::Send { trace, backend, demo } => cmd_send(&trace, backend, demo, &config),
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn resolve_config(path: Option<&Path>) -> Result<AgentScoreConfig> {
    match path {
        Some(path) => {
            let mut config = load_config(path)?;
            config.apply_env();
            Ok(config)
        }
        None => {
            let cwd = std::env::current_dir().context("Failed to read current directory")?;
            AgentScoreConfig::discover(&cwd)
        }
    }
}

fn discover_trace_files(path: &Path) -> Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }

    if path.is_dir() {
        let pattern = format!("{}/**/*.json", path.display());
        let mut files: Vec<PathBuf> = glob::glob(&pattern)
            .context("Failed to read glob pattern")?
            .filter_map(|r| r.ok())
            .collect();
        files.sort();
        return Ok(files);
    }

    anyhow::bail!("Path '{}' does not exist", path.display());
}

fn load_findings(path: &Path) -> Result<Findings> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read findings file: {}", path.display()))?;
    Findings::from_json(&content).with_context(|| format!("Invalid findings file: {}", path.display()))
}

fn cmd_analyze(path: &Path, findings: Option<&Path>, format: OutputFormat, config: &AgentScoreConfig) -> Result<()> {
    let files = discover_trace_files(path)?;

    if files.is_empty() {
        anyhow::bail!(
            "No trace files found at '{}'. \
            Make sure the path points to a JSON trace file or a directory of them.",
            path.display()
        );
    }

    let findings = findings.map(load_findings).transpose()?;
    let loader = TraceLoader::from_config(config);

    let mut reports = Vec::with_capacity(files.len());
    for file in &files {
        let workflow = loader
            .parse_file(file)
            .with_context(|| format!("Failed to load {}", file.display()))?;
        reports.push(analyzer::analyze(&workflow, findings.as_ref(), config));
    }

    match format {
        OutputFormat::Json => {
            let json = if reports.len() == 1 {
                serde_json::to_string_pretty(&reports[0])?
            } else {
                serde_json::to_string_pretty(&reports)?
            };
            println!("{}", json);
        }
        OutputFormat::Text => {
            for (file, report) in files.iter().zip(&reports) {
                display::print_workflow_report(file, report);
            }
        }
    }

    Ok(())
}

fn cmd_score(trace: &Path, findings: &Path, format: OutputFormat, config: &AgentScoreConfig) -> Result<()> {
    let workflow = TraceLoader::from_config(config).parse_file(trace)?;
    let findings = load_findings(findings)?;
    let score = EfficiencyScorer::from_config(config).score(&findings, &workflow.calls);

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&score)?),
        OutputFormat::Text => display::print_efficiency_score(&workflow.id, &score),
    }
    Ok(())
}

fn cmd_cost(model: &str, tokens_in: u64, tokens_out: u64, config: &AgentScoreConfig) {
    let table: PricingTable = config.pricing_table();
    let cost = table.cost(model, tokens_in, tokens_out);
    display::print_call_cost(model, tokens_in, tokens_out, cost, table.rates(model));
}

fn cmd_graph(trace: &Path, format: GraphFormat, config: &AgentScoreConfig) -> Result<()> {
    let workflow = TraceLoader::from_config(config).parse_file(trace)?;
    let graph = WorkflowGraph::from_workflow(&workflow);
    let metrics = compute_metrics(&graph, &config.graph.intended_output);

    let rendered = match format {
        GraphFormat::Mermaid => export::to_mermaid(&graph, &metrics),
        GraphFormat::Dot => export::to_dot(&graph, &metrics),
    };
    println!("{}", rendered);
    Ok(())
}

/// Re-read the trace as raw records so the backend receives what was recorded,
/// not locally priced calls.
fn raw_records(trace: &Path) -> Result<(String, Vec<CallRecord>)> {
    let content = std::fs::read_to_string(trace)
        .with_context(|| format!("Failed to read trace file: {}", trace.display()))?;
    let value: serde_json::Value = serde_json::from_str(&content).context("Failed to parse trace JSON")?;

    let workflow_id = ["workflowId", "workflow_id", "id"]
        .iter()
        .find_map(|key| value.get(*key).and_then(|v| v.as_str()))
        .unwrap_or_default()
        .to_string();
    let calls = value.get("calls").cloned().unwrap_or_else(|| serde_json::json!([]));
    let records: Vec<CallRecord> = serde_json::from_value(calls).context("Failed to parse trace calls")?;
    Ok((workflow_id, records))
}

fn cmd_send(trace: &Path, backend: Option<String>, demo: bool, config: &AgentScoreConfig) -> Result<()> {
    let (workflow_id, records) = raw_records(trace)?;
    if records.is_empty() {
        anyhow::bail!("Trace '{}' has no calls to send", trace.display());
    }

    let backend_url = backend.unwrap_or_else(|| config.delivery.backend_url.clone());
    let sender = EventSender::new(&backend_url, Duration::from_secs(config.delivery.timeout_secs))?;

    let middleware = if demo {
        MiddlewareChain::new().with(DemoPricing)
    } else {
        MiddlewareChain::new()
    };

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    let outcomes = runtime.block_on(async {
        let mut outcomes = Vec::with_capacity(records.len());
        for mut record in records {
            if record.workflow_id.is_empty() {
                record.workflow_id = workflow_id.clone();
            }
            let record = middleware.apply(record);
            let outcome = sender.send(&record).await;
            outcomes.push((record.id, outcome));
        }
        outcomes
    });

    display::print_delivery_summary(sender.endpoint(), &outcomes);
    Ok(())
}
