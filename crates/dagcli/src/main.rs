// crates/dagcli/src/main.rs

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use dagcore::{
    ExecutionEvent, NodeEvent, NodeOutput, NodeSpec, RunOutcome, RunReport, RunRequest,
    RunSnapshot, TaskStatus, Value, WorkflowDefinition, INPUT_NODE_TYPE, OUTPUT_NODE_TYPE,
};
use dagnodes::{CONDITIONAL_NODE_TYPE, HUMAN_NODE_TYPE};
use dagruntime::{FlowRuntime, NodeRegistry, RuntimeConfig};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "dag")]
#[command(about = "DAG workflow engine CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a workflow file
    Run {
        /// Path to workflow JSON file
        #[arg(short, long)]
        file: PathBuf,

        /// Input data as JSON object
        #[arg(short, long)]
        input: Option<String>,

        /// Only run these nodes (and their ancestors)
        #[arg(short, long, value_delimiter = ',')]
        nodes: Option<Vec<String>>,

        /// Where to write the run snapshot
        #[arg(short, long)]
        snapshot: Option<PathBuf>,

        /// Show verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Continue a paused run from its snapshot
    Resume {
        /// Path to workflow JSON file
        #[arg(short, long)]
        file: PathBuf,

        /// Snapshot written by `run`; overwritten with the new state
        #[arg(short, long)]
        snapshot: PathBuf,

        /// Input data as JSON object
        #[arg(short, long)]
        input: Option<String>,

        /// Value for a paused node: `node=JSON`. Nested nodes use
        /// `outer/inner=JSON`.
        #[arg(long)]
        supply: Vec<String>,

        /// Show verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Validate a workflow file
    Validate {
        /// Path to workflow JSON file
        file: PathBuf,
    },

    /// List available node types
    Nodes,

    /// Create a new example workflow
    Init {
        /// Output file path
        #[arg(short, long, default_value = "workflow.json")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            file,
            input,
            nodes,
            snapshot,
            verbose,
        } => {
            init_logging(verbose);
            run_workflow(file, input, nodes, snapshot).await?;
        }

        Commands::Resume {
            file,
            snapshot,
            input,
            supply,
            verbose,
        } => {
            init_logging(verbose);
            resume_workflow(file, snapshot, input, supply).await?;
        }

        Commands::Validate { file } => {
            validate_workflow(file)?;
        }

        Commands::Nodes => {
            list_nodes();
        }

        Commands::Init { output } => {
            create_example_workflow(output)?;
        }
    }

    Ok(())
}

/// `RUST_LOG` wins over the verbosity flag
fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .init();
}

fn registry() -> Arc<NodeRegistry> {
    Arc::new(dagnodes::standard_registry())
}

fn load_workflow(file: &Path) -> Result<WorkflowDefinition> {
    let workflow_json = std::fs::read_to_string(file)
        .with_context(|| format!("reading workflow {}", file.display()))?;
    serde_json::from_str(&workflow_json)
        .with_context(|| format!("parsing workflow {}", file.display()))
}

/// Parse a JSON object into a field map
fn parse_fields(json: &str) -> Result<HashMap<String, Value>> {
    match serde_json::from_str::<serde_json::Value>(json)? {
        serde_json::Value::Object(obj) => Ok(obj
            .into_iter()
            .map(|(k, v)| (k, Value::from(v)))
            .collect()),
        _ => Err(anyhow!("Input must be a JSON object")),
    }
}

fn parse_input(input: Option<String>) -> Result<HashMap<String, Value>> {
    match input {
        Some(input_str) => parse_fields(&input_str),
        None => Ok(HashMap::new()),
    }
}

async fn run_workflow(
    file: PathBuf,
    input: Option<String>,
    nodes: Option<Vec<String>>,
    snapshot: Option<PathBuf>,
) -> Result<()> {
    println!("🚀 Loading workflow from: {}", file.display());

    let workflow = load_workflow(&file)?;
    println!("📋 Workflow: {}", workflow.name);
    println!("   Nodes: {}", workflow.nodes.len());
    println!("   Links: {}", workflow.links.len());
    println!();

    let mut request = RunRequest::new(parse_input(input)?);
    if let Some(nodes) = nodes {
        request = request.with_nodes(nodes);
    }

    let runtime = FlowRuntime::with_registry(registry(), RuntimeConfig::default());
    let executor = runtime.executor(workflow)?;

    let event_task = spawn_event_printer(&runtime);
    let report = executor.run(request).await?;
    finish_events(event_task).await;

    print_report(&report);
    save_snapshot(&report, snapshot.as_deref())?;
    Ok(())
}

async fn resume_workflow(
    file: PathBuf,
    snapshot_path: PathBuf,
    input: Option<String>,
    supply: Vec<String>,
) -> Result<()> {
    let workflow = load_workflow(&file)?;
    let snapshot_json = std::fs::read_to_string(&snapshot_path)
        .with_context(|| format!("reading snapshot {}", snapshot_path.display()))?;
    let mut snapshot: RunSnapshot = serde_json::from_str(&snapshot_json)?;

    for entry in &supply {
        let (path, value) = entry
            .split_once('=')
            .ok_or_else(|| anyhow!("--supply expects node=JSON, got '{}'", entry))?;
        let output = NodeOutput::from_fields(parse_fields(value)?);
        let path: Vec<&str> = path.split('/').collect();
        snapshot.supply_nested(&path, output)?;
        println!("✍️  Supplied value for {}", path.join("/"));
    }

    println!("🔁 Resuming workflow: {}", workflow.name);
    println!(
        "   Paused: {}  Blocked: {}",
        snapshot.paused.len(),
        snapshot.blocked.len()
    );
    println!();

    let runtime = FlowRuntime::with_registry(registry(), RuntimeConfig::default());
    let executor = runtime.executor(workflow)?;

    let event_task = spawn_event_printer(&runtime);
    let report = executor.resume(&snapshot, parse_input(input)?).await?;
    finish_events(event_task).await;

    print_report(&report);
    save_snapshot(&report, Some(snapshot_path.as_path()))?;
    Ok(())
}

fn spawn_event_printer(runtime: &FlowRuntime) -> tokio::task::JoinHandle<()> {
    let mut events = runtime.subscribe_events();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                ExecutionEvent::RunStarted { workflow, .. } => {
                    println!("▶️  Run of '{}' started", workflow);
                }
                ExecutionEvent::TaskCreated { node_id, .. } => {
                    println!("  ⚡ Starting node: {}", node_id);
                }
                ExecutionEvent::TaskUpdated {
                    node_id,
                    status,
                    error,
                    ..
                } => match status {
                    TaskStatus::Completed => println!("  ✅ Node {} completed", node_id),
                    TaskStatus::Paused => println!("  ⏸️  Node {} paused", node_id),
                    TaskStatus::Canceled => println!("  ⏭️  Node {} skipped", node_id),
                    TaskStatus::Pending => println!("  ⏳ Node {} waiting", node_id),
                    TaskStatus::Failed => println!(
                        "  ❌ Node {} failed: {}",
                        node_id,
                        error.unwrap_or_default()
                    ),
                    TaskStatus::Running => {}
                },
                ExecutionEvent::NodeEvent { node_id, event, .. } => match event {
                    NodeEvent::Info { message } => {
                        println!("     ℹ️  [{}] {}", node_id, message);
                    }
                    NodeEvent::Warning { message } => {
                        println!("     ⚠️  [{}] {}", node_id, message);
                    }
                    NodeEvent::Progress { percent, message } => {
                        if let Some(msg) = message {
                            println!("     📊 [{}] {}% - {}", node_id, percent, msg);
                        } else {
                            println!("     📊 [{}] {}%", node_id, percent);
                        }
                    }
                },
                ExecutionEvent::RunFinished {
                    outcome,
                    duration_ms,
                    ..
                } => match outcome {
                    RunOutcome::Completed => {
                        println!("✨ Run completed successfully in {}ms", duration_ms)
                    }
                    RunOutcome::Paused => println!("⏸️  Run paused after {}ms", duration_ms),
                    RunOutcome::Failed => println!("💥 Run failed after {}ms", duration_ms),
                },
            }
        }
    })
}

async fn finish_events(event_task: tokio::task::JoinHandle<()>) {
    // Wait for events to finish printing
    tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    event_task.abort();
}

fn print_report(report: &RunReport) {
    println!();
    println!("📊 Run Summary:");
    println!("   Run ID: {}", report.run_id);
    println!("   Outcome: {:?}", report.outcome);

    if !report.paused.is_empty() {
        println!();
        println!("⏸️  Waiting for input:");
        for (node_id, reason) in &report.paused {
            println!("   {}: {}", node_id, reason);
        }
    }

    if !report.failures.is_empty() {
        println!();
        println!("❌ Failures:");
        for failure in &report.failures {
            println!("   {}: {}", failure.node_id, failure.error);
        }
    }

    if !report.outputs.is_empty() {
        println!();
        println!("📤 Outputs:");
        let mut node_ids: Vec<_> = report.outputs.keys().collect();
        node_ids.sort();
        for node_id in node_ids {
            let outputs = &report.outputs[node_id].outputs;
            if !outputs.is_empty() {
                println!("   Node {}:", node_id);
                for (key, value) in outputs {
                    println!("     {}: {}", key, value.to_display_string());
                }
            }
        }
    }
}

fn save_snapshot(report: &RunReport, path: Option<&Path>) -> Result<()> {
    match path {
        Some(path) => {
            let json = serde_json::to_string_pretty(&report.snapshot())?;
            std::fs::write(path, json)?;
            println!();
            println!("💾 Snapshot written to {}", path.display());
        }
        None if report.is_paused() => {
            println!();
            println!("💡 Pass --snapshot to save this run for `dag resume`");
        }
        None => {}
    }
    Ok(())
}

fn validate_workflow(file: PathBuf) -> Result<()> {
    println!("🔍 Validating workflow: {}", file.display());

    let workflow = load_workflow(&file)?;
    let name = workflow.name.clone();
    let nodes = workflow.nodes.len();
    let links = workflow.links.len();

    let runtime = FlowRuntime::with_registry(registry(), RuntimeConfig::default());
    let executor = runtime.executor(workflow)?;

    println!("✅ Workflow is valid:");
    println!("   Name: {}", name);
    println!("   Nodes: {}", nodes);
    println!("   Links: {}", links);
    println!(
        "   Execution order: {}",
        executor.graph().topological_order().join(" → ")
    );

    Ok(())
}

fn list_nodes() {
    println!("📦 Available Node Types:");
    println!();

    let registry = registry();

    for node_type in registry.list_node_types() {
        if let Some(metadata) = registry.get_metadata(&node_type) {
            println!("  • {} ({})", node_type, metadata.category);
            println!("    {}", metadata.description);
        } else {
            println!("  • {}", node_type);
        }
    }
}

fn create_example_workflow(output: PathBuf) -> Result<()> {
    let mut workflow = WorkflowDefinition::new("Example Approval Workflow");
    workflow.description =
        Some("Routes large orders to a human reviewer before they are accepted".to_string());

    let branches = serde_json::json!([
        {"name": "auto"},
        {"name": "review", "conditions": [
            {"variable": "amount", "operator": "greater_than", "value": 1000}
        ]}
    ]);

    workflow.add_node(
        NodeSpec::new("order", INPUT_NODE_TYPE).with_fields([("amount", "number")]),
    );
    workflow.add_node(
        NodeSpec::new("route", CONDITIONAL_NODE_TYPE)
            .with_fields([("amount", "number")])
            .with_config("branches", branches),
    );
    workflow.add_node(
        NodeSpec::new("approve", HUMAN_NODE_TYPE)
            .with_fields([("review", "object")])
            .with_config("output_fields", serde_json::json!({"approved": "bool"}))
            .with_config("message", "Approve this order?"),
    );
    workflow.add_node(
        NodeSpec::new("accepted", "debug.log").with_fields([("auto", "object")]),
    );
    workflow.add_node(
        NodeSpec::new("result", OUTPUT_NODE_TYPE).with_fields([("approved", "bool")]),
    );

    workflow.connect("order", "amount", "route", "amount");
    workflow.connect("route", "review", "approve", "review");
    workflow.connect("route", "auto", "accepted", "auto");
    workflow.connect("approve", "approved", "result", "approved");

    let json = serde_json::to_string_pretty(&workflow)?;
    std::fs::write(&output, json)?;

    println!("✨ Created example workflow: {}", output.display());
    println!();
    println!("Run it with:");
    println!(
        "  dag run --file {} --input '{{\"amount\": 5000}}' --snapshot run.json",
        output.display()
    );
    println!("Then approve it with:");
    println!(
        "  dag resume --file {} --snapshot run.json --supply 'approve={{\"approved\": true}}'",
        output.display()
    );

    Ok(())
}
