use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use gilcore::{ExecutionEvent, NodeEvent, PortValues, Value, WorkflowConfig};
use gilruntime::{GilRuntime, NodeRegistry, RuntimeConfig};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "gil")]
#[command(about = "Gil workflow engine CLI", long_about = None)]
struct Cli {
    /// Show debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a workflow file
    Run {
        /// Path to workflow YAML (or .json) file
        file: PathBuf,

        /// Workflow input as key=value; values that parse as JSON keep their type
        #[arg(short, long = "input", value_name = "KEY=VALUE")]
        inputs: Vec<String>,

        /// Workflow inputs as one JSON object
        #[arg(long)]
        input_json: Option<String>,

        /// Write the result JSON to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Abort on the first node failure
        #[arg(long)]
        strict: bool,

        /// Per-node timeout in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
    },

    /// Validate a workflow file
    Validate {
        file: PathBuf,
    },

    /// Print a Mermaid diagram of a workflow
    Visualize {
        file: PathBuf,

        /// Also write the diagram to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List available node types
    Nodes,

    /// Show ports and description of a node type
    Describe {
        node_type: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Run {
            file,
            inputs,
            input_json,
            output,
            strict,
            timeout_ms,
        } => {
            let mut config = RuntimeConfig::default();
            if strict {
                config = config.strict();
            }
            if let Some(millis) = timeout_ms {
                config = config.with_node_timeout_ms(millis);
            }
            let inputs = parse_inputs(&inputs, input_json.as_deref())?;
            run_workflow(&file, inputs, output.as_deref(), config).await?;
        }

        Commands::Validate { file } => validate_workflow(&file)?,

        Commands::Visualize { file, output } => visualize_workflow(&file, output.as_deref())?,

        Commands::Nodes => list_nodes(),

        Commands::Describe { node_type } => describe_node(&node_type)?,
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn runtime(config: RuntimeConfig) -> GilRuntime {
    let mut registry = NodeRegistry::new();
    gilnodes::register_all(&mut registry);
    GilRuntime::with_registry(Arc::new(registry), config)
}

fn load(file: &Path) -> Result<WorkflowConfig> {
    WorkflowConfig::from_path(file).with_context(|| format!("failed to load workflow {}", file.display()))
}

/// `--input-json` first, then each `--input key=value` on top.
fn parse_inputs(pairs: &[String], json: Option<&str>) -> Result<PortValues> {
    let mut inputs = PortValues::new();

    if let Some(json) = json {
        let parsed: serde_json::Value = serde_json::from_str(json).context("--input-json is not valid JSON")?;
        match Value::from(parsed) {
            Value::Object(map) => inputs.extend(map),
            _ => bail!("--input-json must be a JSON object"),
        }
    }

    for pair in pairs {
        let (key, raw) = pair
            .split_once('=')
            .ok_or_else(|| anyhow!("input '{}' is not in key=value form", pair))?;
        let value = serde_json::from_str::<serde_json::Value>(raw.trim())
            .map(Value::from)
            .unwrap_or_else(|_| Value::from(raw.trim()));
        inputs.insert(key.trim().to_string(), value);
    }

    Ok(inputs)
}

async fn run_workflow(
    file: &Path,
    inputs: PortValues,
    output: Option<&Path>,
    config: RuntimeConfig,
) -> Result<()> {
    let workflow = load(file)?;
    let runtime = runtime(config);

    eprintln!("Workflow: {} ({} nodes)", workflow.name, workflow.nodes.len());

    let mut events = runtime.subscribe_events();
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(ExecutionEvent::WorkflowStarted { execution_order, .. }) => {
                    eprintln!("Execution order: {}", execution_order.join(" -> "));
                }
                Ok(ExecutionEvent::NodeStarted { node_id, node_type, .. }) => {
                    eprintln!("  > {} ({})", node_id, node_type);
                }
                Ok(ExecutionEvent::NodeCompleted { node_id, duration_ms, .. }) => {
                    eprintln!("  ok {} in {}ms", node_id, duration_ms);
                }
                Ok(ExecutionEvent::NodeFailed { node_id, error, .. }) => {
                    eprintln!("  FAILED {}: {}", node_id, error);
                }
                Ok(ExecutionEvent::NodeEvent { node_id, event, .. }) => match event {
                    NodeEvent::Info { message } => eprintln!("    [{}] {}", node_id, message),
                    NodeEvent::Warning { message } => eprintln!("    [{}] warning: {}", node_id, message),
                },
                Ok(ExecutionEvent::WorkflowCompleted { failed_nodes, duration_ms, .. }) => {
                    eprintln!("Finished in {}ms, {} failed node(s)", duration_ms, failed_nodes);
                    break;
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event printer fell behind");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let result = match runtime.execute(&workflow, inputs).await {
        Ok(result) => result,
        Err(e) => {
            printer.abort();
            return Err(e.into());
        }
    };
    let _ = printer.await;

    let json = serde_json::to_string_pretty(&result.to_json()?)?;
    match output {
        Some(path) => {
            std::fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
            eprintln!("Result written to {}", path.display());
        }
        None => println!("{}", json),
    }

    Ok(())
}

fn validate_workflow(file: &Path) -> Result<()> {
    let workflow = load(file)?;
    let runtime = runtime(RuntimeConfig::default());
    let report = runtime.validate(&workflow);

    for warning in &report.warnings {
        println!("warning: {}", warning);
    }

    if !report.valid {
        for error in &report.errors {
            println!("error: {}", error);
        }
        bail!("workflow '{}' is invalid", workflow.name);
    }

    let graph = runtime.graph(&workflow)?;
    println!("Workflow '{}' is valid", workflow.name);
    println!("  Nodes: {}", graph.len());
    println!("  Connections: {}", graph.connections().count());
    println!("  Execution order: {}", graph.execution_order()?.join(" -> "));
    Ok(())
}

fn visualize_workflow(file: &Path, output: Option<&Path>) -> Result<()> {
    let workflow = load(file)?;
    let diagram = runtime(RuntimeConfig::default()).graph(&workflow)?.to_mermaid();

    if let Some(path) = output {
        std::fs::write(path, &diagram).with_context(|| format!("failed to write {}", path.display()))?;
        eprintln!("Diagram written to {}", path.display());
    }
    println!("{}", diagram);
    Ok(())
}

fn list_nodes() {
    let runtime = runtime(RuntimeConfig::default());
    let node_types = runtime.list_nodes();
    println!("Available node types ({}):", node_types.len());

    for node_type in node_types {
        match runtime.describe_node(&node_type) {
            Ok(description) => {
                println!("  {} ({})", node_type, description.category);
                println!("    {}", description.description);
            }
            Err(_) => println!("  {}", node_type),
        }
    }
}

fn describe_node(node_type: &str) -> Result<()> {
    let description = runtime(RuntimeConfig::default()).describe_node(node_type)?;
    println!("{}", serde_json::to_string_pretty(&description)?);
    Ok(())
}
