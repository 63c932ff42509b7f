use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use flowpilot_core::config::{AppConfig, ToolsConfig};
use flowpilot_core::error::FlowError;
use flowpilot_engine::{
    planned_path, FirstEdgeRouter, JsonLinesPublisher, Orchestrator, StatePublisher, Workflow,
};
use flowpilot_tools::ToolRegistry;

#[derive(Parser)]
#[command(name = "flowpilot", version, about = "Run AI-agent workflow graphs")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "flowpilot.toml", env = "FLOWPILOT_CONFIG")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a workflow and stream state snapshots to stdout as JSON lines
    Run {
        /// Workflow JSON file
        workflow: PathBuf,
        /// Input for the entry node (read from stdin when omitted)
        #[arg(short, long)]
        input: Option<String>,
    },
    /// Check a workflow file and show the path a run would take
    Validate {
        /// Workflow JSON file
        workflow: PathBuf,
    },
    /// Print the tool declarations sent to the model
    Tools,
    /// Show current configuration
    Config,
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries the snapshot stream
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("flowpilot=info,warn")),
        )
        .with_writer(io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "flowpilot", &mut io::stdout());
        }
        Commands::Validate { workflow } => validate(&workflow, &cli.config)?,
        Commands::Tools => {
            let tools_config = match AppConfig::load(&cli.config) {
                Ok(config) => config.tools,
                Err(FlowError::ConfigNotFound(_)) => ToolsConfig::default(),
                Err(e) => return Err(e.into()),
            };
            let registry = ToolRegistry::with_builtins(&tools_config);
            println!("{}", serde_json::to_string_pretty(&registry.declarations())?);
        }
        Commands::Config => {
            let config = load_config(&cli.config)?;
            println!("{}", toml::to_string_pretty(&config.redacted())?);
        }
        Commands::Run { workflow, input } => {
            let config = load_config(&cli.config)?;
            let workflow = load_workflow(&workflow)?;
            let input = match input {
                Some(text) => text,
                None => read_stdin()?,
            };
            let succeeded = run_workflow(&config, &workflow, &input).await;
            if !succeeded {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    let config = AppConfig::load(path)
        .with_context(|| format!("failed to load config from {}", path.display()))?;
    info!(
        provider = %config.model.provider,
        model = %config.model.model_id,
        "Loaded config"
    );
    Ok(config)
}

fn load_workflow(path: &Path) -> anyhow::Result<Workflow> {
    let workflow = Workflow::load(path)
        .with_context(|| format!("failed to load workflow from {}", path.display()))?;
    workflow.validate()?;
    Ok(workflow)
}

fn read_stdin() -> anyhow::Result<String> {
    let mut input = String::new();
    io::stdin().read_to_string(&mut input)?;
    Ok(input.trim_end().to_string())
}

fn validate(workflow_path: &Path, config_path: &Path) -> anyhow::Result<()> {
    let workflow = load_workflow(workflow_path)?;
    let max_node_visits = match AppConfig::load(config_path) {
        Ok(config) => config.engine.max_node_visits,
        Err(_) => flowpilot_core::config::EngineConfig::default().max_node_visits,
    };

    let entry = workflow.entry_node()?;
    println!(
        "ok: {} nodes, {} edges, entry '{}'",
        workflow.nodes().len(),
        workflow.edges().len(),
        entry.id
    );

    let path = planned_path(&workflow, &FirstEdgeRouter, max_node_visits)?;
    let ids: Vec<&str> = path.iter().map(|n| n.id.as_str()).collect();
    println!("path: {}", ids.join(" -> "));

    if path.len() < workflow.nodes().len() {
        warn!(
            visited = path.len(),
            total = workflow.nodes().len(),
            "Some nodes are not on the execution path"
        );
    }
    Ok(())
}

/// Returns whether the run completed.
async fn run_workflow(config: &AppConfig, workflow: &Workflow, input: &str) -> bool {
    let gateway = Arc::new(flowpilot_llm::gateway_from_config(config));
    let tools = Arc::new(ToolRegistry::with_builtins(&config.tools));
    info!(tools = tools.len(), "Tool registry ready");

    let publisher: Arc<dyn StatePublisher> = Arc::new(JsonLinesPublisher::new(io::stdout()));
    let orchestrator = Orchestrator::new(gateway, tools, config.engine.clone(), publisher);

    let cancel = orchestrator.cancel_token();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Cancelling run...");
        cancel.cancel();
    });

    match orchestrator.run(workflow, input).await {
        Ok(state) => {
            info!(
                execution_id = %state.execution_id,
                steps = state.steps.len(),
                "Run completed"
            );
            true
        }
        Err(failure) => {
            eprintln!("Run failed: {}", failure);
            false
        }
    }
}
