use std::io::{self, BufRead, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{CommandFactory, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use nodeflow_core::config::AppConfig;
use nodeflow_core::event::EventBus;
use nodeflow_core::graph::Graph;
use nodeflow_core::types::{text_content, SessionId};
use nodeflow_engine::{FlowExecutor, RunOutcome, SessionManager};
use nodeflow_nodes::NodeRegistry;

#[derive(Parser)]
#[command(name = "nodeflow", version, about = "Node-graph workflow engine for LLM pipelines")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "nodeflow.toml")]
    config: PathBuf,

    /// Session ID, also used as the run correlation id (auto-generated if not provided)
    #[arg(short, long)]
    session: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a workflow graph once and print the outcome
    Run {
        /// Path to the workflow JSON
        graph: PathBuf,
        /// Print progress events as they happen
        #[arg(long)]
        stream: bool,
        /// The query to answer (read from stdin when empty)
        #[arg(trailing_var_arg = true)]
        input: Vec<String>,
    },
    /// Chat with a workflow, one run per line, in a single session
    Chat {
        /// Path to the workflow JSON
        graph: PathBuf,
    },
    /// Check a workflow graph without running it
    Validate {
        /// Path to the workflow JSON
        graph: PathBuf,
    },
    /// List the registered node types
    Nodes,
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
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("nodeflow=info,warn")),
        )
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    // Handle completions before config loading
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(*shell, &mut cmd, "nodeflow", &mut io::stdout());
        return Ok(());
    }

    let config = AppConfig::load_or_default(&cli.config)?;
    if !cli.config.exists() {
        info!(path = %cli.config.display(), "No config file found, using defaults");
    }

    let llm: Arc<dyn nodeflow_core::traits::LlmClient> =
        Arc::from(nodeflow_llm::create_client(&config.model));
    let registry = Arc::new(NodeRegistry::with_config(llm, &config.model));
    let sessions = Arc::new(SessionManager::with_history_limit(
        config.sessions.history_limit,
    ));
    let event_bus = Arc::new(EventBus::default());

    let executor = FlowExecutor::new(registry.clone())
        .with_plan_cache(config.engine.plan_cache)
        .with_event_bus(event_bus.clone())
        .with_sessions(sessions.clone());

    let session_id = cli.session.as_deref().map(SessionId::from_str);

    match cli.command {
        Commands::Run {
            graph,
            stream,
            input,
        } => {
            let graph = load_graph(&graph)?;
            let text = if input.is_empty() {
                let mut buf = String::new();
                io::stdin().read_to_string(&mut buf)?;
                buf.trim_end().to_string()
            } else {
                input.join(" ")
            };

            let printer = stream.then(|| {
                let mut rx = event_bus.subscribe();
                tokio::spawn(async move {
                    while let Ok(event) = rx.recv().await {
                        if let Ok(line) = serde_json::to_string(&event) {
                            println!("{}", line);
                        }
                        if event.is_terminal() {
                            break;
                        }
                    }
                })
            });

            let outcome = run_with_timeout(
                &executor,
                &graph,
                &text,
                session_id,
                config.engine.run_timeout_secs,
            )
            .await?;
            if let Some(printer) = printer {
                let _ = printer.await;
            }

            println!("{}", serde_json::to_string_pretty(&outcome)?);
            if !outcome.is_completed() {
                std::process::exit(1);
            }
        }
        Commands::Chat { graph } => {
            let graph = load_graph(&graph)?;
            let session_id = sessions.create(session_id);
            let max_age = Duration::from_secs(config.sessions.max_age_secs);
            println!(
                "Session {} on workflow '{}'. Type /history to review, /exit to quit.",
                session_id, graph.name
            );

            let stdin = io::stdin();
            loop {
                print!("> ");
                io::stdout().flush()?;
                let mut line = String::new();
                if stdin.lock().read_line(&mut line)? == 0 {
                    break;
                }
                let line = line.trim();
                match line {
                    "" => continue,
                    "/exit" | "/quit" => break,
                    "/history" => {
                        let history = sessions.recent_history(&session_id);
                        println!("{}", serde_json::to_string_pretty(&history)?);
                        continue;
                    }
                    _ => {}
                }

                let outcome = run_with_timeout(
                    &executor,
                    &graph,
                    line,
                    Some(session_id.clone()),
                    config.engine.run_timeout_secs,
                )
                .await?;
                match &outcome {
                    RunOutcome::Completed { result, .. } => println!("{}", text_content(result)),
                    RunOutcome::Failed { error, .. } => eprintln!("error: {}", error.message),
                }
                sessions.cleanup(max_age);
            }
        }
        Commands::Validate { graph } => {
            let graph = load_graph(&graph)?;
            let report = executor.validate(&graph);
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.valid {
                std::process::exit(1);
            }
        }
        Commands::Nodes => {
            let nodes: Vec<_> = registry
                .list_all()
                .into_iter()
                .map(|(type_id, descriptor)| {
                    serde_json::json!({"type": type_id, "descriptor": descriptor})
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&nodes)?);
        }
        Commands::Config => {
            let mut shown = config.clone();
            if shown.model.api_key.is_some() {
                shown.model.api_key = Some("********".into());
            }
            println!("{}", toml::to_string_pretty(&shown)?);
        }
        Commands::Completions { .. } => unreachable!("handled before config load"),
    }

    Ok(())
}

fn load_graph(path: &Path) -> anyhow::Result<Graph> {
    let graph = Graph::from_file(path)?;
    info!(
        path = %path.display(),
        nodes = graph.nodes.len(),
        edges = graph.edges.len(),
        "Loaded workflow"
    );
    Ok(graph)
}

/// Run `graph`, giving up after `timeout_secs`.
async fn run_with_timeout(
    executor: &FlowExecutor,
    graph: &Graph,
    input: &str,
    session_id: Option<SessionId>,
    timeout_secs: u64,
) -> anyhow::Result<RunOutcome> {
    let timeout = Duration::from_secs(timeout_secs);
    match tokio::time::timeout(timeout, executor.run(graph, input, session_id)).await {
        Ok(outcome) => Ok(outcome),
        Err(_) => {
            warn!(timeout_secs, workflow = %graph.name, "Flow run timed out");
            anyhow::bail!("workflow '{}' timed out after {}s", graph.name, timeout_secs)
        }
    }
}
