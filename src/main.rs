use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;
use clap::{CommandFactory, Parser, Subcommand};
use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use agentflow_consensus::{ConsensusEngine, TaskType, VoteRequest, VotingMethod};
use agentflow_core::config::AppConfig;
use agentflow_core::error::Result as FlowResult;
use agentflow_core::flow::Flow;
use agentflow_core::traits::{FlowStore, MessageChannel};
use agentflow_core::types::{ChatMessage, InboundMessage};
use agentflow_flow::{
    ExecuteRequest, FlowGraph, GraphExecutor, JsonDirFlowStore, MemoryFlowStore,
    MessageDispatcher, ProfileAgentResolver,
};
use agentflow_llm::ModelRegistry;
use agentflow_tools::ToolRegistry;

const DEFAULT_FLOWS_DIR: &str = "flows";

#[derive(Parser)]
#[command(name = "agentflow", version, about = "Graph-based multi-model agent workflows")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "agentflow.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a flow once and print its output
    Run {
        /// Flow id (`<flows dir>/<id>.json`)
        #[arg(short, long, required_unless_present = "template")]
        flow: Option<String>,
        /// Run a built-in template instead of a stored flow
        #[arg(short, long, conflicts_with = "flow")]
        template: Option<String>,
        /// Override the flows directory from the config
        #[arg(long)]
        flows_dir: Option<PathBuf>,
        /// Extra context entries, `key=value`
        #[arg(long = "context", value_name = "KEY=VALUE")]
        context: Vec<String>,
        /// Print the full response (node executions, context) as JSON
        #[arg(long)]
        json: bool,
        /// Flow input; read from stdin when omitted
        #[arg(trailing_var_arg = true)]
        input: Vec<String>,
    },
    /// Ask several models the same question and pick the best answer
    Vote {
        /// Comma-separated model names
        #[arg(short, long, value_delimiter = ',')]
        models: Vec<String>,
        /// length, comprehensive or cross
        #[arg(long, default_value = "comprehensive")]
        method: String,
        /// general, decision, creation or analysis
        #[arg(long, default_value = "general")]
        task_type: String,
        /// Print every response and score as JSON
        #[arg(long)]
        json: bool,
        #[arg(trailing_var_arg = true)]
        prompt: Vec<String>,
    },
    /// List the model catalog and which models have credentials
    Models,
    /// Check that a flow definition file builds into a graph
    Validate {
        file: PathBuf,
    },
    /// List built-in flow templates, or print one as JSON
    Templates {
        id: Option<String>,
    },
    /// Show current configuration
    Config,
    /// Feed stdin lines through the default flow, one message per line
    Chat {
        /// Flow id; defaults to `[flows] default_flow`
        #[arg(short, long)]
        flow: Option<String>,
        #[arg(long)]
        flows_dir: Option<PathBuf>,
        #[arg(long, default_value = "cli")]
        user: String,
    },
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

/// Prints replies to stdout.
struct StdoutChannel;

impl MessageChannel for StdoutChannel {
    fn name(&self) -> &str {
        "stdout"
    }

    fn send(&self, _user_id: &str, text: &str) -> BoxFuture<'_, FlowResult<()>> {
        let text = text.to_string();
        Box::pin(async move {
            let mut stdout = io::stdout().lock();
            writeln!(stdout, "{}", text)?;
            stdout.flush()?;
            Ok(())
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("agentflow=info,warn")),
        )
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(*shell, &mut cmd, "agentflow", &mut io::stdout());
        return Ok(());
    }

    if let Commands::Validate { file } = &cli.command {
        return validate_flow(file);
    }

    if let Commands::Templates { id } = &cli.command {
        return show_templates(id.as_deref());
    }

    let config = load_config(&cli.config)?;

    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Interrupted, cancelling...");
        cancel_clone.cancel();
    });

    match cli.command {
        Commands::Config => {
            println!("{}", toml::to_string_pretty(&config)?);
        }
        Commands::Models => {
            let registry = ModelRegistry::from_config(&config);
            for (name, model) in config.model_catalog() {
                let status = if registry.is_available(&name).await {
                    "available"
                } else {
                    "no credentials"
                };
                println!(
                    "{:<24} {:<10} {:<32} {}",
                    name, model.provider, model.model_name, status
                );
            }
        }
        Commands::Vote {
            models,
            method,
            task_type,
            json,
            prompt,
        } => {
            let prompt = join_or_stdin(prompt);
            if prompt.trim().is_empty() {
                anyhow::bail!("empty prompt");
            }
            let engine = ConsensusEngine::new(
                Arc::new(ModelRegistry::from_config(&config)),
                config.consensus.clone(),
            );
            let req = VoteRequest::new(models, vec![ChatMessage::user(prompt)])
                .with_method(VotingMethod::parse(&method))
                .with_task_type(TaskType::parse(&task_type));
            let resp = engine.vote(&cancel, req).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&resp)?);
            } else {
                eprintln!("winner: {} ({})", resp.winner, resp.winner_model);
                println!("{}", resp.winner_content);
            }
        }
        Commands::Run {
            flow,
            template,
            flows_dir,
            context,
            json,
            input,
        } => {
            let (store, flow_id): (Arc<dyn FlowStore>, String) = match template {
                Some(id) => {
                    let flow = agentflow_flow::template(&id)
                        .with_context(|| format!("unknown template '{}'", id))?
                        .flow()?;
                    let flow_id = flow.id.clone();
                    (Arc::new(MemoryFlowStore::new().with_flow(flow)), flow_id)
                }
                None => (
                    json_store(&config, flows_dir),
                    flow.context("--flow or --template is required")?,
                ),
            };
            let executor = build_executor(&config, store);
            let input = join_or_stdin(input);
            let req = parse_context(&context)?
                .into_iter()
                .fold(ExecuteRequest::new(flow_id, input), |req, (key, value)| {
                    req.with_context(key, value)
                });
            let resp = executor.execute(&cancel, req).await?;
            for failed in resp.failures() {
                warn!(
                    node_id = %failed.node_id,
                    error = failed.error.as_deref().unwrap_or_default(),
                    "Node failed"
                );
            }
            if json {
                println!("{}", serde_json::to_string_pretty(&resp)?);
            } else {
                println!("{}", resp.output);
            }
        }
        Commands::Chat {
            flow,
            flows_dir,
            user,
        } => {
            let flow_id = flow
                .or_else(|| config.flows.default_flow.clone())
                .context("no flow given and [flows] default_flow is not set")?;
            let dispatcher = MessageDispatcher::new(
                build_executor(&config, json_store(&config, flows_dir)),
                Arc::new(StdoutChannel),
                flow_id,
            );
            run_chat(&dispatcher, &cancel, &user).await?;
        }
        Commands::Completions { .. } | Commands::Validate { .. } | Commands::Templates { .. } => {
            unreachable!("handled before config load")
        }
    }

    Ok(())
}

fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    let config = if path.exists() {
        info!(path = %path.display(), "Loading config");
        AppConfig::load(path)?
    } else {
        warn!(path = %path.display(), "Config file not found, using built-in defaults");
        AppConfig::default()
    };
    Ok(config.with_env_credentials())
}

fn json_store(config: &AppConfig, flows_dir: Option<PathBuf>) -> Arc<dyn FlowStore> {
    let dir = flows_dir
        .or_else(|| config.flows_dir())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_FLOWS_DIR));
    info!(flows_dir = %dir.display(), "Using flow directory");
    Arc::new(JsonDirFlowStore::new(dir))
}

fn build_executor(config: &AppConfig, store: Arc<dyn FlowStore>) -> Arc<GraphExecutor> {
    info!(agents = config.agents.len(), "Building executor");
    let registry = Arc::new(ModelRegistry::from_config(config));
    let consensus = Arc::new(ConsensusEngine::new(registry, config.consensus.clone()));
    let executor = GraphExecutor::new(
        store,
        consensus,
        Arc::new(ProfileAgentResolver::new(config.agents.clone())),
        Arc::new(ToolRegistry::with_builtins()),
    )
    .with_config(config.executor.clone());
    Arc::new(executor)
}

fn validate_flow(file: &Path) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let flow = Flow::from_json(&content)?;
    let graph = FlowGraph::build(&flow)?;
    println!(
        "{}: {} nodes, {} edges, triggers: {}",
        flow.id,
        graph.len(),
        flow.edges.len(),
        graph.triggers().join(", ")
    );
    if !flow.enabled {
        println!("warning: flow is disabled");
    }
    if graph.triggers().is_empty() {
        anyhow::bail!("flow {} has no trigger node", flow.id);
    }
    Ok(())
}

fn show_templates(id: Option<&str>) -> anyhow::Result<()> {
    match id {
        Some(id) => {
            let template = agentflow_flow::template(id)
                .with_context(|| format!("unknown template '{}'", id))?;
            println!("{}", template.flow()?.to_json_pretty()?);
        }
        None => {
            for t in agentflow_flow::templates() {
                println!("{:<20} {:<20} {}", t.id, t.name, t.description);
            }
        }
    }
    Ok(())
}

async fn run_chat(
    dispatcher: &MessageDispatcher,
    cancel: &CancellationToken,
    user: &str,
) -> anyhow::Result<()> {
    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        if matches!(text, "/quit" | "/exit" | "/q") {
            break;
        }
        let msg = InboundMessage {
            content: text.to_string(),
            user_id: user.to_string(),
            channel_id: "stdin".to_string(),
        };
        dispatcher.dispatch(cancel, msg).await?;
    }
    Ok(())
}

/// `key=value` pairs as string context entries.
fn parse_context(pairs: &[String]) -> anyhow::Result<Vec<(String, serde_json::Value)>> {
    pairs
        .iter()
        .map(|pair| {
            let (key, value) = pair
                .split_once('=')
                .with_context(|| format!("context entry '{}' is not key=value", pair))?;
            Ok((key.trim().to_string(), serde_json::Value::String(value.to_string())))
        })
        .collect()
}

fn join_or_stdin(words: Vec<String>) -> String {
    let text = words.join(" ");
    if !text.is_empty() {
        return text;
    }
    io::stdin()
        .lock()
        .lines()
        .map_while(|l| l.ok())
        .collect::<Vec<_>>()
        .join("\n")
}
