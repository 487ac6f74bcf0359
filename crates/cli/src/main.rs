//! `specforge` - run the requirements elicitation swarm from the command line.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use specforge_core::bus::InMemoryBus;
use specforge_core::config::{ConfigOverrides, PipelineConfig};
use specforge_core::models::LlmProvider;
use specforge_core::skills::prompts;
use specforge_core::store::{self, SqliteStore};
use specforge_core::swarm::{Coordinator, PipelineTopology, SwarmEvent};

#[derive(Parser, Clone)]
#[command(author, version, about = "Specforge - requirements elicitation agent swarm")]
struct Args {
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand, Clone)]
enum CliCommand {
    /// Run the pipeline on a stakeholder's input
    Run {
        /// What the stakeholder wants built
        input: String,
        /// Reuse a conversation id instead of generating one
        #[arg(long)]
        conversation_id: Option<String>,
        /// SQLite database for artifacts and records
        #[arg(long)]
        database: Option<PathBuf>,
        #[arg(long)]
        enduser_turn_cap: Option<u32>,
        #[arg(long)]
        deployer_turn_cap: Option<u32>,
        #[arg(long)]
        max_iterations: Option<u32>,
        /// Seconds to wait for the reviewed specification
        #[arg(long)]
        timeout: Option<u64>,
        /// LLM provider for every role (anthropic, openai, gemini, ...)
        #[arg(long)]
        provider: Option<String>,
        #[arg(long)]
        model: Option<String>,
        /// Print swarm events as they happen
        #[arg(long)]
        events: bool,
    },
    /// Print the role topology
    Topology,
    /// Print the built-in role profiles handed to the oracle
    Prompts {
        /// Only this role (e.g. interviewer, deployer)
        role: Option<String>,
    },
    /// Print a stored artifact
    Show {
        bucket: String,
        key: String,
        #[arg(long)]
        database: Option<PathBuf>,
    },
    /// Write the default configuration to the runtime directory
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },
}

fn print_event(event: &SwarmEvent) {
    let conversation = event.conversation_id.as_deref().unwrap_or("-");
    match &event.data {
        Some(data) => println!("[{}] {:?} {} {}", conversation, event.kind, event.agent, data),
        None => println!("[{}] {:?} {}", conversation, event.kind, event.agent),
    }
}

async fn run(
    input: String,
    conversation_id: Option<String>,
    overrides: ConfigOverrides,
    show_events: bool,
) -> Result<()> {
    let mut config = PipelineConfig::load().await?;
    config.merge(overrides);

    let database = config.database_path();
    let store = Arc::new(
        SqliteStore::open_at(&database)
            .with_context(|| format!("Failed to open database {:?}", database))?,
    );
    // The runner reads results from the store, not the bus history
    let bus = Arc::new(InMemoryBus::with_history_limit(0));
    tracing::info!(database = %database.display(), "Opened artifact store");
    let artifacts_bucket = config.buckets.artifacts.clone();

    let mut coordinator = Coordinator::new(config, store.clone(), bus);
    if show_events {
        let (tx, mut rx) = mpsc::channel::<SwarmEvent>(256);
        coordinator = coordinator.with_event_channel(tx);
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                print_event(&event);
            }
        });
    }

    let summary = match conversation_id {
        Some(id) => coordinator.run_conversation(&id, &input).await?,
        None => coordinator.run(&input).await?,
    };
    coordinator.shutdown();
    tracing::info!(conversation_id = %summary.conversation_id, stage = ?summary.stage, "Run finished");

    println!("conversation: {}", summary.conversation_id);
    println!("stage: {:?}", summary.stage);
    for artifact in &summary.artifacts {
        println!("  {} -> {}/{}", artifact.kind, artifact.bucket, artifact.key);
    }

    match summary.reviewed() {
        Some(reviewed) => {
            let text = store::read_text(store.as_ref(), &reviewed.bucket, &reviewed.key).await?;
            println!("\n{}", text);
            Ok(())
        }
        None => anyhow::bail!(
            "Pipeline did not produce a reviewed specification (artifacts in bucket '{}')",
            artifacts_bucket
        ),
    }
}

async fn show(bucket: &str, key: &str, database: Option<PathBuf>) -> Result<()> {
    let config = PipelineConfig::load().await?;
    let path = database.unwrap_or_else(|| config.database_path());
    let store = SqliteStore::open_at(&path)?;
    let text = store::read_text(&store, bucket, key)
        .await
        .with_context(|| format!("No artifact {}/{}", bucket, key))?;
    println!("{}", text);
    Ok(())
}

fn print_prompts(role: Option<&str>) -> Result<()> {
    let profiles: Vec<_> = prompts::all_defaults()
        .into_iter()
        .filter(|(slug, _)| role.map_or(true, |r| r == *slug))
        .collect();
    if profiles.is_empty() {
        anyhow::bail!("Unknown role '{}'", role.unwrap_or_default());
    }
    for (slug, content) in profiles {
        println!("== {} ==\n{}\n", slug, content.trim_end());
    }
    Ok(())
}

async fn init(force: bool) -> Result<()> {
    let path = PipelineConfig::config_path();
    if path.exists() && !force {
        println!("Config already exists at {:?} (use --force to overwrite)", path);
        return Ok(());
    }
    let saved = PipelineConfig::default().save().await?;
    println!("Wrote default config to {:?}", saved);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .compact()
        .init();

    let args = Args::parse();
    match args.command {
        CliCommand::Run {
            input,
            conversation_id,
            database,
            enduser_turn_cap,
            deployer_turn_cap,
            max_iterations,
            timeout,
            provider,
            model,
            events,
        } => {
            let global_provider = match provider {
                Some(name) => Some(
                    LlmProvider::parse(&name)
                        .with_context(|| format!("Unknown provider '{}'", name))?,
                ),
                None => None,
            };
            let overrides = ConfigOverrides {
                enduser_turn_cap,
                deployer_turn_cap,
                max_iterations,
                run_timeout_secs: timeout,
                database_path: database,
                global_provider,
                global_model: model,
                ..ConfigOverrides::default()
            };
            run(input, conversation_id, overrides, events).await
        }
        CliCommand::Topology => {
            let config = PipelineConfig::load().await?;
            print!("{}", PipelineTopology::reference(&config).render());
            Ok(())
        }
        CliCommand::Prompts { role } => print_prompts(role.as_deref()),
        CliCommand::Show {
            bucket,
            key,
            database,
        } => show(&bucket, &key, database).await,
        CliCommand::Init { force } => init(force).await,
    }
}
