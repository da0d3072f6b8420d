//! Conclave Server
//!
//! CLI and Axum server for running agent teams, swarms and routers from the
//! built-in presets or a definitions file.

mod api;
mod config;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use conclave_core::agents::{AgentServices, RunContext};
use conclave_core::models::LlmProvider;
use conclave_core::orchestration::{
    AgentEvent, DefinitionSet, EventStream, Router, SwarmCoordinator, TeamCoordinator,
};
use futures::StreamExt;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use crate::api::AppState;
use crate::config::{parse_provider, PersistedConfig, CONFIG_DIR};

#[derive(Parser, Clone)]
#[command(author, version, about = "Conclave - teams, swarms and routers of LLM agents")]
struct Args {
    /// Extra team/swarm/router definitions (JSON), merged over the presets
    #[arg(long, global = true)]
    definitions: Option<PathBuf>,
    /// LLM provider (openai, anthropic, gemini, openrouter, grok, deepseek)
    #[arg(long, global = true, value_parser = parse_provider)]
    provider: Option<LlmProvider>,
    /// Default model name
    #[arg(long, global = true)]
    model: Option<String>,
    /// Base URL for an OpenAI-compatible server
    #[arg(long, global = true)]
    base_url: Option<String>,
    #[command(subcommand)]
    command: Option<CliCommand>,
}

#[derive(Subcommand, Clone)]
enum CliCommand {
    /// Start the HTTP server (default)
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,
    },
    /// List the available presets
    Presets,
    /// Show the effective configuration
    Config {
        /// Write it to .conclave/config.json
        #[arg(long)]
        save: bool,
    },
    /// Run a team on a task
    Team {
        id: String,
        task: String,
        /// Extra context passed to the first turn
        #[arg(long)]
        context: Option<String>,
        /// Print events as they happen
        #[arg(long)]
        stream: bool,
    },
    /// Run a swarm on a task
    Swarm {
        id: String,
        task: String,
        #[arg(long)]
        stream: bool,
    },
    /// Route a message through a router
    Route {
        id: String,
        message: String,
        #[arg(long)]
        stream: bool,
    },
}

impl Args {
    /// Flags as a config layer over the persisted file
    fn overrides(&self) -> PersistedConfig {
        PersistedConfig {
            provider: self.provider,
            model: self.model.clone(),
            base_url: self.base_url.clone(),
            settings: None,
            definitions: self.definitions.clone(),
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,conclave_core=debug"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn services(config: &PersistedConfig) -> Result<AgentServices> {
    let model = config.model_config();
    let backend = model
        .create_backend()
        .with_context(|| format!("Cannot reach {}", model.provider.display_name()))?;
    Ok(AgentServices::new(backend).with_settings(config.settings()))
}

async fn print_events(mut events: EventStream) {
    while let Some(event) = events.next().await {
        match &event {
            AgentEvent::AgentOutput { chunk, .. } => print!("{}", chunk),
            AgentEvent::AgentDone { agent_id, .. } => println!("\n[{} done]", agent_id),
            AgentEvent::Complete { output, .. } => println!("\n=== Final output ===\n{}", output),
            other => match serde_json::to_string(other) {
                Ok(json) => println!("{}", json),
                Err(e) => tracing::warn!(error = %e, "Unprintable event"),
            },
        }
    }
}

fn print_presets(set: &DefinitionSet) {
    println!("Teams:");
    for team in &set.teams {
        println!("  {:<16} {} ({})", team.id, team.name, team.strategy);
    }
    println!("Swarms:");
    for swarm in &set.swarms {
        println!("  {:<16} {} ({})", swarm.id, swarm.name, swarm.aggregation);
    }
    println!("Routers:");
    for router in &set.routers {
        let mode = if router.uses_ai_routing() { "ai" } else { "keyword" };
        println!("  {:<16} {} ({})", router.id, router.name, mode);
    }
}

async fn serve(state: AppState, port: u16) -> Result<()> {
    let app = api::routes(Arc::new(state));
    let addr = SocketAddr::from(([127, 0, 0, 1], port));

    tracing::info!(%addr, "Conclave server listening");
    println!("Conclave server running at http://{}", addr);
    println!("   Presets:  /api/v1/presets");
    println!("   Teams:    /api/v1/teams/:id/run, /stream");
    println!("   Swarms:   /api/v1/swarms/:id/run, /stream");
    println!("   Routers:  /api/v1/routers/:id/classify, /route, /stream");
    println!("   OpenAPI:  /api/v1/openapi.json");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn run(args: Args) -> Result<()> {
    let env_path = Path::new(CONFIG_DIR).join(".env");
    if env_path.exists() {
        dotenvy::from_path(&env_path)
            .with_context(|| format!("Failed to load {}", env_path.display()))?;
    }

    let mut config = PersistedConfig::load(&PersistedConfig::path()).await?;
    config.merge(args.overrides());
    let definitions = config.definitions()?;
    let ctx = RunContext::new("cli", "cli");

    match args.command.unwrap_or(CliCommand::Serve { port: 8080 }) {
        CliCommand::Serve { port } => {
            let state = AppState {
                definitions,
                services: services(&config)?,
            };
            serve(state, port).await
        }
        CliCommand::Presets => {
            print_presets(&definitions);
            Ok(())
        }
        CliCommand::Config { save } => {
            if save {
                let path = PersistedConfig::path();
                config.save(&path).await?;
                tracing::info!(path = %path.display(), "Saved configuration");
            }
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
        CliCommand::Team {
            id,
            task,
            context,
            stream,
        } => {
            let coordinator =
                TeamCoordinator::new(definitions.team(&id)?.clone(), services(&config)?)?;
            if stream {
                print_events(coordinator.run_stream(task, context, ctx)).await;
            } else {
                let outcome = coordinator.run(&task, context.as_deref(), &ctx).await?;
                for entry in &outcome.transcript {
                    println!(
                        "--- {} ({}) ---\n{}\n",
                        entry.agent_name,
                        entry.role.as_str(),
                        entry.content
                    );
                }
                println!(
                    "=== Final output ({} ms) ===\n{}",
                    outcome.duration_ms, outcome.final_output
                );
            }
            Ok(())
        }
        CliCommand::Swarm { id, task, stream } => {
            let coordinator =
                SwarmCoordinator::new(definitions.swarm(&id)?.clone(), services(&config)?)?;
            if stream {
                print_events(coordinator.run_stream(task, HashMap::new(), ctx)).await;
            } else {
                let outcome = coordinator.run(&task, &HashMap::new(), &ctx).await?;
                for result in &outcome.results {
                    match &result.error {
                        Some(error) => println!("--- {} failed: {} ---", result.agent_name, error),
                        None => println!(
                            "--- {} ({} ms) ---\n{}\n",
                            result.agent_name, result.duration_ms, result.output
                        ),
                    }
                }
                println!(
                    "=== {} ({}/{} succeeded) ===\n{}",
                    outcome.aggregation,
                    outcome.succeeded,
                    outcome.results.len(),
                    outcome.final_output
                );
            }
            Ok(())
        }
        CliCommand::Route { id, message, stream } => {
            let router = Router::new(definitions.router(&id)?.clone(), services(&config)?)?;
            if stream {
                print_events(router.route_stream(message, ctx)).await;
            } else {
                let outcome = router.route(&message, &ctx).await?;
                println!(
                    "-> {} ({})\n{}",
                    outcome.decision.agent_id, outcome.decision.reason, outcome.output
                );
            }
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    run(Args::parse()).await
}
