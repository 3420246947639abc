// Looper - continuous AI-assisted optimization loops
// Main entry point

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use looper::client::models::{self, MODELS};
use looper::client::{ChatBackend, RotatingClient};
use looper::config::{load_config, LooperConfig};
use looper::registry::{build_project_loop, LoopRegistry};
use looper::server::LooperServer;

/// Analyze, plan, execute, review and commit in a loop
#[derive(Debug, Parser)]
#[command(name = "looper", version, about)]
struct Cli {
    /// Path to looper.toml
    #[arg(long, global = true, env = "LOOPER_CONFIG")]
    config: Option<PathBuf>,

    /// API key (repeatable); takes precedence over env vars and key files
    #[arg(long = "api-key", global = true)]
    api_keys: Vec<String>,

    /// Debug logging for looper
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve the HTTP API
    Serve {
        /// Overrides server.bind_address
        #[arg(long)]
        bind: Option<String>,
    },

    /// Run one loop in the foreground until it completes or Ctrl-C
    Run {
        #[arg(long)]
        project: Option<PathBuf>,
        #[arg(long)]
        max_iterations: Option<u32>,
        /// Commit approved changes
        #[arg(long)]
        auto_apply: bool,
    },

    /// Print one analysis of the project and exit
    Analyze {
        #[arg(long)]
        project: Option<PathBuf>,
    },

    /// Send a single chat message
    Chat { message: String },

    /// List known models
    Models,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_deref())?;
    config.api.api_keys.extend(cli.api_keys.iter().cloned());
    looper::logging::init(&config.logging, cli.verbose)?;

    match cli.command {
        Command::Serve { bind } => serve(config, bind).await,
        Command::Run {
            project,
            max_iterations,
            auto_apply,
        } => run(config, project, max_iterations, auto_apply).await,
        Command::Analyze { project } => analyze(config, project).await,
        Command::Chat { message } => chat(config, &message).await,
        Command::Models => {
            print_models(&config);
            Ok(())
        }
    }
}

fn backend(config: &LooperConfig) -> Result<Arc<dyn ChatBackend>> {
    let client = RotatingClient::from_config(&config.api).context("Failed to create API client")?;
    Ok(Arc::new(client))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}

async fn serve(mut config: LooperConfig, bind: Option<String>) -> Result<()> {
    if let Some(bind) = bind {
        config.server.bind_address = bind;
        config.validate()?;
    }
    let registry = LoopRegistry::new(backend(&config)?, &config);
    let server = LooperServer::new(registry, config.server.clone())?;
    server.serve(shutdown_signal()).await
}

async fn run(
    mut config: LooperConfig,
    project: Option<PathBuf>,
    max_iterations: Option<u32>,
    auto_apply: bool,
) -> Result<()> {
    if let Some(path) = project {
        config.project.path = path;
    }
    if let Some(max) = max_iterations {
        config.looping.max_iterations = max;
    }
    config.looping.auto_apply |= auto_apply;

    let mut looper = build_project_loop(&config.project, config.looping.clone(), backend(&config)?)?;
    let handle = looper.handle();
    tokio::spawn(async move {
        shutdown_signal().await;
        handle.stop();
    });

    let status = looper.run().await;
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}

async fn analyze(mut config: LooperConfig, project: Option<PathBuf>) -> Result<()> {
    if let Some(path) = project {
        config.project.path = path;
    }
    let mut looper = build_project_loop(&config.project, config.looping.clone(), backend(&config)?)?;
    let analysis = looper.analyze_once().await?;
    println!("{}", analysis);
    Ok(())
}

async fn chat(config: LooperConfig, message: &str) -> Result<()> {
    let backend = backend(&config)?;
    let response = backend.chat(message, &[]).await?;
    println!("{}", response);
    Ok(())
}

fn print_models(config: &LooperConfig) {
    println!("{:<40} {:>9}  capabilities", "model", "context");
    for model in MODELS {
        let mut caps = Vec::new();
        if model.thinking {
            caps.push("thinking");
        }
        if model.images {
            caps.push("images");
        }
        if model.code {
            caps.push("code");
        }
        let marker = if model.id == config.api.model { "*" } else { " " };
        println!(
            "{}{:<39} {:>9}  {}",
            marker,
            model.id,
            model.context,
            caps.join(", ")
        );
    }
    if models::lookup(&config.api.model).is_none() {
        println!("\n(configured model {} is not in the catalog)", config.api.model);
    }
}
