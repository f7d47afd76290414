//! MCPAgent CLI — the main entry point.
//!
//! Commands:
//! - `chat`    — Interactive chat or single-message mode
//! - `tools`   — List the tools the tool server advertises
//! - `config`  — Show the effective configuration
//! - `doctor`  — Diagnose provider and tool server health

use anyhow::Context;
use clap::{Parser, Subcommand};
use mcpagent_config::AppConfig;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(
    name = "mcpagent",
    about = "MCPAgent — LLM agent with remote tool calling",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file to use instead of ~/.mcpagent/config.toml
    #[arg(short, long, global = true, env = "MCPAGENT_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the agent
    Chat {
        /// Session id; history is kept per session
        #[arg(short, long)]
        session: Option<String>,

        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,
    },

    /// List the tools the tool server advertises
    Tools,

    /// Show the effective configuration (credential redacted)
    Config,

    /// Diagnose provider and tool server health
    Doctor,
}

fn init_tracing(config: &AppConfig, verbose: bool) {
    let level = if verbose { "debug" } else { config.logging.level.as_str() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if config.logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => AppConfig::load_from(path),
        None => AppConfig::load(),
    }
    .context("Failed to load config")?;

    init_tracing(&config, cli.verbose);

    match cli.command {
        Commands::Chat { session, message } => commands::chat::run(&config, session, message).await,
        Commands::Tools => commands::tools::run(&config).await,
        Commands::Config => commands::config_cmd::show(&config, cli.config.as_deref()),
        Commands::Doctor => commands::doctor::run(&config).await,
    }
}
