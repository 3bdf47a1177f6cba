//! ShopDesk CLI — the main entry point.
//!
//! Commands:
//! - `serve`   — Start the HTTP chat gateway (spawns the tool sidecar)
//! - `ingest`  — Load knowledge documents into the vector store
//! - `tools`   — List the tools the sidecar offers
//! - `config`  — Validate or print configuration

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "shopdesk",
    about = "ShopDesk — customer-service assistant with order tools",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (default: ~/.shopdesk/config.toml)
    #[arg(short, long, global = true, env = "SHOPDESK_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP chat gateway
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Load a JSON array of {id, text, metadata} documents into the knowledge base
    Ingest {
        /// Path to the documents file
        file: PathBuf,
    },

    /// Start the sidecar and list its tools
    Tools,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Load and validate the configuration
    Validate,
    /// Print a default config file
    Default,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    if cli.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .init();
    }

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Serve { port } => commands::serve::run(config_path, port).await?,
        Commands::Ingest { file } => commands::ingest::run(config_path, &file).await?,
        Commands::Tools => commands::tools::run(config_path).await?,
        Commands::Config { action } => match action {
            ConfigAction::Validate => commands::config_cmd::validate(config_path)?,
            ConfigAction::Default => commands::config_cmd::print_default(),
        },
    }

    Ok(())
}
