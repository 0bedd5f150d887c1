//! Jibu daemon - streaming chat gateway over local and hosted LLM backends

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use jibu_server::GatewayError;
use jibu_server::config::Config;
use jibu_server::error::Result;
use jibu_server::gateway::GatewayServer;

/// Jibu - streaming chat gateway for local and hosted LLM backends
#[derive(Parser)]
#[command(name = "jibu")]
#[command(about = "A streaming chat gateway that fronts local and hosted LLM backends")]
#[command(version)]
pub struct Cli {
    /// Path to config file
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the gateway server (default command)
    #[command(name = "serve")]
    Serve,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    init_logging();

    let cli = Cli::parse();

    match cli.command {
        None | Some(Command::Serve) => serve(cli.config).await,
    }
}

fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,jibu=debug"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn read_config_file(path: &PathBuf) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        GatewayError::Config(format!(
            "Failed to read config file {}: {}",
            path.display(),
            e
        ))
    })?;
    toml::from_str(&content)
        .map_err(|e| GatewayError::Config(format!("Failed to parse config: {e}")))
}

fn load_config(config_path: Option<PathBuf>) -> Result<Config> {
    if let Some(path) = config_path {
        tracing::info!("Loading config from: {}", path.display());
        return read_config_file(&path);
    }

    let default_paths = [
        dirs::home_dir().map(|h| h.join(".jibu").join("config.toml")),
        dirs::config_dir().map(|c| c.join("jibu").join("config.toml")),
        Some(PathBuf::from("config.toml")),
    ];

    for path in default_paths.iter().flatten() {
        if path.exists() {
            tracing::info!("Loading config from: {}", path.display());
            return read_config_file(path);
        }
    }

    tracing::info!("No config file found, using defaults");
    Ok(Config::default())
}

async fn serve(config_path: Option<PathBuf>) -> Result<()> {
    tracing::info!("Starting Jibu gateway");

    let config = load_config(config_path)?;
    tracing::debug!("Config loaded: {:?}", config);

    let server = GatewayServer::new(config);
    server.serve().await?;

    tracing::info!("Jibu gateway stopped");
    Ok(())
}
