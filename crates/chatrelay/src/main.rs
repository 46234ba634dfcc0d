//! Chatrelay daemon - streaming chat relay with web enrichment

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use chatrelay::config::Config;
use chatrelay::enrichment::SearchPageFetcher;
use chatrelay::error::Result;
use chatrelay::generation::ChatCompletionsGenerator;
use chatrelay::relay::RelayServer;

/// Chatrelay - stream model replies to the browser, enriched with live web results
#[derive(Parser)]
#[command(name = "chatrelay")]
#[command(about = "A streaming chat relay that enriches conversations with live web results")]
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
    /// Start the relay server (default command)
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
    dotenv::dotenv().ok();
    init_logging();

    let cli = Cli::parse();

    match cli.command {
        None | Some(Command::Serve) => serve(cli.config).await,
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,chatrelay=debug"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn read_config(path: &Path) -> Result<Config> {
    tracing::info!("Loading config from: {}", path.display());
    Config::from_file(path)
}

fn load_config(config_path: Option<PathBuf>) -> Result<Config> {
    if let Some(path) = config_path {
        return read_config(&path);
    }

    let default_paths = [
        dirs::home_dir().map(|h| h.join(".chatrelay").join("config.toml")),
        dirs::config_dir().map(|c| c.join("chatrelay").join("config.toml")),
        Some(PathBuf::from("config.toml")),
    ];

    for path in default_paths.iter().flatten() {
        if path.exists() {
            return read_config(path);
        }
    }

    tracing::info!("No config file found, using defaults");
    Ok(Config::default())
}

async fn serve(config_path: Option<PathBuf>) -> Result<()> {
    tracing::info!("Starting chatrelay");

    let mut config = load_config(config_path)?;
    config.apply_env_overrides();
    tracing::debug!("Config loaded: {:?}", config);

    let generator = Arc::new(ChatCompletionsGenerator::new(&config.generator)?);
    tracing::info!(
        "Generator ready: model {} at {}",
        config.generator.model,
        config.generator.api_url
    );

    let fetcher = Arc::new(SearchPageFetcher::new(&config.enrichment)?);

    let server = RelayServer::new(config, generator, fetcher);
    server.serve().await?;

    tracing::info!("Chatrelay stopped");
    Ok(())
}
