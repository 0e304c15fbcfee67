//! Deck server: wallet-gated trading dashboard backend.
//!
//! Usage:
//!   deck-server [OPTIONS]
//!
//! Options:
//!   -c, --config <FILE>      Config file path (default: config/deck.toml)
//!   -p, --port <PORT>        Listen port (overrides config)
//!   --upstream-url <URL>     Exchange backend URL (overrides config)
//!   --log-level <LEVEL>      Log level (overrides config)

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::broadcast;
use tracing::{Level, info, warn};
use tracing_subscriber::FmtSubscriber;

use deck_exchange::ExchangeClient;
use deck_server::config::DeckConfig;
use deck_server::dashboard::{AppState, spawn_server};
use deck_server::market::{FreshnessPolicy, LiveProvider, MarketAggregator, MarketProvider};
use deck_server::session::{MemoryStore, new_shared, spawn_sweeper};

/// CLI arguments for deck-server.
#[derive(Parser, Debug)]
#[command(name = "deck-server")]
#[command(about = "Wallet-gated trading dashboard backend")]
#[command(version)]
struct Args {
    /// Config file path
    #[arg(short, long, default_value = "config/deck.toml")]
    config: PathBuf,

    /// Listen port (overrides config file)
    #[arg(short, long)]
    port: Option<u16>,

    /// Exchange backend URL (overrides config file)
    #[arg(long)]
    upstream_url: Option<String>,

    /// Log level: trace, debug, info, warn, error
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    // Load environment variables from .env file (if present)
    if let Err(e) = dotenvy::dotenv() {
        // Only warn if it's not a "file not found" error
        if !matches!(e, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound)
        {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }

    // Parse CLI arguments
    let args = Args::parse();

    // Load configuration
    let mut config = if args.config.exists() {
        DeckConfig::from_file(&args.config)
            .with_context(|| format!("Failed to load config from {:?}", args.config))?
    } else {
        warn!("Config file not found at {:?}, using defaults", args.config);
        DeckConfig::default()
    };

    // Apply environment variable overrides (secrets, etc.)
    config.apply_env_overrides();

    // Apply CLI overrides
    config.apply_cli_overrides(args.port, args.upstream_url, args.log_level);

    config.validate().context("Invalid configuration")?;

    // Initialize logging
    let log_level = match config.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    info!(
        upstream = %config.upstream.base_url,
        session_ttl_secs = config.session.ttl_secs,
        "Starting deck-server"
    );

    // Wire the components: store -> manager, client -> provider -> aggregator.
    let config = Arc::new(config);

    let sessions = new_shared(Arc::new(MemoryStore::new()), config.session.ttl());

    let client = ExchangeClient::with_timeout(&config.upstream.base_url, config.upstream.timeout())
        .context("Failed to create exchange client")?;
    let provider: Arc<dyn MarketProvider> = Arc::new(LiveProvider::new(client));

    let market = MarketAggregator::new(
        provider.clone(),
        FreshnessPolicy {
            fresh_for: config.market.fresh_for(),
            serve_ceiling: config.market.serve_ceiling(),
        },
    );

    let state = AppState::new(config.clone(), sessions.clone(), market, provider);

    // Background tasks share one shutdown signal.
    let (shutdown_tx, _) = broadcast::channel(1);

    let (_sweeper, sweeper_handle) = spawn_sweeper(
        sessions,
        config.session.sweep_interval(),
        shutdown_tx.subscribe(),
    );

    let server_handle = spawn_server(state, shutdown_tx.subscribe());

    // Run until interrupted.
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown signal received");

    let _ = shutdown_tx.send(());

    server_handle
        .await
        .context("API server task panicked")?
        .context("API server failed")?;
    sweeper_handle.await.context("Sweeper task panicked")?;

    info!("Shutdown complete");
    Ok(())
}
