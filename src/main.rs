//! Strata server
//!
//! Loads configuration, opens the engine and property store, and serves
//! the HTTP API until a shutdown signal arrives.

use clap::Parser;
use std::sync::Arc;
use strata::api::{serve, ApiConfig, AppState};
use strata::config::Config;
use strata::property::PropertyStore;
use strata::query::QueryExecutor;
use strata::storage::{Engine, EngineConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "strata", about = "Columnar time-series storage engine", version)]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Override the data directory
    #[arg(long)]
    data_dir: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(data_dir) = args.data_dir {
        config.storage.data_dir = data_dir;
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("STRATA_LOG").unwrap_or_else(|_| config.logging.filter.clone()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Strata v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Data directory: {}", config.storage.data_dir);

    let engine_config = EngineConfig {
        data_dir: config.storage.data_dir.clone().into(),
        max_disk_usage_percent: config.storage.max_disk_usage_percent,
        disk_capacity_bytes: config.storage.disk_capacity_bytes,
    };
    let engine = Arc::new(Engine::open(engine_config)?);
    tracing::info!("Engine stats: {}", engine.stats());

    let executor = Arc::new(QueryExecutor::new(Arc::clone(&engine)));
    let properties = Arc::new(PropertyStore::open(
        engine.data_dir(),
        engine.disk_gauge(),
    )?);

    let api_config = ApiConfig::new(config.api.host.clone(), config.api.port);
    let state = AppState::new(engine, executor, properties, api_config.clone());

    serve(state, &api_config).await?;
    Ok(())
}
