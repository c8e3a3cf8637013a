//! cw-server - CrisisWatch enrichment service
//!
//! One process hosts both halves of the system: the background enrichment
//! worker (daemon mode) and the read API. `--once` runs a single enrichment
//! pass and exits without serving HTTP (batch mode).

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use cw_server::analysis::{GeminiClient, DEFAULT_REQUESTS_PER_MINUTE};
use cw_server::enrich::{EnrichmentWorker, WorkerConfig};
use cw_server::{build_router, AppState};

#[derive(Debug, Parser)]
#[command(name = "cw-server", about = "CrisisWatch enrichment service and read API")]
struct Args {
    /// SQLite database path (overrides config file)
    #[arg(long, env = "CW_DATABASE")]
    database: Option<String>,

    /// Listen port for the read API
    #[arg(long, env = "CW_PORT", default_value_t = 5000)]
    port: u16,

    /// Run one enrichment pass and exit instead of serving
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();

    info!("Starting cw-server v{}", env!("CARGO_PKG_VERSION"));

    let toml_config = cw_common::config::load_toml_config()?;

    let db_path = cw_common::config::resolve_database_path(args.database.as_deref(), &toml_config);
    info!("Database: {}", db_path.display());

    // Store connectivity failure is fatal at startup (recoverable only once
    // the loop is running)
    let db = cw_common::db::init_database_pool(&db_path).await?;
    info!("Database connection established");

    let api_key = cw_common::config::resolve_gemini_api_key(&toml_config)?;
    let requests_per_minute = toml_config
        .worker
        .requests_per_minute
        .unwrap_or(DEFAULT_REQUESTS_PER_MINUTE);
    let analyzer = Arc::new(GeminiClient::new(api_key, requests_per_minute)?);
    info!(requests_per_minute, "Analysis client initialized");

    let worker_config = WorkerConfig::from_toml(&toml_config.worker);
    let cancel = CancellationToken::new();
    let worker = EnrichmentWorker::new(db.clone(), analyzer, worker_config, cancel.clone());

    if args.once {
        let summary = worker.run_once().await?;
        info!(
            fetched = summary.fetched,
            enriched = summary.enriched,
            poisoned = summary.poisoned,
            "Single enrichment pass complete"
        );
        return Ok(());
    }

    tokio::spawn(worker.run());

    let state = AppState::new(db);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", args.port)).await?;
    info!("Listening on http://0.0.0.0:{}", args.port);
    info!("Health check: http://127.0.0.1:{}/health", args.port);

    let shutdown_cancel = cancel.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received; stopping discovery");
            shutdown_cancel.cancel();
        })
        .await?;

    // In case the server exits without the signal having fired
    cancel.cancel();

    Ok(())
}
