//! cw-ingest - CrisisWatch feed ingestor
//!
//! One finite pass per invocation: fetch the upstream hazard feed, normalize
//! each entry, insert the well-formed ones as unenriched records. Malformed
//! entries are skipped individually; a failed fetch or an unreachable store
//! is fatal (exit non-zero) so schedulers notice.

use anyhow::{Context, Result};
use clap::Parser;
use std::time::Duration;
use tracing::{info, warn};

use cw_common::db::events as store;
use cw_ingest::feed::{self, FeedResponse};

const FEED_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Parser)]
#[command(name = "cw-ingest", about = "Fetch the hazard feed and insert new event records")]
struct Args {
    /// Upstream feed URL (overrides config file)
    #[arg(long, env = "CW_FEED_URL")]
    feed_url: Option<String>,

    /// SQLite database path (overrides config file)
    #[arg(long, env = "CW_DATABASE")]
    database: Option<String>,

    /// Process at most this many feed entries
    #[arg(long)]
    limit: Option<usize>,
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

    info!("Starting cw-ingest v{}", env!("CARGO_PKG_VERSION"));

    let toml_config = cw_common::config::load_toml_config()?;
    let feed_url = cw_common::config::resolve_feed_url(args.feed_url.as_deref(), &toml_config);
    let db_path = cw_common::config::resolve_database_path(args.database.as_deref(), &toml_config);

    info!("Fetching feed: {}", feed_url);

    let client = reqwest::Client::builder()
        .user_agent(cw_common::config::get_user_agent())
        .timeout(FEED_TIMEOUT)
        .build()?;

    let response = client
        .get(&feed_url)
        .send()
        .await
        .context("Failed to fetch feed")?;
    if !response.status().is_success() {
        anyhow::bail!("Feed returned status {}", response.status());
    }

    let feed: FeedResponse = response.json().await.context("Failed to parse feed JSON")?;
    if feed.events.is_empty() {
        info!("No events found in feed");
        return Ok(());
    }
    info!(count = feed.events.len(), "Feed entries received");

    let pool = cw_common::db::init_database_pool(&db_path)
        .await
        .context("Store connection failed")?;

    let mut inserted = 0usize;
    let mut skipped = 0usize;
    let take = args.limit.unwrap_or(usize::MAX);
    for entry in feed.events.iter().take(take) {
        match feed::normalize_entry(entry) {
            Ok(event) => {
                store::insert_event(&pool, &event).await?;
                inserted += 1;
            }
            Err(e) => {
                warn!("Skipping malformed feed entry: {}", e);
                skipped += 1;
            }
        }
    }

    info!(inserted, skipped, "Feed ingest complete");

    Ok(())
}
