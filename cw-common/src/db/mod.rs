//! Database access for CrisisWatch
//!
//! Both binaries share one SQLite database; this module owns pool creation
//! and schema initialization. All event-row reads and writes go through
//! [`events`].

pub mod events;

use crate::Result;
use sqlx::SqlitePool;
use std::path::Path;

/// Initialize database connection pool
///
/// Creates the parent directory and the database file if missing, then
/// ensures the schema exists.
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // SQLite URI with mode=rwc (read, write, create)
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let pool = SqlitePool::connect(&db_url).await?;
    init_tables(&pool).await?;

    Ok(pool)
}

/// Create the events table and its indexes if they don't exist
///
/// `idx_events_location` is the secondary spatial index over the point
/// coordinates, maintained for forward compatibility (no geo-query reads it
/// yet). `idx_events_status` backs worker discovery.
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS events (
            guid TEXT PRIMARY KEY,
            event_type TEXT NOT NULL,
            longitude REAL NOT NULL,
            latitude REAL NOT NULL,
            occurred_at TEXT NOT NULL,
            raw_data TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            severity INTEGER,
            analysis TEXT,
            enriched_at TEXT,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_events_location ON events (longitude, latitude)",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_events_status ON events (status)")
        .execute(pool)
        .await?;

    tracing::info!("Database tables initialized (events)");

    Ok(())
}
