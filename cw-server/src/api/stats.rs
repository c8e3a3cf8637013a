//! Aggregate statistics endpoint

use axum::{extract::State, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use cw_common::db::events as store;
use serde::Serialize;

use crate::{ApiError, ApiResult, AppState};

/// System statistics snapshot
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    /// All stored records, any status
    pub total_events: i64,
    /// Records with a committed severity and analysis
    pub processed: i64,
    /// Enriched records with severity > 7
    pub high_severity: i64,
    /// Snapshot timestamp
    pub last_updated: DateTime<Utc>,
}

/// GET /api/stats
pub async fn get_stats(State(state): State<AppState>) -> ApiResult<Json<StatsResponse>> {
    let stats = store::count_stats(&state.db)
        .await
        .map_err(ApiError::Common)?;

    Ok(Json(StatsResponse {
        total_events: stats.total_events,
        processed: stats.processed,
        high_severity: stats.high_severity,
        last_updated: Utc::now(),
    }))
}

/// Build stats routes
pub fn stats_routes() -> Router<AppState> {
    Router::new().route("/api/stats", get(get_stats))
}
