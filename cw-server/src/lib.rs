//! cw-server - CrisisWatch enrichment service
//!
//! Hosts the read API over the event store and the background enrichment
//! worker that attaches a severity score and response plan to each stored
//! hazard event via the external analysis service.

pub mod analysis;
pub mod api;
pub mod enrich;
pub mod error;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(db: SqlitePool) -> Self {
        Self {
            db,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router.
///
/// CORS is open for all routes; the dashboard frontend is served elsewhere.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::disaster_routes())
        .merge(api::stats_routes())
        .merge(api::health_routes())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
