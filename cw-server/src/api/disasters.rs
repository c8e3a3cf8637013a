//! Enriched-event listing and diagnostic endpoints

use axum::{extract::State, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use cw_common::db::events as store;
use cw_common::GeoPoint;
use serde::Serialize;
use serde_json::Value;

use crate::{ApiError, ApiResult, AppState};

/// Listing cap for the map view
const MAX_RESULTS: u32 = 100;

/// One enriched event as served to the dashboard (internal guid omitted)
#[derive(Debug, Serialize)]
pub struct DisasterView {
    pub raw_data: Value,
    pub location: GeoPoint,
    pub severity: u8,
    #[serde(rename = "type")]
    pub event_type: String,
    pub analysis: String,
    pub enriched_at: DateTime<Utc>,
}

/// GET /api/disasters
///
/// Enriched records, most recently enriched first, capped at 100.
pub async fn get_disasters(State(state): State<AppState>) -> ApiResult<Json<Vec<DisasterView>>> {
    let events = store::recent_enriched(&state.db, MAX_RESULTS)
        .await
        .map_err(ApiError::Common)?;

    let disasters = events
        .into_iter()
        .filter_map(|event| {
            Some(DisasterView {
                severity: event.severity?,
                analysis: event.analysis?,
                enriched_at: event.enriched_at?,
                raw_data: event.raw_data,
                location: event.location,
                event_type: event.event_type,
            })
        })
        .collect();

    Ok(Json(disasters))
}

/// GET /api/test-event
///
/// Diagnostic: one arbitrary stored record with the internal identifier
/// stripped, or 404 when the store is empty.
pub async fn test_event(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    match store::sample_event(&state.db).await.map_err(ApiError::Common)? {
        Some(event) => {
            let mut value = serde_json::to_value(&event)
                .map_err(|e| ApiError::Internal(e.to_string()))?;
            if let Some(object) = value.as_object_mut() {
                object.remove("guid");
            }
            Ok(Json(value))
        }
        None => Err(ApiError::NotFound("No events found".to_string())),
    }
}

/// Build disaster listing routes
pub fn disaster_routes() -> Router<AppState> {
    Router::new()
        .route("/api/disasters", get(get_disasters))
        .route("/api/test-event", get(test_event))
}
