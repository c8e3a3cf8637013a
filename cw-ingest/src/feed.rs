//! Upstream feed parsing and normalization
//!
//! The feed is a JSON object with an `events` array (NASA EONET v3 layout).
//! Each entry must carry a category label and a geometry entry with point
//! coordinates and a date; entries missing any of these are skipped
//! individually so one malformed entry never aborts the batch.
//!
//! The full upstream entry is preserved verbatim as the record's raw
//! payload; normalization only lifts out the fields the pipeline keys on.

use chrono::{DateTime, Utc};
use cw_common::{GeoPoint, HazardEvent};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// Top-level feed document
#[derive(Debug, Deserialize)]
pub struct FeedResponse {
    #[serde(default)]
    pub events: Vec<Value>,
}

/// Why a feed entry was rejected during normalization
#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("unexpected entry shape: {0}")]
    Shape(String),

    #[error("missing category")]
    MissingCategory,

    #[error("missing geometry")]
    MissingGeometry,

    #[error("geometry coordinates are not a point")]
    BadCoordinates,

    #[error("missing geometry date")]
    MissingDate,

    #[error("unparseable geometry date: {0}")]
    BadDate(String),
}

// Typed views over the fields normalization keys on; everything else in the
// entry stays opaque raw payload.

#[derive(Debug, Deserialize)]
struct FeedEntry {
    #[serde(default)]
    categories: Vec<FeedCategory>,
    #[serde(default)]
    geometry: Vec<FeedGeometry>,
}

#[derive(Debug, Deserialize)]
struct FeedCategory {
    title: String,
}

#[derive(Debug, Deserialize)]
struct FeedGeometry {
    #[serde(default)]
    coordinates: Value,
    #[serde(default)]
    date: Option<String>,
}

/// Normalize one upstream entry into an unenriched event record
pub fn normalize_entry(entry: &Value) -> Result<HazardEvent, NormalizeError> {
    let typed: FeedEntry = serde_json::from_value(entry.clone())
        .map_err(|e| NormalizeError::Shape(e.to_string()))?;

    let category = typed
        .categories
        .first()
        .ok_or(NormalizeError::MissingCategory)?;
    let geometry = typed
        .geometry
        .first()
        .ok_or(NormalizeError::MissingGeometry)?;

    let location = point_from_coordinates(&geometry.coordinates)?;

    let date = geometry.date.as_deref().ok_or(NormalizeError::MissingDate)?;
    let occurred_at = parse_feed_date(date)?;

    Ok(HazardEvent::new(
        category.title.clone(),
        location,
        occurred_at,
        entry.clone(),
    ))
}

/// Accept only point-shaped coordinates (GeoJSON `[longitude, latitude]`).
///
/// Polygon geometries (nested arrays) are rejected rather than guessed at;
/// the entry is skipped like any other malformed one.
fn point_from_coordinates(coordinates: &Value) -> Result<GeoPoint, NormalizeError> {
    let array = coordinates
        .as_array()
        .ok_or(NormalizeError::BadCoordinates)?;
    match (
        array.first().and_then(Value::as_f64),
        array.get(1).and_then(Value::as_f64),
    ) {
        (Some(longitude), Some(latitude)) => Ok(GeoPoint {
            longitude,
            latitude,
        }),
        _ => Err(NormalizeError::BadCoordinates),
    }
}

fn parse_feed_date(date: &str) -> Result<DateTime<Utc>, NormalizeError> {
    DateTime::parse_from_rfc3339(date)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| NormalizeError::BadDate(date.to_string()))
}
