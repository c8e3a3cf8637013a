//! Hazard event model
//!
//! A hazard event is created unenriched by the feed ingestor, discovered by
//! the enrichment worker, and committed as either an enrichment success or a
//! poisoned record. Raw feed fields are immutable after creation; only the
//! enrichment fields (severity, analysis, status, enriched_at) change, and
//! only once.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Enrichment lifecycle state, stored as TEXT in the `status` column.
///
/// This is the canonical completion representation. A `Complete` row with
/// `severity IS NULL` is a poisoned record: analysis failed permanently and
/// the record is never retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnrichmentStatus {
    /// Created by the ingestor, not yet processed
    Pending,
    /// Processed: enriched (severity + analysis set) or poisoned (both unset)
    Complete,
}

impl EnrichmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnrichmentStatus::Pending => "pending",
            EnrichmentStatus::Complete => "complete",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(EnrichmentStatus::Pending),
            "complete" => Some(EnrichmentStatus::Complete),
            _ => None,
        }
    }
}

/// Point location of a hazard event (GeoJSON coordinate order)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub longitude: f64,
    pub latitude: f64,
}

/// One hazard event record
#[derive(Debug, Clone, Serialize)]
pub struct HazardEvent {
    /// Internal identifier, assigned at ingest
    pub guid: Uuid,
    /// Category label from the upstream feed (e.g. "Wildfires")
    pub event_type: String,
    /// Point location
    pub location: GeoPoint,
    /// When the event occurred per the feed geometry entry
    pub occurred_at: DateTime<Utc>,
    /// Opaque upstream payload (title, description, source links)
    pub raw_data: serde_json::Value,
    /// Enrichment lifecycle state
    pub status: EnrichmentStatus,
    /// Severity score in 1..=10, set only on successful enrichment
    pub severity: Option<u8>,
    /// Analysis text from the external service
    pub analysis: Option<String>,
    /// When enrichment succeeded
    pub enriched_at: Option<DateTime<Utc>>,
    /// When the record was inserted
    pub created_at: DateTime<Utc>,
}

impl HazardEvent {
    /// Create a new unenriched event (ingestor path)
    pub fn new(
        event_type: String,
        location: GeoPoint,
        occurred_at: DateTime<Utc>,
        raw_data: serde_json::Value,
    ) -> Self {
        Self {
            guid: Uuid::new_v4(),
            event_type,
            location,
            occurred_at,
            raw_data,
            status: EnrichmentStatus::Pending,
            severity: None,
            analysis: None,
            enriched_at: None,
            created_at: Utc::now(),
        }
    }

    /// True when the record carries a committed severity and analysis
    pub fn is_enriched(&self) -> bool {
        self.status == EnrichmentStatus::Complete && self.severity.is_some()
    }

    /// True when the record was deliberately abandoned after analysis failure
    pub fn is_poisoned(&self) -> bool {
        self.status == EnrichmentStatus::Complete && self.severity.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_event() -> HazardEvent {
        HazardEvent::new(
            "Wildfires".to_string(),
            GeoPoint {
                longitude: -120.5,
                latitude: 38.2,
            },
            Utc::now(),
            json!({"title": "Fire near ridge", "description": "", "sources": []}),
        )
    }

    #[test]
    fn test_new_event_is_unenriched() {
        let event = sample_event();
        assert_eq!(event.status, EnrichmentStatus::Pending);
        assert!(event.severity.is_none());
        assert!(event.analysis.is_none());
        assert!(event.enriched_at.is_none());
        assert!(!event.is_enriched());
        assert!(!event.is_poisoned());
    }

    #[test]
    fn test_status_round_trip() {
        for status in [EnrichmentStatus::Pending, EnrichmentStatus::Complete] {
            assert_eq!(EnrichmentStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(EnrichmentStatus::parse("processed"), None);
    }

    #[test]
    fn test_poisoned_vs_enriched() {
        let mut event = sample_event();
        event.status = EnrichmentStatus::Complete;
        assert!(event.is_poisoned());

        event.severity = Some(7);
        event.analysis = Some("Severity score: 7".to_string());
        assert!(event.is_enriched());
        assert!(!event.is_poisoned());
    }
}
