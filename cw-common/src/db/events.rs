//! Event store operations
//!
//! The store owns all event fields. The ingestor only calls
//! [`insert_event`]; the enrichment worker only calls [`fetch_unenriched`],
//! [`commit_enrichment`] and [`poison_event`]; the read API only calls the
//! projection queries.
//!
//! Enrichment commits are conditional on `status = 'pending'`, so a record
//! is claimed at most once even when multiple workers race on the same
//! database (optimistic claiming).

use crate::events::{EnrichmentStatus, GeoPoint, HazardEvent};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

/// Aggregate counts for the stats endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    /// All records, any status
    pub total_events: i64,
    /// Records with a committed severity and analysis
    pub processed: i64,
    /// Enriched records with severity > 7
    pub high_severity: i64,
}

fn event_from_row(row: &SqliteRow) -> Result<HazardEvent> {
    let guid_str: String = row.get("guid");
    let guid = Uuid::parse_str(&guid_str)
        .map_err(|e| Error::InvalidData(format!("bad guid {}: {}", guid_str, e)))?;

    let status_str: String = row.get("status");
    let status = EnrichmentStatus::parse(&status_str)
        .ok_or_else(|| Error::InvalidData(format!("bad status: {}", status_str)))?;

    let raw_str: String = row.get("raw_data");
    let raw_data = serde_json::from_str(&raw_str)
        .map_err(|e| Error::InvalidData(format!("bad raw_data: {}", e)))?;

    let severity: Option<i64> = row.get("severity");

    Ok(HazardEvent {
        guid,
        event_type: row.get("event_type"),
        location: GeoPoint {
            longitude: row.get("longitude"),
            latitude: row.get("latitude"),
        },
        occurred_at: parse_timestamp(&row.get::<String, _>("occurred_at"))?,
        raw_data,
        status,
        severity: severity.map(|s| s as u8),
        analysis: row.get("analysis"),
        enriched_at: row
            .get::<Option<String>, _>("enriched_at")
            .map(|s| parse_timestamp(&s))
            .transpose()?,
        created_at: parse_timestamp(&row.get::<String, _>("created_at"))?,
    })
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::InvalidData(format!("bad timestamp {}: {}", s, e)))
}

/// Insert a new unenriched event (ingestor path)
pub async fn insert_event(pool: &SqlitePool, event: &HazardEvent) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO events
            (guid, event_type, longitude, latitude, occurred_at, raw_data,
             status, severity, analysis, enriched_at, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(event.guid.to_string())
    .bind(&event.event_type)
    .bind(event.location.longitude)
    .bind(event.location.latitude)
    .bind(event.occurred_at.to_rfc3339())
    .bind(event.raw_data.to_string())
    .bind(event.status.as_str())
    .bind(event.severity.map(|s| s as i64))
    .bind(&event.analysis)
    .bind(event.enriched_at.map(|t| t.to_rfc3339()))
    .bind(event.created_at.to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}

/// Fetch up to `limit` unenriched records in insertion order
pub async fn fetch_unenriched(pool: &SqlitePool, limit: u32) -> Result<Vec<HazardEvent>> {
    let rows = sqlx::query("SELECT * FROM events WHERE status = 'pending' ORDER BY rowid LIMIT ?")
        .bind(limit as i64)
        .fetch_all(pool)
        .await?;

    rows.iter().map(event_from_row).collect()
}

/// Commit a successful enrichment.
///
/// Conditional on the record still being pending; returns false when another
/// worker already claimed it (the caller should not treat that as a failure).
pub async fn commit_enrichment(
    pool: &SqlitePool,
    guid: Uuid,
    severity: u8,
    analysis: &str,
) -> Result<bool> {
    if !(1..=10).contains(&severity) {
        return Err(Error::InvalidData(format!(
            "severity {} outside 1..=10",
            severity
        )));
    }
    if analysis.is_empty() {
        return Err(Error::InvalidData("empty analysis text".to_string()));
    }

    let result = sqlx::query(
        r#"
        UPDATE events
        SET severity = ?, analysis = ?, status = 'complete', enriched_at = ?
        WHERE guid = ? AND status = 'pending'
        "#,
    )
    .bind(severity as i64)
    .bind(analysis)
    .bind(Utc::now().to_rfc3339())
    .bind(guid.to_string())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Mark a record complete with no severity or analysis (poison-pill).
///
/// The record is never re-selected by [`fetch_unenriched`] afterwards;
/// completeness is traded for forward progress.
pub async fn poison_event(pool: &SqlitePool, guid: Uuid) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE events SET status = 'complete' WHERE guid = ? AND status = 'pending'",
    )
    .bind(guid.to_string())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Enriched records, most recently enriched first, capped at `limit`
pub async fn recent_enriched(pool: &SqlitePool, limit: u32) -> Result<Vec<HazardEvent>> {
    let rows = sqlx::query(
        r#"
        SELECT * FROM events
        WHERE status = 'complete' AND severity IS NOT NULL
        ORDER BY enriched_at DESC
        LIMIT ?
        "#,
    )
    .bind(limit as i64)
    .fetch_all(pool)
    .await?;

    rows.iter().map(event_from_row).collect()
}

/// Aggregate counts for the stats endpoint.
///
/// `processed` counts truly enriched records; poisoned records count toward
/// `total_events` only.
pub async fn count_stats(pool: &SqlitePool) -> Result<StoreStats> {
    let total_events: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM events")
        .fetch_one(pool)
        .await?;

    let processed: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM events WHERE status = 'complete' AND severity IS NOT NULL",
    )
    .fetch_one(pool)
    .await?;

    let high_severity: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM events WHERE severity > 7")
            .fetch_one(pool)
            .await?;

    Ok(StoreStats {
        total_events,
        processed,
        high_severity,
    })
}

/// One arbitrary stored record, if any (diagnostic endpoint)
pub async fn sample_event(pool: &SqlitePool) -> Result<Option<HazardEvent>> {
    let row = sqlx::query("SELECT * FROM events LIMIT 1")
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(event_from_row).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePool::connect("sqlite::memory:")
            .await
            .expect("Failed to create in-memory database");
        crate::db::init_tables(&pool).await.expect("schema init");
        pool
    }

    fn pending_event(event_type: &str) -> HazardEvent {
        HazardEvent::new(
            event_type.to_string(),
            GeoPoint {
                longitude: -120.5,
                latitude: 38.2,
            },
            Utc::now(),
            json!({
                "title": "Test event",
                "description": "A test",
                "sources": [{"id": "X", "url": "https://example.com/report"}]
            }),
        )
    }

    #[tokio::test]
    async fn test_insert_and_fetch_unenriched() {
        let pool = test_pool().await;
        let event = pending_event("Wildfires");
        insert_event(&pool, &event).await.expect("insert");

        let batch = fetch_unenriched(&pool, 10).await.expect("fetch");
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].guid, event.guid);
        assert_eq!(batch[0].event_type, "Wildfires");
        assert_eq!(batch[0].status, EnrichmentStatus::Pending);
        assert!(batch[0].severity.is_none());
        assert_eq!(batch[0].location, event.location);
        assert_eq!(batch[0].raw_data["title"], "Test event");
    }

    #[tokio::test]
    async fn test_fetch_unenriched_respects_limit_and_order() {
        let pool = test_pool().await;
        let mut guids = Vec::new();
        for i in 0..5 {
            let event = pending_event(&format!("Type{}", i));
            guids.push(event.guid);
            insert_event(&pool, &event).await.expect("insert");
        }

        let batch = fetch_unenriched(&pool, 3).await.expect("fetch");
        assert_eq!(batch.len(), 3);
        // Insertion order
        assert_eq!(batch[0].guid, guids[0]);
        assert_eq!(batch[2].guid, guids[2]);
    }

    #[tokio::test]
    async fn test_commit_enrichment() {
        let pool = test_pool().await;
        let event = pending_event("Severe Storms");
        insert_event(&pool, &event).await.expect("insert");

        let claimed = commit_enrichment(&pool, event.guid, 8, "Severity score: 8. High winds.")
            .await
            .expect("commit");
        assert!(claimed);

        // Not re-selected
        let batch = fetch_unenriched(&pool, 10).await.expect("fetch");
        assert!(batch.is_empty());

        let enriched = recent_enriched(&pool, 10).await.expect("recent");
        assert_eq!(enriched.len(), 1);
        assert_eq!(enriched[0].severity, Some(8));
        assert!(enriched[0].is_enriched());
        assert!(enriched[0].enriched_at.is_some());
    }

    #[tokio::test]
    async fn test_commit_rejects_out_of_range_severity() {
        let pool = test_pool().await;
        let event = pending_event("Wildfires");
        insert_event(&pool, &event).await.expect("insert");

        assert!(commit_enrichment(&pool, event.guid, 0, "text").await.is_err());
        assert!(commit_enrichment(&pool, event.guid, 11, "text").await.is_err());
        assert!(commit_enrichment(&pool, event.guid, 5, "").await.is_err());

        // Record untouched
        let batch = fetch_unenriched(&pool, 10).await.expect("fetch");
        assert_eq!(batch.len(), 1);
    }

    #[tokio::test]
    async fn test_optimistic_claim_second_commit_loses() {
        let pool = test_pool().await;
        let event = pending_event("Floods");
        insert_event(&pool, &event).await.expect("insert");

        let first = commit_enrichment(&pool, event.guid, 6, "Severity score: 6")
            .await
            .expect("commit");
        let second = commit_enrichment(&pool, event.guid, 9, "Severity score: 9")
            .await
            .expect("commit");
        assert!(first);
        assert!(!second);

        let enriched = recent_enriched(&pool, 10).await.expect("recent");
        assert_eq!(enriched[0].severity, Some(6));
    }

    #[tokio::test]
    async fn test_poison_event_never_reselected() {
        let pool = test_pool().await;
        let event = pending_event("Volcanoes");
        insert_event(&pool, &event).await.expect("insert");

        let poisoned = poison_event(&pool, event.guid).await.expect("poison");
        assert!(poisoned);

        let batch = fetch_unenriched(&pool, 10).await.expect("fetch");
        assert!(batch.is_empty());

        // Poisoned records are complete with no severity/analysis and do not
        // appear in the enriched listing
        let sample = sample_event(&pool).await.expect("sample").expect("row");
        assert!(sample.is_poisoned());
        assert!(sample.analysis.is_none());
        assert!(recent_enriched(&pool, 10).await.expect("recent").is_empty());

        // A later poison or commit on the same record is a no-op
        assert!(!poison_event(&pool, event.guid).await.expect("poison"));
        assert!(!commit_enrichment(&pool, event.guid, 5, "late").await.expect("commit"));
    }

    #[tokio::test]
    async fn test_recent_enriched_ordering_and_cap() {
        let pool = test_pool().await;
        let mut guids = Vec::new();
        for _ in 0..3 {
            let event = pending_event("Wildfires");
            guids.push(event.guid);
            insert_event(&pool, &event).await.expect("insert");
        }
        // Commit in order; enriched_at increases monotonically
        for (i, guid) in guids.iter().enumerate() {
            commit_enrichment(&pool, *guid, 5, &format!("analysis {}", i))
                .await
                .expect("commit");
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }

        let enriched = recent_enriched(&pool, 2).await.expect("recent");
        assert_eq!(enriched.len(), 2);
        // Most recently enriched first
        assert_eq!(enriched[0].guid, guids[2]);
        assert_eq!(enriched[1].guid, guids[1]);
    }

    #[tokio::test]
    async fn test_count_stats() {
        let pool = test_pool().await;

        // 4 total: 2 enriched (one high severity), 1 poisoned, 1 pending
        let events: Vec<HazardEvent> = (0..4).map(|_| pending_event("Wildfires")).collect();
        for event in &events {
            insert_event(&pool, event).await.expect("insert");
        }
        commit_enrichment(&pool, events[0].guid, 9, "Severity score: 9")
            .await
            .expect("commit");
        commit_enrichment(&pool, events[1].guid, 4, "Severity score: 4")
            .await
            .expect("commit");
        poison_event(&pool, events[2].guid).await.expect("poison");

        let stats = count_stats(&pool).await.expect("stats");
        assert_eq!(
            stats,
            StoreStats {
                total_events: 4,
                processed: 2,
                high_severity: 1,
            }
        );
    }

    #[tokio::test]
    async fn test_sample_event_empty_store() {
        let pool = test_pool().await;
        assert!(sample_event(&pool).await.expect("sample").is_none());
    }
}
