//! Enrichment worker
//!
//! Drives the core pipeline: discover unenriched events, dispatch them to
//! the analyzer under a bounded worker pool, parse severity from the
//! response text, and commit results idempotently.
//!
//! Dispatch discipline: a pool of at most `pool_width` analysis futures in
//! flight, consumed in completion order and tracked by record guid. The
//! external request budget is enforced solely by the analyzer's token-bucket
//! limiter, so pool width and batch size never multiply into extra quota
//! pressure.
//!
//! Failure policy per record: analyzer success commits severity + analysis
//! (extraction ambiguity resolves to the safe default inside the extractor);
//! analyzer failure poisons the record (complete, no severity/analysis,
//! never retried). Loop-level failures back off and retry forever.

use crate::analysis::severity::extract_severity;
use crate::analysis::{AnalysisError, EventAnalyzer};
use cw_common::config::WorkerToml;
use cw_common::db::events as store;
use cw_common::HazardEvent;
use futures::stream::{FuturesUnordered, StreamExt};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Worker tuning, resolved from the TOML `[worker]` section
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Records fetched per discovery cycle
    pub batch_size: u32,
    /// Analysis futures in flight at once
    pub pool_width: usize,
    /// Sleep when discovery finds nothing
    pub idle_backoff: Duration,
    /// Sleep after finishing a batch
    pub cooldown: Duration,
    /// Sleep after a loop-level failure
    pub error_backoff: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            pool_width: 5,
            idle_backoff: Duration::from_secs(300),
            cooldown: Duration::from_secs(60),
            error_backoff: Duration::from_secs(60),
        }
    }
}

impl WorkerConfig {
    pub fn from_toml(worker: &WorkerToml) -> Self {
        let defaults = Self::default();
        Self {
            batch_size: worker.batch_size.unwrap_or(defaults.batch_size).max(1),
            pool_width: worker
                .pool_width
                .map(|w| w.max(1) as usize)
                .unwrap_or(defaults.pool_width),
            idle_backoff: worker
                .idle_backoff_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.idle_backoff),
            cooldown: worker
                .cooldown_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.cooldown),
            error_backoff: worker
                .error_backoff_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.error_backoff),
        }
    }
}

/// Outcome counts for one discovery/enrichment pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassSummary {
    /// Records discovered this pass
    pub fetched: usize,
    /// Committed with severity + analysis
    pub enriched: usize,
    /// Marked complete after analyzer failure
    pub poisoned: usize,
    /// Another worker claimed the record first
    pub lost_claims: usize,
}

/// Background enrichment worker.
///
/// The analyzer is injected so tests can substitute scripted doubles.
pub struct EnrichmentWorker<A: EventAnalyzer + 'static> {
    db: SqlitePool,
    analyzer: Arc<A>,
    config: WorkerConfig,
    cancel: CancellationToken,
}

impl<A: EventAnalyzer + 'static> EnrichmentWorker<A> {
    pub fn new(
        db: SqlitePool,
        analyzer: Arc<A>,
        config: WorkerConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            db,
            analyzer,
            config,
            cancel,
        }
    }

    /// Daemon mode: poll, enrich, back off, forever.
    ///
    /// Never terminates on a transient error; stops only on cancellation,
    /// letting in-flight per-record work finish first.
    pub async fn run(self) {
        info!(
            batch_size = self.config.batch_size,
            pool_width = self.config.pool_width,
            "Enrichment worker started"
        );

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            match self.run_once().await {
                Ok(summary) if summary.fetched == 0 => {
                    debug!(
                        "No unenriched events found; sleeping {:?}",
                        self.config.idle_backoff
                    );
                    if !self.sleep_cancellable(self.config.idle_backoff).await {
                        break;
                    }
                }
                Ok(summary) => {
                    info!(
                        fetched = summary.fetched,
                        enriched = summary.enriched,
                        poisoned = summary.poisoned,
                        lost_claims = summary.lost_claims,
                        "Batch complete; cooling down"
                    );
                    if !self.sleep_cancellable(self.config.cooldown).await {
                        break;
                    }
                }
                Err(e) => {
                    error!("Enrichment cycle failed: {}", e);
                    if !self.sleep_cancellable(self.config.error_backoff).await {
                        break;
                    }
                }
            }
        }

        info!("Enrichment worker stopped");
    }

    /// Batch mode: one finite discovery/enrichment pass
    pub async fn run_once(&self) -> cw_common::Result<PassSummary> {
        let batch = store::fetch_unenriched(&self.db, self.config.batch_size).await?;

        let mut summary = PassSummary {
            fetched: batch.len(),
            ..Default::default()
        };

        if batch.is_empty() {
            return Ok(summary);
        }

        info!(count = batch.len(), "Processing unenriched events");

        let analyze = |event: HazardEvent, analyzer: Arc<A>| async move {
            let result = analyzer.analyze(&event).await;
            (event.guid, result)
        };

        let mut pending = batch.into_iter();
        let mut in_flight = FuturesUnordered::new();

        // Seed the pool to its width
        for _ in 0..self.config.pool_width {
            if let Some(event) = pending.next() {
                in_flight.push(analyze(event, Arc::clone(&self.analyzer)));
            }
        }

        // Consume in completion order, topping the pool back up. On
        // cancellation, in-flight work drains and commits but nothing new
        // is dispatched.
        while let Some((guid, result)) = in_flight.next().await {
            self.commit_outcome(guid, result, &mut summary).await?;

            if !self.cancel.is_cancelled() {
                if let Some(event) = pending.next() {
                    in_flight.push(analyze(event, Arc::clone(&self.analyzer)));
                }
            }
        }

        Ok(summary)
    }

    /// Apply the deterministic commit policy for one analyzer outcome
    async fn commit_outcome(
        &self,
        guid: Uuid,
        result: Result<String, AnalysisError>,
        summary: &mut PassSummary,
    ) -> cw_common::Result<()> {
        match result {
            Ok(text) => {
                let severity = extract_severity(&text);
                if store::commit_enrichment(&self.db, guid, severity, &text).await? {
                    info!(guid = %guid, severity, "Event enriched");
                    summary.enriched += 1;
                } else {
                    debug!(guid = %guid, "Record already claimed by another worker");
                    summary.lost_claims += 1;
                }
            }
            Err(e) => {
                warn!(guid = %guid, "Analysis failed, poisoning record: {}", e);
                if store::poison_event(&self.db, guid).await? {
                    summary.poisoned += 1;
                } else {
                    debug!(guid = %guid, "Record already claimed by another worker");
                    summary.lost_claims += 1;
                }
            }
        }
        Ok(())
    }

    /// Sleep that races cancellation; returns false when cancelled
    async fn sleep_cancellable(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_config_defaults() {
        let config = WorkerConfig::from_toml(&WorkerToml::default());
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.pool_width, 5);
        assert_eq!(config.idle_backoff, Duration::from_secs(300));
        assert_eq!(config.cooldown, Duration::from_secs(60));
        assert_eq!(config.error_backoff, Duration::from_secs(60));
    }

    #[test]
    fn test_worker_config_overrides_and_floors() {
        let toml = WorkerToml {
            batch_size: Some(0),
            pool_width: Some(0),
            requests_per_minute: None,
            idle_backoff_secs: Some(10),
            cooldown_secs: Some(1),
            error_backoff_secs: Some(2),
        };
        let config = WorkerConfig::from_toml(&toml);
        // Zero widths would stall the pipeline
        assert_eq!(config.batch_size, 1);
        assert_eq!(config.pool_width, 1);
        assert_eq!(config.idle_backoff, Duration::from_secs(10));
        assert_eq!(config.cooldown, Duration::from_secs(1));
        assert_eq!(config.error_backoff, Duration::from_secs(2));
    }
}
