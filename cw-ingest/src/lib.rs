//! cw-ingest - CrisisWatch feed ingestor
//!
//! Normalizes upstream hazard feed entries into canonical event records and
//! inserts them unenriched. The enrichment worker in cw-server picks them up
//! from there.

pub mod feed;
