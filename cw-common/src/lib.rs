//! # CrisisWatch Common Library
//!
//! Shared code for the CrisisWatch binaries including:
//! - Hazard event model and enrichment status
//! - Event store (SQLite schema and queries)
//! - Configuration loading
//! - Common error types

pub mod config;
pub mod db;
pub mod error;
pub mod events;

pub use error::{Error, Result};
pub use events::{EnrichmentStatus, GeoPoint, HazardEvent};
