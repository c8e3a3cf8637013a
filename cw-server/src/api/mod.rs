//! Read API endpoints
//!
//! Thin projections over the event store. Read endpoints degrade
//! gracefully: an empty store yields empty lists and zero counts, not
//! errors.

pub mod disasters;
pub mod health;
pub mod stats;

pub use disasters::disaster_routes;
pub use health::health_routes;
pub use stats::stats_routes;
