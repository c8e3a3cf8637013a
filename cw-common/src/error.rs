//! Common error types for CrisisWatch

use thiserror::Error;

/// Common result type for CrisisWatch operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types shared by the CrisisWatch binaries
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed upstream feed entry or stored row
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
