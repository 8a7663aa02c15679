//! Store and configuration errors

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Failures below the HTTP layer
///
/// The server maps `NotFound` to 404, `InvalidInput` to 400 and everything
/// else to 500.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Missing or unreadable startup settings
    #[error("Configuration error: {0}")]
    Config(String),

    /// Project or entry absent
    #[error("Not found: {0}")]
    NotFound(String),

    /// Rejected before any write, e.g. a blank project name
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// JSON columns, roles or timestamps that fail to encode or decode
    #[error("Internal error: {0}")]
    Internal(String),
}
