use thiserror::Error;

use crate::fetch_error::FetchError;

/// Application-wide error types for hasharchive.
#[derive(Error, Debug)]
pub enum AppError {
    /// Transient store failure (lock contention, I/O inside the engine).
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// The requested entry does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A record already exists at this sequence number.
    #[error("Sequence collision at ({time}, {id})")]
    Conflict { time: u64, id: u64 },

    /// A persisted key or value could not be decoded.
    #[error("Corrupt index entry: {0}")]
    Corrupt(String),

    /// A value cannot be represented in the key layout.
    #[error("Invalid key field: {0}")]
    InvalidKey(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid hash URI: {0}")]
    InvalidHashUri(String),

    /// The fetcher reported a failure.
    #[error("Fetch failed: {0}")]
    Fetch(#[from] FetchError),

    /// Malformed dump stream.
    #[error("Dump format error: {0}")]
    Dump(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl AppError {
    /// Returns true for conditions that indicate index corruption or a caller bug.
    ///
    /// These must never be retried or swallowed.
    pub fn is_fatal(&self) -> bool {
        matches!(self, AppError::Conflict { .. } | AppError::Corrupt(_))
    }
}
