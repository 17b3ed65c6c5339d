//! Unified error types for tillcache.
//!
//! Storage failures are recovered locally wherever possible (treated as
//! cache misses) so a degraded cache never blocks the host's primary path.
//! Only transaction failures on ingestion are surfaced upward, since
//! silently dropping ingested data would cause silent staleness.

use tokio_rusqlite::rusqlite;

/// Unified error types for the product cache.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The backing store could not be opened. Raised once at `initialize()`;
    /// the cache thereafter behaves as an always-empty, always-miss cache.
    #[error("STORAGE_UNAVAILABLE: {0}")]
    StorageUnavailable(String),

    /// A batch write or eviction pass could not commit. Carries every id
    /// that was attempted so ingestion can be retried; the store is left in
    /// its pre-transaction state.
    #[error("TRANSACTION_FAILED: {reason} ({} record(s) attempted)", ids.len())]
    Transaction { ids: Vec<String>, reason: String },

    /// Database operation failed.
    #[error("CACHE_ERROR: {0}")]
    Database(tokio_rusqlite::Error),

    /// Migration failed to apply.
    #[error("CACHE_ERROR: migration failed: {0}")]
    MigrationFailed(String),

    /// Invalid input parameters (e.g., out-of-range ingestion priority).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => {
                Error::Database(tokio_rusqlite::Error::ConnectionClosed)
            }
            tokio_rusqlite::Error::Close(c) => Error::Database(tokio_rusqlite::Error::Close(c)),
            _ => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::Database(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(tokio_rusqlite::Error::Error(err))
    }
}
