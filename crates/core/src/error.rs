//! Unified error types for btx-offline.
//!
//! Display strings carry a stable `CODE: detail` prefix so tool clients can
//! match on the code without parsing the message.

use rmcp::model::{ErrorCode, ErrorData as McpError};
use tokio_rusqlite::rusqlite;

/// Unified error types for the offline asset cache.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid input parameters (e.g., an empty URL).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// URL could not be parsed or resolved against the scope.
    #[error("INVALID_URL: {0}")]
    InvalidUrl(String),

    /// No cache entry matched the request.
    #[error("CACHE_MISS: {0}")]
    CacheMiss(String),

    /// Database operation failed.
    #[error("CACHE_ERROR: {0}")]
    Database(tokio_rusqlite::Error),

    /// Connection-level failure without a rusqlite cause.
    #[error("CACHE_ERROR: {0}")]
    Storage(String),

    /// Migration failed to apply.
    #[error("CACHE_ERROR: migration failed: {0}")]
    MigrationFailed(String),

    /// The named bucket does not exist.
    #[error("CACHE_ERROR: bucket not found: {0}")]
    BucketNotFound(String),

    /// The response or request may not be stored (non-GET, partial, `Vary: *`, non-2xx).
    #[error("NOT_CACHEABLE: {0}")]
    NotCacheable(String),

    /// Storing the entry would exceed the storage quota.
    #[error("QUOTA_EXCEEDED: {needed} bytes needed, {available} available")]
    QuotaExceeded { needed: u64, available: u64 },

    /// Transport-level network failure.
    #[error("NETWORK_ERROR: {0}")]
    NetworkError(String),

    /// Network request timed out.
    #[error("FETCH_TIMEOUT: {0}")]
    FetchTimeout(String),

    /// Fetch response too large.
    #[error("FETCH_TOO_LARGE: {0}")]
    FetchTooLarge(String),

    /// A manifest asset could not be fetched during install.
    #[error("INSTALL_FAILED: {asset}: {reason}")]
    InstallFailed { asset: String, reason: String },

    /// Lifecycle transition not allowed from the current state.
    #[error("INVALID_STATE: cannot move from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },
}

impl Error {
    /// Whether this failure means the response could never be stored,
    /// as opposed to a storage-side failure (quota, database).
    pub fn is_not_cacheable(&self) -> bool {
        matches!(self, Error::NotCacheable(_))
    }
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => Error::Database(tokio_rusqlite::Error::Close(c)),
            other => Error::Storage(other.to_string()),
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

impl From<Error> for McpError {
    fn from(err: Error) -> Self {
        let code = match &err {
            Error::InvalidInput(_) => -32602,
            Error::InvalidUrl(_) => -32003,
            Error::CacheMiss(_) => -32001,
            Error::Database(_) | Error::Storage(_) | Error::MigrationFailed(_) | Error::BucketNotFound(_) => -32002,
            Error::NotCacheable(_) => -32004,
            Error::QuotaExceeded { .. } => -32005,
            Error::FetchTimeout(_) => -32006,
            Error::FetchTooLarge(_) => -32007,
            Error::NetworkError(_) => -32008,
            Error::InstallFailed { .. } => -32009,
            Error::InvalidStateTransition { .. } => -32010,
        };

        McpError { code: ErrorCode(code), message: err.to_string().into(), data: None }
    }
}
