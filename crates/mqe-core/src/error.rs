use thiserror::Error;

use crate::api::StorageError;

/// Canonical result for core.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid timerange: {0}")]
    Timerange(String),

    /// Raised by `FetchCounter::consume`. `actual` is the total consumed
    /// including the request that overflowed.
    #[error("performing fetch of {requested} additional series brings the total to {actual}, which exceeds the specified limit {limit}")]
    LimitExceeded {
        requested: usize,
        actual: i64,
        limit: usize,
    },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Config(e.to_string())
    }
}
