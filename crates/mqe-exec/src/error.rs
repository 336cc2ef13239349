use std::time::Duration;

use mqe_core::api::{StorageError, StorageErrorCode};
use thiserror::Error;

/// Raised when the query's cancellation token fires before work completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("timeout after {0:?}")]
pub struct TimedOut(pub Duration);

impl From<TimedOut> for StorageError {
    fn from(t: TimedOut) -> Self {
        StorageError::new(StorageErrorCode::FetchTimeout, t.to_string())
    }
}
