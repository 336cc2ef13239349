//! Fetch budget shared by every leaf of one query.
//!
//! Cloning a `FetchCounter` shares the underlying budget. Consumption is a
//! single atomic subtraction; an overdraft is reported but not rolled back,
//! so `current()` keeps reflecting everything that was asked for.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use crate::error::{Error, Result};

struct CounterInner {
    limit: usize,
    remaining: AtomicI64,
}

#[derive(Clone)]
pub struct FetchCounter {
    inner: Arc<CounterInner>,
}

impl FetchCounter {
    pub fn new(limit: usize) -> Self {
        Self {
            inner: Arc::new(CounterInner {
                limit,
                remaining: AtomicI64::new(limit as i64),
            }),
        }
    }

    pub fn limit(&self) -> usize {
        self.inner.limit
    }

    /// Number of series consumed so far (may exceed `limit` after a failure).
    pub fn current(&self) -> i64 {
        self.inner.limit as i64 - self.inner.remaining.load(Ordering::Acquire)
    }

    /// Take `n` series from the budget. Fails with `LimitExceeded` when the
    /// total would go past the limit.
    pub fn consume(&self, n: usize) -> Result<()> {
        let remaining = self.inner.remaining.fetch_sub(n as i64, Ordering::AcqRel) - n as i64;
        if remaining < 0 {
            #[cfg(feature = "tracing")]
            tracing::debug!(requested = n, limit = self.inner.limit, "fetch limit exceeded");
            return Err(Error::LimitExceeded {
                requested: n,
                actual: self.inner.limit as i64 - remaining,
                limit: self.inner.limit,
            });
        }
        Ok(())
    }
}

impl std::fmt::Debug for FetchCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchCounter")
            .field("limit", &self.inner.limit)
            .field("current", &self.current())
            .finish()
    }
}
