//! Memoization of subexpression results.
//!
//! A [`MemoTable`] lives for one query. It hands out one [`MemoScope`] per
//! `(timerange, predicate)` identity, so contexts derived with the same
//! window share results while different windows never do. Inside a scope
//! every fingerprint maps to a cell guarded by its own mutex: the first
//! caller computes while holding the cell lock, later callers block on it and
//! then read the stored outcome. The scope-level lock is only held long
//! enough to find or create a cell.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use mqe_core::hash::Hash256;
use mqe_core::predicate::Predicate;
use mqe_core::timerange::Timerange;

use crate::error::Result;
use crate::value::Value;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ScopeIdentity {
    timerange: Timerange,
    predicate: String,
}

#[derive(Debug, Default)]
pub struct MemoTable {
    scopes: Mutex<HashMap<ScopeIdentity, Arc<MemoScope>>>,
}

impl MemoTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The scope shared by every context with this timerange and predicate.
    pub fn scope(&self, timerange: Timerange, predicate: &Predicate) -> Arc<MemoScope> {
        let identity = ScopeIdentity {
            timerange,
            predicate: predicate.query(),
        };
        let mut scopes = self.scopes.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(scopes.entry(identity).or_default())
    }

    pub fn scope_count(&self) -> usize {
        self.scopes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[derive(Debug, Default)]
struct Cell {
    outcome: Option<Result<Value>>,
}

#[derive(Debug, Default)]
pub struct MemoScope {
    cells: Mutex<HashMap<Hash256, Arc<Mutex<Cell>>>>,
}

impl MemoScope {
    /// Return the stored outcome for `key`, running `compute` first if no
    /// caller has finished it yet. Errors are stored like values.
    pub fn evaluate<F>(&self, key: Hash256, compute: F) -> Result<Value>
    where
        F: FnOnce() -> Result<Value>,
    {
        let cell = {
            let mut cells = self.cells.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(cells.entry(key).or_default())
        };
        let mut cell = cell.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(outcome) = &cell.outcome {
            #[cfg(feature = "tracing")]
            tracing::trace!(%key, "memo hit");
            return outcome.clone();
        }
        #[cfg(feature = "tracing")]
        tracing::trace!(%key, "memo miss");
        let outcome = compute();
        cell.outcome = Some(outcome.clone());
        outcome
    }

    /// Number of fingerprints seen by this scope.
    pub fn len(&self) -> usize {
        self.cells
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
