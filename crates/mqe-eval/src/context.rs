//! Per-query evaluation context.
//!
//! The context is cheap to clone: everything shared across the query sits
//! behind one `Arc`, and only the timerange, predicate and memo scope vary
//! between derived contexts.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use mqe_core::prelude::{
    EngineConfig, FetchCounter, MetricMetadata, Predicate, Profiler, SampleMethod, Timeout,
    Timerange, TimeseriesStorage,
};

use crate::error::Result;
use crate::function::MetricFunction;
use crate::memo::{MemoScope, MemoTable};
use crate::registry::Registry;

/// Advisory diagnostics collected during evaluation (e.g. counter resets).
/// Clones share the same list.
#[derive(Debug, Clone, Default)]
pub struct Notes(Arc<Mutex<Vec<String>>>);

impl Notes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, note: impl Into<String>) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(note.into());
    }

    pub fn all(&self) -> Vec<String> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

struct Shared {
    storage: Arc<dyn TimeseriesStorage>,
    metadata: Arc<dyn MetricMetadata>,
    registry: Arc<Registry>,
    sample_method: SampleMethod,
    fetch_limit: FetchCounter,
    timeout: Timeout,
    timeout_limit: Duration,
    profiler: Profiler,
    notes: Notes,
    memo: Option<MemoTable>,
    slot_limit: usize,
}

#[derive(Clone)]
pub struct EvaluationContext {
    shared: Arc<Shared>,
    timerange: Timerange,
    predicate: Predicate,
    scope: Option<Arc<MemoScope>>,
}

impl EvaluationContext {
    pub fn builder(
        storage: Arc<dyn TimeseriesStorage>,
        metadata: Arc<dyn MetricMetadata>,
        registry: Arc<Registry>,
        timerange: Timerange,
    ) -> EvaluationContextBuilder {
        EvaluationContextBuilder::new(storage, metadata, registry, timerange)
    }

    pub fn timerange(&self) -> Timerange {
        self.timerange
    }

    pub fn predicate(&self) -> &Predicate {
        &self.predicate
    }

    pub fn storage(&self) -> &dyn TimeseriesStorage {
        self.shared.storage.as_ref()
    }

    pub fn metadata(&self) -> &dyn MetricMetadata {
        self.shared.metadata.as_ref()
    }

    pub fn registry(&self) -> &Registry {
        &self.shared.registry
    }

    pub fn function(&self, name: &str) -> Option<&MetricFunction> {
        self.shared.registry.get(name)
    }

    pub fn sample_method(&self) -> SampleMethod {
        self.shared.sample_method
    }

    pub fn fetch_limit(&self) -> &FetchCounter {
        &self.shared.fetch_limit
    }

    /// Take `n` series from the query's fetch budget.
    pub fn fetch_limit_consume(&self, n: usize) -> Result<()> {
        Ok(self.shared.fetch_limit.consume(n)?)
    }

    pub fn timeout(&self) -> &Timeout {
        &self.shared.timeout
    }

    /// The configured deadline, as reported in timeout errors.
    pub fn timeout_limit(&self) -> Duration {
        self.shared.timeout_limit
    }

    pub fn profiler(&self) -> &Profiler {
        &self.shared.profiler
    }

    pub fn slot_limit(&self) -> usize {
        self.shared.slot_limit
    }

    pub fn add_note(&self, note: impl Into<String>) {
        self.shared.notes.add(note);
    }

    pub fn notes(&self) -> Vec<String> {
        self.shared.notes.all()
    }

    /// `None` when memoization is disabled.
    pub fn memo_scope(&self) -> Option<&MemoScope> {
        self.scope.as_deref()
    }

    /// Same query over a different window. Keeps the current memo scope when
    /// the timerange is unchanged.
    pub fn with_timerange(&self, timerange: Timerange) -> Self {
        if timerange == self.timerange {
            return self.clone();
        }
        self.derive(timerange, self.predicate.clone())
    }

    /// Further restrict the tagsets every metric leaf fetches.
    pub fn with_additional_constraint(&self, predicate: Predicate) -> Self {
        self.derive(self.timerange, self.predicate.clone().and(predicate))
    }

    fn derive(&self, timerange: Timerange, predicate: Predicate) -> Self {
        let scope = self
            .shared
            .memo
            .as_ref()
            .map(|table| table.scope(timerange, &predicate));
        Self {
            shared: Arc::clone(&self.shared),
            timerange,
            predicate,
            scope,
        }
    }
}

impl std::fmt::Debug for EvaluationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvaluationContext")
            .field("timerange", &self.timerange)
            .field("predicate", &self.predicate.query())
            .field("fetch_limit", &self.shared.fetch_limit)
            .field("memoized", &self.scope.is_some())
            .finish()
    }
}

/// Assembles an [`EvaluationContext`]. Anything not set falls back to
/// [`EngineConfig::default`].
pub struct EvaluationContextBuilder {
    storage: Arc<dyn TimeseriesStorage>,
    metadata: Arc<dyn MetricMetadata>,
    registry: Arc<Registry>,
    timerange: Timerange,
    predicate: Predicate,
    sample_method: SampleMethod,
    fetch_limit: Option<FetchCounter>,
    fetch_limit_size: usize,
    timeout: Option<Timeout>,
    timeout_limit: Duration,
    profiler: Profiler,
    notes: Notes,
    memoize: bool,
    slot_limit: usize,
}

impl EvaluationContextBuilder {
    pub fn new(
        storage: Arc<dyn TimeseriesStorage>,
        metadata: Arc<dyn MetricMetadata>,
        registry: Arc<Registry>,
        timerange: Timerange,
    ) -> Self {
        let defaults = EngineConfig::default();
        Self {
            storage,
            metadata,
            registry,
            timerange,
            predicate: Predicate::always(),
            sample_method: defaults.default_sample_method,
            fetch_limit: None,
            fetch_limit_size: defaults.fetch_limit,
            timeout: None,
            timeout_limit: defaults.fetch_timeout(),
            profiler: Profiler::disabled(),
            notes: Notes::new(),
            memoize: defaults.memoize,
            slot_limit: defaults.slot_limit,
        }
    }

    /// Apply limits and defaults from `config`.
    pub fn config(mut self, config: &EngineConfig) -> Self {
        self.sample_method = config.default_sample_method;
        self.fetch_limit_size = config.fetch_limit;
        self.timeout_limit = config.fetch_timeout();
        self.memoize = config.memoize;
        self.slot_limit = config.slot_limit;
        self
    }

    pub fn predicate(mut self, predicate: Predicate) -> Self {
        self.predicate = predicate;
        self
    }

    pub fn sample_method(mut self, sample_method: SampleMethod) -> Self {
        self.sample_method = sample_method;
        self
    }

    /// Share an existing budget instead of creating one.
    pub fn fetch_limit(mut self, counter: FetchCounter) -> Self {
        self.fetch_limit = Some(counter);
        self
    }

    /// Use an existing cancellation token; `limit` is what timeout errors report.
    pub fn timeout(mut self, timeout: Timeout, limit: Duration) -> Self {
        self.timeout = Some(timeout);
        self.timeout_limit = limit;
        self
    }

    pub fn profiler(mut self, profiler: Profiler) -> Self {
        self.profiler = profiler;
        self
    }

    pub fn notes(mut self, notes: Notes) -> Self {
        self.notes = notes;
        self
    }

    pub fn memoize(mut self, memoize: bool) -> Self {
        self.memoize = memoize;
        self
    }

    pub fn build(self) -> EvaluationContext {
        let memo = self.memoize.then(MemoTable::new);
        let scope = memo
            .as_ref()
            .map(|table| table.scope(self.timerange, &self.predicate));
        let shared = Shared {
            storage: self.storage,
            metadata: self.metadata,
            registry: self.registry,
            sample_method: self.sample_method,
            fetch_limit: self
                .fetch_limit
                .unwrap_or_else(|| FetchCounter::new(self.fetch_limit_size)),
            timeout: self
                .timeout
                .unwrap_or_else(|| Timeout::new(self.timeout_limit)),
            timeout_limit: self.timeout_limit,
            profiler: self.profiler,
            notes: self.notes,
            memo,
            slot_limit: self.slot_limit,
        };
        EvaluationContext {
            shared: Arc::new(shared),
            timerange: self.timerange,
            predicate: self.predicate,
            scope,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mqe_exec::{MetadataMap, PointStorage};

    fn context(memoize: bool) -> EvaluationContext {
        EvaluationContext::builder(
            Arc::new(PointStorage::new()),
            Arc::new(MetadataMap::new()),
            Arc::new(Registry::new()),
            Timerange::new(0, 120_000, 30_000).unwrap(),
        )
        .memoize(memoize)
        .timeout(Timeout::never(), Duration::from_secs(1))
        .build()
    }

    #[test]
    fn unchanged_timerange_keeps_scope() {
        let ctx = context(true);
        let same = ctx.with_timerange(ctx.timerange());
        assert!(std::ptr::eq(
            ctx.memo_scope().unwrap(),
            same.memo_scope().unwrap()
        ));
        let wider = ctx.with_timerange(ctx.timerange().extend_before(60_000));
        assert!(!std::ptr::eq(
            ctx.memo_scope().unwrap(),
            wider.memo_scope().unwrap()
        ));
        assert_eq!(wider.timerange().slots(), 7);
        // going back to the original window finds the original scope
        let back = wider.with_timerange(ctx.timerange());
        assert!(std::ptr::eq(
            ctx.memo_scope().unwrap(),
            back.memo_scope().unwrap()
        ));
    }

    #[test]
    fn disabled_memoization_has_no_scope() {
        let ctx = context(false);
        assert!(ctx.memo_scope().is_none());
        assert!(ctx
            .with_additional_constraint(Predicate::equals("a", "b"))
            .memo_scope()
            .is_none());
    }

    #[test]
    fn notes_and_budget_are_shared_by_derived_contexts() {
        let ctx = context(true);
        let derived = ctx
            .with_timerange(ctx.timerange().shift(30_000))
            .with_additional_constraint(Predicate::equals("host", "a"));
        derived.add_note("first");
        ctx.add_note("second");
        assert_eq!(ctx.notes(), vec!["first".to_string(), "second".to_string()]);

        derived.fetch_limit_consume(4).unwrap();
        assert_eq!(ctx.fetch_limit().current(), 4);
        assert_eq!(derived.predicate().query(), "host = \"a\"");
    }

    #[test]
    fn config_sets_limits() {
        let config = EngineConfig {
            fetch_limit: 3,
            ..EngineConfig::default()
        };
        let ctx = EvaluationContext::builder(
            Arc::new(PointStorage::new()),
            Arc::new(MetadataMap::new()),
            Arc::new(Registry::new()),
            Timerange::new(0, 0, 1_000).unwrap(),
        )
        .config(&config)
        .build();
        assert_eq!(ctx.fetch_limit().limit(), 3);
        assert!(ctx.fetch_limit_consume(4).is_err());
    }
}
