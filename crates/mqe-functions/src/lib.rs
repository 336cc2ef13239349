#![forbid(unsafe_code)]
//! mqe-functions: the built-in operator library.
//!
//! Each module holds the numeric kernels for one family of operators as
//! plain functions over `&[f64]` / [`SeriesList`], plus the registration of
//! the named [`MetricFunction`](mqe_eval::MetricFunction)s that wrap them:
//!
//! - `transform.*`: pointwise maps, running sums, gap filling, clamping
//! - `window`: operators that read history before the query window
//!   (derivative, rate, moving averages, timeshift)
//! - `summarize.*`, `filter.*`, `aggregate.*`, `tag.*`
//! - `+ - * /` over a tag-aware join
//! - `forecast.*`: rolling Holt-Winters, seasonal and linear models
//!
//! [`builtin_registry`] returns a process-wide registry holding all of them.

use std::sync::Arc;

use once_cell::sync::Lazy;

use mqe_core::series::SeriesList;
use mqe_eval::{EvalError, EvaluationContext, Expression, Registry, Result};

pub mod aggregate;
pub mod arithmetic;
pub mod filter;
pub mod forecast;
pub mod join;
pub mod summary;
pub mod tag;
pub mod transform;
pub mod window;

pub use join::{join, JoinRow};

/// Register every built-in function into `registry`.
pub fn register_builtins(registry: &mut Registry) -> Result<()> {
    transform::register(registry)?;
    window::register(registry)?;
    summary::register(registry)?;
    filter::register(registry)?;
    aggregate::register(registry)?;
    tag::register(registry)?;
    arithmetic::register(registry)?;
    forecast::register(registry)?;
    Ok(())
}

static BUILTINS: Lazy<Result<Arc<Registry>>> = Lazy::new(|| {
    let mut registry = Registry::new();
    register_builtins(&mut registry)?;
    #[cfg(feature = "tracing")]
    tracing::debug!(functions = registry.len(), "built-in registry ready");
    Ok(Arc::new(registry))
});

/// The shared registry of built-in functions.
pub fn builtin_registry() -> Result<Arc<Registry>> {
    BUILTINS.as_ref().map(Arc::clone).map_err(Clone::clone)
}

/// Evaluate an unevaluated series argument, reporting conversion failures
/// against `function`'s argument `position`.
pub(crate) fn evaluate_series(
    function: &str,
    position: usize,
    name: &str,
    expr: &Expression,
    ctx: &EvaluationContext,
) -> Result<SeriesList> {
    expr.evaluate(ctx)?
        .into_series_list(ctx.timerange(), &expr.to_string())
        .map_err(|source| EvalError::ArgumentType {
            function: function.to_string(),
            position,
            name: name.to_string(),
            source,
        })
}

/// Whole slots in `millis`, rounded half up.
pub(crate) fn rounded_slots(millis: i64, resolution: i64) -> i64 {
    (millis as f64 / resolution as f64 + 0.5) as i64
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;
    use std::time::Duration;

    use mqe_core::api::MetricMetadata;
    use mqe_core::api::TaggedMetric;
    use mqe_core::cancel::Timeout;
    use mqe_core::series::{SeriesList, Timeseries};
    use mqe_core::tagset::TagSet;
    use mqe_core::timerange::Timerange;
    use mqe_eval::{EvaluationContext, Value};
    use mqe_exec::{MetadataMap, PointStorage};

    use crate::builtin_registry;

    /// Stores `series` under `metric` with values laid out ending at
    /// `timerange.end()`, so extended windows see the leading values.
    pub fn context_with(
        metric: &str,
        series: &[(TagSet, Vec<f64>)],
        timerange: Timerange,
    ) -> EvaluationContext {
        let storage = PointStorage::new();
        let metadata = MetadataMap::new();
        for (tagset, values) in series {
            let tagged = TaggedMetric::new(metric, tagset.clone());
            let resolution = timerange.resolution();
            let first = timerange.end() - (values.len() as i64 - 1) * resolution;
            storage.insert(
                tagged.clone(),
                values
                    .iter()
                    .enumerate()
                    .map(|(i, v)| (first + i as i64 * resolution, *v)),
            );
            metadata.add_metric(tagged).unwrap();
        }
        EvaluationContext::builder(
            Arc::new(storage),
            Arc::new(metadata),
            builtin_registry().unwrap(),
            timerange,
        )
        .timeout(Timeout::never(), Duration::from_secs(5))
        .build()
    }

    pub fn series_list(value: Value) -> SeriesList {
        match value {
            Value::SeriesList(list) => list,
            other => panic!("expected a series list, got {other:?}"),
        }
    }

    pub fn values(list: &SeriesList) -> Vec<Vec<f64>> {
        list.series.iter().map(|s| s.values.clone()).collect()
    }

    pub fn series(tags: &[(&str, &str)], values: &[f64]) -> Timeseries {
        Timeseries::new(values.to_vec(), tags.iter().copied().collect())
    }

    pub fn assert_close(actual: &[f64], expected: &[f64]) {
        assert_eq!(actual.len(), expected.len(), "{actual:?} vs {expected:?}");
        for (a, e) in actual.iter().zip(expected) {
            if e.is_nan() {
                assert!(a.is_nan(), "{actual:?} vs {expected:?}");
            } else {
                assert!((a - e).abs() < 1e-9, "{actual:?} vs {expected:?}");
            }
        }
    }
}
