//! Operators that need samples from before the query window.
//!
//! Each one evaluates its series argument under a context whose timerange is
//! extended backwards, runs a kernel over the longer series, and returns
//! exactly `timerange.slots()` values per series stamped with the original
//! timerange.

use mqe_core::prelude::{SeriesList, Timerange, Timeseries};
use mqe_eval::{ArgType, EvalError, EvaluationContext, MetricFunction, Registry, Result, Value};

use crate::{aggregate, evaluate_series, rounded_slots};

/// Consecutive differences per second. The output is one shorter than the
/// input, so a single sample yields nothing.
pub fn derivative(values: &[f64], resolution_seconds: f64) -> Vec<f64> {
    values
        .windows(2)
        .map(|pair| (pair[1] - pair[0]) / resolution_seconds)
        .collect()
}

/// Like [`derivative`] but never negative. A drop followed by a
/// non-decrease is read as a counter reset: the rate for that step is the new
/// value itself, and `on_reset(previous, current)` is called.
pub fn rate(
    values: &[f64],
    resolution_seconds: f64,
    mut on_reset: impl FnMut(f64, f64),
) -> Vec<f64> {
    let mut result = Vec::with_capacity(values.len().saturating_sub(1));
    for i in 1..values.len() {
        let (previous, current) = (values[i - 1], values[i]);
        let mut step = (current - previous) / resolution_seconds;
        if step < 0.0 {
            step = 0.0;
        }
        if i + 1 < values.len() && previous > current && current <= values[i + 1] {
            on_reset(previous, current);
            step = current.max(0.0) / resolution_seconds;
        }
        result.push(step);
    }
    result
}

/// Mean of the non-NaN values in each trailing window of `width` samples.
/// The first output covers `values[..width]`, so the result is `width - 1`
/// shorter than the input.
pub fn moving_average(values: &[f64], width: usize) -> Vec<f64> {
    let width = width.max(1);
    values.windows(width).map(aggregate::mean).collect()
}

/// Exponentially decayed mean with decay `alpha` per sample, dropping the
/// first `skip` outputs.
pub fn exponential_moving_average(values: &[f64], alpha: f64, skip: usize) -> Vec<f64> {
    let (mut sum, mut weight) = (0.0, 0.0);
    let mut result = Vec::with_capacity(values.len().saturating_sub(skip));
    for (i, v) in values.iter().enumerate() {
        sum *= alpha;
        weight *= alpha;
        if !v.is_nan() {
            sum += v;
            weight += 1.0;
        }
        if i >= skip {
            result.push(sum / weight);
        }
    }
    result
}

/// Evaluate `expr` over `timerange` extended back by `extra` slots.
fn evaluate_extended(
    function: &str,
    ctx: &EvaluationContext,
    expr: &mqe_eval::Expression,
    extra: usize,
) -> Result<SeriesList> {
    let timerange = ctx.timerange();
    let extended = timerange.extend_before(extra as i64 * timerange.resolution());
    evaluate_series(function, 0, "series", expr, &ctx.with_timerange(extended))
}

fn restamp(series: Vec<Timeseries>, timerange: Timerange) -> Value {
    Value::SeriesList(SeriesList::new(series, timerange))
}

/// Window width in slots for a duration argument; at least one.
fn window_width(function: &str, size: i64, resolution: i64) -> Result<usize> {
    if size < 0 {
        return Err(EvalError::invalid_argument(
            function,
            format!("window size must not be negative, got {size}ms"),
        ));
    }
    Ok(rounded_slots(size, resolution).max(1) as usize)
}

pub(crate) fn register(registry: &mut Registry) -> Result<()> {
    registry.register(
        MetricFunction::builder("transform.derivative")
            .arg("series", ArgType::Expression)
            .build(|ctx, args, _| {
                let list = evaluate_extended("transform.derivative", ctx, args.expression(0)?, 1)?;
                let seconds = ctx.timerange().resolution_seconds();
                let series = list
                    .series
                    .iter()
                    .map(|s| s.with_values(derivative(&s.values, seconds)))
                    .collect();
                Ok(restamp(series, ctx.timerange()))
            })?,
    )?;

    registry.register(
        MetricFunction::builder("transform.rate")
            .arg("series", ArgType::Expression)
            .build(|ctx, args, _| {
                let list = evaluate_extended("transform.rate", ctx, args.expression(0)?, 1)?;
                let seconds = ctx.timerange().resolution_seconds();
                let series = list
                    .series
                    .iter()
                    .map(|s| {
                        let values = rate(&s.values, seconds, |previous, current| {
                            #[cfg(feature = "tracing")]
                            tracing::debug!(tagset = %s.tagset, previous, current, "counter reset");
                            ctx.add_note(format!(
                                "Rate({}): The underlying counter reset between {previous:.6}, {current:.6}\n",
                                s.tagset
                            ));
                        });
                        s.with_values(values)
                    })
                    .collect();
                Ok(restamp(series, ctx.timerange()))
            })?,
    )?;

    registry.register(
        MetricFunction::builder("transform.moving_average")
            .arg("series", ArgType::Expression)
            .arg("size", ArgType::Duration)
            .build(|ctx, args, _| {
                let name = "transform.moving_average";
                let width = window_width(name, args.duration(1)?, ctx.timerange().resolution())?;
                let list = evaluate_extended(name, ctx, args.expression(0)?, width - 1)?;
                let series = list
                    .series
                    .iter()
                    .map(|s| s.with_values(moving_average(&s.values, width)))
                    .collect();
                Ok(restamp(series, ctx.timerange()))
            })?,
    )?;

    registry.register(
        MetricFunction::builder("transform.exponential_moving_average")
            .arg("series", ArgType::Expression)
            .arg("size", ArgType::Duration)
            .build(|ctx, args, _| {
                let name = "transform.exponential_moving_average";
                let size = args.duration(1)?;
                let resolution = ctx.timerange().resolution();
                let extra = window_width(name, size, resolution)?;
                // half-life of `size`; a zero size keeps only the newest sample
                let alpha = if size == 0 {
                    0.0
                } else {
                    0.5f64.powf(resolution as f64 / size as f64)
                };
                let list = evaluate_extended(name, ctx, args.expression(0)?, extra)?;
                let series = list
                    .series
                    .iter()
                    .map(|s| s.with_values(exponential_moving_average(&s.values, alpha, extra)))
                    .collect();
                Ok(restamp(series, ctx.timerange()))
            })?,
    )?;

    registry.register(
        MetricFunction::builder("transform.timeshift")
            .arg("series", ArgType::Expression)
            .arg("shift", ArgType::Duration)
            .build(|ctx, args, _| {
                let shifted = ctx.with_timerange(ctx.timerange().shift(args.duration(1)?));
                let list = evaluate_series(
                    "transform.timeshift",
                    0,
                    "series",
                    args.expression(0)?,
                    &shifted,
                )?;
                Ok(restamp(list.series, ctx.timerange()))
            })?,
    )?;
    Ok(())
}
