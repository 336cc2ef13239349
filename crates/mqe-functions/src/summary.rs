//! `summarize.*`: collapse each series to one number, keyed by its tagset.

use mqe_core::series::{ScalarSet, SeriesList};
use mqe_eval::{ArgType, EvalError, MetricFunction, Registry, Result, Value};

use crate::aggregate::{self, Reducer};

/// The trailing part of `values` covering the last `duration` ms: starts at
/// `slots - 1 - floor(duration / resolution)`, clamped into the slice.
pub fn recent(values: &[f64], duration: i64, resolution: i64) -> &[f64] {
    let back = duration / resolution;
    let start = (values.len() as i64 - 1 - back).clamp(0, values.len() as i64);
    &values[start as usize..]
}

pub fn first_not_nan(values: &[f64]) -> f64 {
    values.iter().copied().find(|v| !v.is_nan()).unwrap_or(f64::NAN)
}

pub fn last_not_nan(values: &[f64]) -> f64 {
    values.iter().rev().copied().find(|v| !v.is_nan()).unwrap_or(f64::NAN)
}

/// Apply `reducer` to the recent part of every series.
pub fn summarize(
    list: &SeriesList,
    duration: i64,
    reducer: impl Fn(&[f64]) -> f64,
) -> ScalarSet {
    let resolution = list.timerange.resolution();
    let mut out = ScalarSet::new();
    for s in &list.series {
        out.push(s.tagset.clone(), reducer(recent(&s.values, duration, resolution)));
    }
    out
}

fn endpoint(name: &'static str, pick: fn(&[f64]) -> f64) -> Result<MetricFunction> {
    MetricFunction::builder(name)
        .arg("series", ArgType::SeriesList)
        .build(move |_, args, _| {
            let list = args.series_list(0)?;
            let mut out = ScalarSet::new();
            for s in &list.series {
                out.push(s.tagset.clone(), pick(&s.values));
            }
            Ok(Value::ScalarSet(out))
        })
}

pub(crate) fn register(registry: &mut Registry) -> Result<()> {
    let over_window: [(&'static str, Reducer); 8] = [
        ("summarize.mean", aggregate::mean),
        ("summarize.min", aggregate::min),
        ("summarize.max", aggregate::max),
        ("summarize.count", aggregate::count),
        ("summarize.total", aggregate::total),
        ("summarize.integral", aggregate::sum),
        ("summarize.first_not_nan", first_not_nan),
        ("summarize.last_not_nan", last_not_nan),
    ];
    for (name, reducer) in over_window {
        registry.register(
            MetricFunction::builder(name)
                .arg("series", ArgType::SeriesList)
                .optional("duration", ArgType::Duration)
                .build(move |ctx, args, _| {
                    let timerange = ctx.timerange();
                    let duration = args.optional_duration(1)?.unwrap_or(timerange.duration());
                    if duration < 0 {
                        return Err(EvalError::invalid_argument(
                            name,
                            format!("duration must not be negative, got {duration}ms"),
                        ));
                    }
                    let list = args.series_list(0)?;
                    let set = if name == "summarize.integral" {
                        let seconds = timerange.resolution_seconds();
                        summarize(list, duration, |values| reducer(values) * seconds)
                    } else {
                        summarize(list, duration, reducer)
                    };
                    Ok(Value::ScalarSet(set))
                })?,
        )?;
    }

    registry.register(endpoint("summarize.current", |values| {
        values.last().copied().unwrap_or(f64::NAN)
    })?)?;
    registry.register(endpoint("summarize.oldest", |values| {
        values.first().copied().unwrap_or(f64::NAN)
    })?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mqe_core::tagset::TagSet;
    use mqe_core::timerange::Timerange;
    use mqe_eval::{ErrorCode, Expression};

    const NAN: f64 = f64::NAN;

    use crate::testing::context_with;

    #[test]
    fn recent_window_bounds() {
        let xs = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(recent(&xs, 0, 30_000), &[5.0]);
        assert_eq!(recent(&xs, 60_000, 30_000), &[3.0, 4.0, 5.0]);
        assert_eq!(recent(&xs, 59_999, 30_000), &[4.0, 5.0]);
        assert_eq!(recent(&xs, 10 * 60_000, 30_000), &xs);
        assert!(recent(&[], 0, 30_000).is_empty());
    }

    #[test]
    fn endpoints_skip_nan() {
        assert_eq!(first_not_nan(&[NAN, 2.0, 3.0]), 2.0);
        assert_eq!(last_not_nan(&[1.0, 2.0, NAN]), 2.0);
        assert!(last_not_nan(&[NAN]).is_nan());
    }

    fn ctx() -> mqe_eval::EvaluationContext {
        context_with(
            "m",
            &[
                (TagSet::from([("host", "a")]), vec![1.0, NAN, 3.0, 4.0]),
                (TagSet::from([("host", "b")]), vec![NAN, NAN, NAN, NAN]),
            ],
            Timerange::new(0, 90_000, 30_000).unwrap(),
        )
    }

    fn scalars(value: Value) -> Vec<(String, f64)> {
        match value {
            Value::ScalarSet(set) => set
                .iter()
                .map(|t| (t.tagset.to_string(), t.value))
                .collect(),
            other => panic!("expected a scalar set, got {other:?}"),
        }
    }

    #[test]
    fn registered_summaries() {
        let ctx = ctx();
        let m = Expression::metric("m");

        let mean = Expression::call("summarize.mean", vec![m.clone()]);
        let out = scalars(mean.evaluate(&ctx).unwrap());
        assert_eq!(out[0], ("host=a".to_string(), 8.0 / 3.0));
        assert!(out[1].1.is_nan());

        let recent_max = Expression::call(
            "summarize.max",
            vec![m.clone(), Expression::duration("30s").unwrap()],
        );
        assert_eq!(scalars(recent_max.evaluate(&ctx).unwrap())[0].1, 4.0);

        let integral = Expression::call("summarize.integral", vec![m.clone()]);
        let out = scalars(integral.evaluate(&ctx).unwrap());
        assert_eq!(out[0].1, 8.0 * 30.0);
        assert_eq!(out[1].1, 0.0);

        let total = Expression::call("summarize.total", vec![m.clone()]);
        assert_eq!(scalars(total.evaluate(&ctx).unwrap())[1].1, 4.0);

        let current = Expression::call("summarize.current", vec![m.clone()]);
        assert_eq!(scalars(current.evaluate(&ctx).unwrap())[0].1, 4.0);
        let oldest = Expression::call("summarize.oldest", vec![m]);
        assert_eq!(scalars(oldest.evaluate(&ctx).unwrap())[0].1, 1.0);
    }

    #[test]
    fn current_takes_no_duration() {
        let ctx = ctx();
        let expr = Expression::call(
            "summarize.current",
            vec![Expression::metric("m"), Expression::duration("1m").unwrap()],
        );
        assert_eq!(expr.evaluate(&ctx).unwrap_err().code(), ErrorCode::ArgumentLength);
    }

    #[test]
    fn negative_duration_is_rejected() {
        let ctx = ctx();
        let expr = Expression::call(
            "summarize.mean",
            vec![Expression::metric("m"), Expression::duration("-1m").unwrap()],
        );
        assert_eq!(expr.evaluate(&ctx).unwrap_err().code(), ErrorCode::InvalidArgument);
    }
}
