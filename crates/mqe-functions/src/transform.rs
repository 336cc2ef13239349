//! Pointwise transforms and running sums.
//!
//! Every kernel here maps one series' values to a new vector of the same
//! length and never looks outside the query window.

use mqe_core::series::SeriesList;
use mqe_eval::{ArgType, EvalError, MetricFunction, Registry, Result, Value};

/// Running sum scaled by the resolution, estimating "total so far" of a
/// per-second series. NaN contributes nothing.
pub fn integral(values: &[f64], resolution_seconds: f64) -> Vec<f64> {
    cumulative(values)
        .into_iter()
        .map(|sum| sum * resolution_seconds)
        .collect()
}

/// Running sum of the non-NaN values, inclusive of the current slot.
pub fn cumulative(values: &[f64]) -> Vec<f64> {
    values
        .iter()
        .scan(0.0, |sum, v| {
            if !v.is_nan() {
                *sum += v;
            }
            Some(*sum)
        })
        .collect()
}

pub fn nan_fill(values: &[f64], default: f64) -> Vec<f64> {
    values
        .iter()
        .map(|v| if v.is_nan() { default } else { *v })
        .collect()
}

/// Replace each NaN with the last non-NaN value before it. Leading NaNs stay.
pub fn nan_keep_last(values: &[f64]) -> Vec<f64> {
    let mut last = f64::NAN;
    values
        .iter()
        .map(|v| {
            if !v.is_nan() {
                last = *v;
            }
            last
        })
        .collect()
}

/// Clamp into `[lower, upper]`; NaN passes through. Either bound may be
/// infinite to leave that side open.
pub fn bound(values: &[f64], lower: f64, upper: f64) -> Vec<f64> {
    values
        .iter()
        .map(|v| {
            if *v < lower {
                lower
            } else if *v > upper {
                upper
            } else {
                *v
            }
        })
        .collect()
}

fn map_list(list: SeriesList, f: impl Fn(&[f64]) -> Vec<f64>) -> Value {
    Value::SeriesList(list.map_values(f))
}

fn pointwise(name: &'static str, f: fn(f64) -> f64) -> Result<MetricFunction> {
    MetricFunction::builder(name)
        .arg("series", ArgType::SeriesList)
        .build(move |_, mut args, _| {
            let list = args.take_series_list(0)?;
            Ok(map_list(list, |values| values.iter().map(|v| f(*v)).collect()))
        })
}

pub(crate) fn register(registry: &mut Registry) -> Result<()> {
    registry.register(
        MetricFunction::builder("transform.integral")
            .arg("series", ArgType::SeriesList)
            .build(|ctx, mut args, _| {
                let seconds = ctx.timerange().resolution_seconds();
                let list = args.take_series_list(0)?;
                Ok(map_list(list, |values| integral(values, seconds)))
            })?,
    )?;
    registry.register(
        MetricFunction::builder("transform.cumulative")
            .arg("series", ArgType::SeriesList)
            .build(|_, mut args, _| Ok(map_list(args.take_series_list(0)?, cumulative)))?,
    )?;
    registry.register(
        MetricFunction::builder("transform.nan_fill")
            .arg("series", ArgType::SeriesList)
            .arg("default", ArgType::Scalar)
            .build(|_, mut args, _| {
                let default = args.scalar(1)?;
                let list = args.take_series_list(0)?;
                Ok(map_list(list, |values| nan_fill(values, default)))
            })?,
    )?;
    registry.register(
        MetricFunction::builder("transform.nan_keep_last")
            .arg("series", ArgType::SeriesList)
            .build(|_, mut args, _| Ok(map_list(args.take_series_list(0)?, nan_keep_last)))?,
    )?;
    registry.register(
        MetricFunction::builder("transform.bound")
            .arg("series", ArgType::SeriesList)
            .arg("lower", ArgType::Scalar)
            .arg("upper", ArgType::Scalar)
            .build(|_, mut args, _| {
                let (lower, upper) = (args.scalar(1)?, args.scalar(2)?);
                if lower > upper {
                    return Err(EvalError::invalid_argument(
                        "transform.bound",
                        format!(
                            "the lower bound ({lower:.6}) should be no more than the upper bound ({upper:.6})"
                        ),
                    ));
                }
                let list = args.take_series_list(0)?;
                Ok(map_list(list, |values| bound(values, lower, upper)))
            })?,
    )?;
    registry.register(
        MetricFunction::builder("transform.lower_bound")
            .arg("series", ArgType::SeriesList)
            .arg("lower", ArgType::Scalar)
            .build(|_, mut args, _| {
                let lower = args.scalar(1)?;
                let list = args.take_series_list(0)?;
                Ok(map_list(list, |values| bound(values, lower, f64::INFINITY)))
            })?,
    )?;
    registry.register(
        MetricFunction::builder("transform.upper_bound")
            .arg("series", ArgType::SeriesList)
            .arg("upper", ArgType::Scalar)
            .build(|_, mut args, _| {
                let upper = args.scalar(1)?;
                let list = args.take_series_list(0)?;
                Ok(map_list(list, |values| bound(values, f64::NEG_INFINITY, upper)))
            })?,
    )?;
    registry.register(pointwise("transform.abs", f64::abs)?)?;
    registry.register(pointwise("transform.log", f64::log10)?)?;
    registry.register(
        MetricFunction::builder("transform.alias")
            .arg("series", ArgType::Value)
            .arg("name", ArgType::String)
            .build(|ctx, args, _| {
                ctx.add_note("transform.alias is deprecated");
                Ok(args.value(0)?.clone())
            })?,
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mqe_core::tagset::TagSet;
    use mqe_core::timerange::Timerange;
    use mqe_eval::{ErrorCode, Expression};

    use crate::testing::{assert_close, context_with, series_list, values};

    const NAN: f64 = f64::NAN;

    #[test]
    fn bound_clamps_and_keeps_nan() {
        assert_close(
            &bound(&[NAN, 100.0, 90.0, 0.0, 0.0, 3.0], 2.0, 5.0),
            &[NAN, 5.0, 5.0, 2.0, 2.0, 3.0],
        );
        assert_close(
            &bound(&[1.0, 7.0], f64::NEG_INFINITY, 5.0),
            &[1.0, 5.0],
        );
    }

    #[test]
    fn running_sums_skip_nan() {
        assert_close(&cumulative(&[1.0, NAN, 2.0, 3.0]), &[1.0, 1.0, 3.0, 6.0]);
        assert_close(&integral(&[1.0, NAN, 2.0], 30.0), &[30.0, 30.0, 90.0]);
    }

    #[test]
    fn nan_handling() {
        assert_close(&nan_fill(&[NAN, 1.0, NAN], 9.0), &[9.0, 1.0, 9.0]);
        assert_close(
            &nan_keep_last(&[NAN, 1.0, NAN, NAN, 4.0, NAN]),
            &[NAN, 1.0, 1.0, 1.0, 4.0, 4.0],
        );
    }

    fn range() -> Timerange {
        Timerange::new(0, 90_000, 30_000).unwrap()
    }

    #[test]
    fn registered_bound_rejects_swapped_limits() {
        let ctx = context_with("m", &[(TagSet::new(), vec![1.0, 2.0, 3.0, 4.0])], range());
        let expr = Expression::call(
            "transform.bound",
            vec![Expression::metric("m"), Expression::scalar(5.0), Expression::scalar(2.0)],
        );
        let err = expr.evaluate(&ctx).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidArgument);
        assert!(err.to_string().contains("lower bound (5.000000)"));
    }

    #[test]
    fn registered_pointwise_maps() {
        let ctx = context_with("m", &[(TagSet::new(), vec![-1.0, 10.0, -100.0, NAN])], range());
        let abs = Expression::call("transform.abs", vec![Expression::metric("m")]);
        let out = series_list(abs.evaluate(&ctx).unwrap());
        assert_close(&values(&out)[0], &[1.0, 10.0, 100.0, NAN]);

        let log = Expression::call("transform.log", vec![abs]);
        let out = series_list(log.evaluate(&ctx).unwrap());
        assert_close(&values(&out)[0], &[0.0, 1.0, 2.0, NAN]);
    }

    #[test]
    fn alias_passes_through_with_a_note() {
        let ctx = context_with("m", &[(TagSet::new(), vec![1.0, 2.0, 3.0, 4.0])], range());
        let expr = Expression::call(
            "transform.alias",
            vec![Expression::metric("m"), Expression::string("renamed")],
        );
        let out = series_list(expr.evaluate(&ctx).unwrap());
        assert_eq!(values(&out), vec![vec![1.0, 2.0, 3.0, 4.0]]);
        assert_eq!(ctx.notes(), vec!["transform.alias is deprecated".to_string()]);
    }
}
