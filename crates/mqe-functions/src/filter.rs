//! `filter.*`: keep the series whose recent summary ranks best, or that stay
//! on one side of a threshold.

use std::cmp::Ordering;

use mqe_core::series::{SeriesList, Timeseries};
use mqe_eval::{ArgType, EvalError, EvaluationContext, MetricFunction, Registry, Result, Value};

use crate::aggregate::{self, Reducer};

/// NaN sorts after every number in either direction.
fn rank(a: f64, b: f64, ascending: bool) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => {
            let order = a.partial_cmp(&b).unwrap_or(Ordering::Equal);
            if ascending {
                order
            } else {
                order.reverse()
            }
        }
    }
}

/// Series paired with the summary of their last `recent` samples, stably
/// sorted.
fn ranked(
    list: &SeriesList,
    summary: Reducer,
    recent: usize,
    ascending: bool,
) -> Vec<(f64, &Timeseries)> {
    let mut scored: Vec<(f64, &Timeseries)> = list
        .series
        .iter()
        .map(|s| (summary(&s.values[s.values.len().saturating_sub(recent)..]), s))
        .collect();
    scored.sort_by(|a, b| rank(a.0, b.0, ascending));
    scored
}

/// The `count` series with the lowest (or highest) summary over their last
/// `recent` samples, best first.
pub fn filter_by_recent(
    list: &SeriesList,
    count: usize,
    summary: Reducer,
    lowest: bool,
    recent: usize,
) -> SeriesList {
    let series = ranked(list, summary, recent, lowest)
        .into_iter()
        .take(count)
        .map(|(_, s)| s.clone())
        .collect();
    SeriesList::new(series, list.timerange)
}

/// The series whose summary is at most (`below`) or at least `threshold`,
/// in sorted order. A NaN summary never fails the test.
pub fn filter_threshold_by_recent(
    list: &SeriesList,
    threshold: f64,
    summary: Reducer,
    below: bool,
    recent: usize,
) -> SeriesList {
    let series = ranked(list, summary, recent, below)
        .into_iter()
        .take_while(|(v, _)| !((below && *v > threshold) || (!below && *v < threshold)))
        .map(|(_, s)| s.clone())
        .collect();
    SeriesList::new(series, list.timerange)
}

const SUMMARIES: [(&str, Reducer); 3] = [
    ("mean", aggregate::mean),
    ("max", aggregate::max),
    ("min", aggregate::min),
];

/// Slots covered by an optional recent-duration argument, in `[1, slots]`.
fn recent_slots(name: &str, ctx: &EvaluationContext, duration: Option<i64>) -> Result<usize> {
    let timerange = ctx.timerange();
    let duration = duration.unwrap_or(timerange.duration());
    if duration < 0 {
        return Err(EvalError::invalid_argument(
            name,
            format!("duration must not be negative, got {duration}ms"),
        ));
    }
    let slots = (duration / timerange.resolution()).saturating_add(1);
    Ok((slots as usize).clamp(1, timerange.slots()))
}

pub(crate) fn register(registry: &mut Registry) -> Result<()> {
    for (suffix, summary) in SUMMARIES {
        for lowest in [false, true] {
            let direction = if lowest { "lowest" } else { "highest" };
            let name = format!("filter.{direction}_{suffix}");
            let label = name.clone();
            registry.register(
                MetricFunction::builder(name)
                    .arg("series", ArgType::SeriesList)
                    .arg("count", ArgType::Scalar)
                    .optional("duration", ArgType::Duration)
                    .build(move |ctx, args, _| {
                        let count = (args.scalar(1)? + 0.5).trunc();
                        if count < 0.0 || count.is_nan() {
                            return Err(EvalError::invalid_argument(
                                label.as_str(),
                                format!("expected a non-negative count, got {count}"),
                            ));
                        }
                        let recent = recent_slots(&label, ctx, args.optional_duration(2)?)?;
                        let list = args.series_list(0)?;
                        Ok(Value::SeriesList(filter_by_recent(
                            list,
                            count as usize,
                            summary,
                            lowest,
                            recent,
                        )))
                    })?,
            )?;
        }
        for below in [false, true] {
            let side = if below { "below" } else { "above" };
            let name = format!("filter.{suffix}_{side}");
            let label = name.clone();
            registry.register(
                MetricFunction::builder(name)
                    .arg("series", ArgType::SeriesList)
                    .arg("threshold", ArgType::Scalar)
                    .optional("duration", ArgType::Duration)
                    .build(move |ctx, args, _| {
                        let threshold = args.scalar(1)?;
                        let recent = recent_slots(&label, ctx, args.optional_duration(2)?)?;
                        let list = args.series_list(0)?;
                        Ok(Value::SeriesList(filter_threshold_by_recent(
                            list, threshold, summary, below, recent,
                        )))
                    })?,
            )?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mqe_core::tagset::TagSet;
    use mqe_core::timerange::Timerange;
    use mqe_eval::{ErrorCode, Expression};

    use crate::testing::{context_with, series, series_list};

    const NAN: f64 = f64::NAN;

    fn names(list: &SeriesList) -> Vec<&str> {
        list.series
            .iter()
            .map(|s| s.tagset.get("name").unwrap_or("?"))
            .collect()
    }

    fn sample() -> SeriesList {
        SeriesList::new(
            vec![
                series(&[("name", "A")], &[3.0, 3.0, 3.0, 3.0, 3.0]),
                series(&[("name", "B")], &[1.0, 2.0, 2.0, 1.0, 0.0]),
                series(&[("name", "C")], &[1.0, 2.0, 3.0, 4.0, 5.1]),
                series(&[("name", "D")], &[4.0, 4.0, 3.01, 4.0, 3.01]),
            ],
            Timerange::new(0, 120_000, 30_000).unwrap(),
        )
    }

    #[test]
    fn lowest_sums_first() {
        let out = filter_by_recent(&sample(), 2, aggregate::sum, true, 5);
        assert_eq!(names(&out), vec!["B", "A"]);
    }

    #[test]
    fn highest_over_recent_slots() {
        let out = filter_by_recent(&sample(), 10, aggregate::max, false, 1);
        assert_eq!(names(&out), vec!["C", "D", "A", "B"]);
    }

    #[test]
    fn nan_summaries_sort_last_both_ways() {
        let list = SeriesList::new(
            vec![
                series(&[("name", "gap")], &[NAN, NAN]),
                series(&[("name", "low")], &[1.0, 1.0]),
                series(&[("name", "high")], &[5.0, 5.0]),
            ],
            Timerange::new(0, 30_000, 30_000).unwrap(),
        );
        assert_eq!(
            names(&filter_by_recent(&list, 3, aggregate::mean, true, 2)),
            vec!["low", "high", "gap"]
        );
        assert_eq!(
            names(&filter_by_recent(&list, 3, aggregate::mean, false, 2)),
            vec!["high", "low", "gap"]
        );
    }

    #[test]
    fn threshold_stops_at_first_violation() {
        let above = filter_threshold_by_recent(&sample(), 3.0, aggregate::mean, false, 5);
        assert_eq!(names(&above), vec!["D", "C", "A"]);
        let below = filter_threshold_by_recent(&sample(), 2.0, aggregate::max, true, 5);
        assert_eq!(names(&below), vec!["B"]);
        let none = filter_threshold_by_recent(&sample(), 100.0, aggregate::min, false, 5);
        assert!(none.is_empty());
    }

    #[test]
    fn recent_slots_clamp_huge_durations() {
        let ctx = context_with("m", &[], Timerange::new(0, 2, 1).unwrap());
        assert_eq!(recent_slots("f", &ctx, Some(i64::MAX)).unwrap(), 3);
        assert_eq!(recent_slots("f", &ctx, Some(0)).unwrap(), 1);
        assert_eq!(recent_slots("f", &ctx, None).unwrap(), 3);
        assert!(recent_slots("f", &ctx, Some(-1)).is_err());
    }

    #[test]
    fn registered_filters() {
        let tr = Timerange::new(0, 60_000, 30_000).unwrap();
        let ctx = context_with(
            "m",
            &[
                (TagSet::from([("name", "x")]), vec![9.0, 1.0, 1.0]),
                (TagSet::from([("name", "y")]), vec![0.0, 5.0, 5.0]),
            ],
            tr,
        );
        let highest = Expression::call(
            "filter.highest_max",
            vec![Expression::metric("m"), Expression::scalar(0.6)],
        );
        assert_eq!(names(&series_list(highest.evaluate(&ctx).unwrap())), vec!["x"]);

        let recent = Expression::call(
            "filter.highest_max",
            vec![
                Expression::metric("m"),
                Expression::scalar(1.0),
                Expression::duration("30s").unwrap(),
            ],
        );
        assert_eq!(names(&series_list(recent.evaluate(&ctx).unwrap())), vec!["y"]);

        let below = Expression::call(
            "filter.min_below",
            vec![Expression::metric("m"), Expression::scalar(0.5)],
        );
        assert_eq!(names(&series_list(below.evaluate(&ctx).unwrap())), vec!["y"]);

        let negative = Expression::call(
            "filter.lowest_mean",
            vec![Expression::metric("m"), Expression::scalar(-2.0)],
        );
        assert_eq!(
            negative.evaluate(&ctx).unwrap_err().code(),
            ErrorCode::InvalidArgument
        );
    }
}
