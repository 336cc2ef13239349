//! Binary `+ - * /` over series lists, matched up by [`join`](crate::join).

use mqe_core::series::{SeriesList, Timeseries};
use mqe_core::timerange::Timerange;
use mqe_eval::{ArgType, MetricFunction, Registry, Result, Value};

use crate::join::join;

/// Combine every compatible pair from `left` and `right` slot by slot. The
/// result carries each pair's merged tagset; a missing slot on either side
/// is NaN.
pub fn combine(
    left: &SeriesList,
    right: &SeriesList,
    timerange: Timerange,
    op: fn(f64, f64) -> f64,
) -> SeriesList {
    let series = join(&[left, right])
        .into_iter()
        .map(|row| {
            let (a, b) = (&row.row[0].values, &row.row[1].values);
            let len = a.len().max(b.len());
            let values = (0..len)
                .map(|i| {
                    op(
                        a.get(i).copied().unwrap_or(f64::NAN),
                        b.get(i).copied().unwrap_or(f64::NAN),
                    )
                })
                .collect();
            Timeseries::new(values, row.tagset)
        })
        .collect();
    SeriesList::new(series, timerange)
}

pub(crate) fn register(registry: &mut Registry) -> Result<()> {
    let operators: [(&str, fn(f64, f64) -> f64); 4] = [
        ("+", |a, b| a + b),
        ("-", |a, b| a - b),
        ("*", |a, b| a * b),
        ("/", |a, b| a / b),
    ];
    for (name, op) in operators {
        registry.register(
            MetricFunction::builder(name)
                .arg("left", ArgType::SeriesList)
                .arg("right", ArgType::SeriesList)
                .build(move |ctx, args, _| {
                    let (left, right) = (args.series_list(0)?, args.series_list(1)?);
                    Ok(Value::SeriesList(combine(left, right, ctx.timerange(), op)))
                })?,
        )?;
    }
    Ok(())
}
