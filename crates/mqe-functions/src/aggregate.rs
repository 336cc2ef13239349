//! Reducers and the `aggregate.*` family.
//!
//! A reducer folds a slice of samples into one number. Summaries and filters
//! reuse them over time; aggregates apply them across series slot by slot.

use mqe_core::series::{SeriesList, Timeseries};
use mqe_core::tagset::TagSet;
use mqe_eval::{ArgType, Groups, MetricFunction, Registry, Result, Value};

pub type Reducer = fn(&[f64]) -> f64;

fn present(values: &[f64]) -> impl Iterator<Item = f64> + '_ {
    values.iter().copied().filter(|v| !v.is_nan())
}

/// Sum of the non-NaN values; zero when there are none.
pub fn sum(values: &[f64]) -> f64 {
    present(values).sum()
}

pub fn mean(values: &[f64]) -> f64 {
    let (total, n) = present(values).fold((0.0, 0usize), |(t, n), v| (t + v, n + 1));
    if n == 0 {
        f64::NAN
    } else {
        total / n as f64
    }
}

pub fn min(values: &[f64]) -> f64 {
    present(values).reduce(f64::min).unwrap_or(f64::NAN)
}

pub fn max(values: &[f64]) -> f64 {
    present(values).reduce(f64::max).unwrap_or(f64::NAN)
}

/// Number of samples, missing or not.
pub fn total(values: &[f64]) -> f64 {
    values.len() as f64
}

/// Number of non-NaN samples.
pub fn count(values: &[f64]) -> f64 {
    present(values).count() as f64
}

/// The tagset a series contributes to its group.
fn group_key(tagset: &TagSet, groups: &Groups) -> TagSet {
    if groups.collapses {
        tagset
            .iter()
            .filter(|(k, _)| !groups.list.iter().any(|g| g.as_str() == *k))
            .collect()
    } else {
        groups
            .list
            .iter()
            .map(|k| (k.as_str(), tagset.get(k).unwrap_or("")))
            .collect()
    }
}

/// Partition `list` by `groups` and reduce each group slot by slot. Groups
/// appear in order of their first member; each output has the length of
/// that first member and the tagset it was grouped under.
pub fn aggregate_by(list: &SeriesList, reducer: Reducer, groups: &Groups) -> SeriesList {
    let mut buckets: Vec<(TagSet, Vec<&Timeseries>)> = Vec::new();
    for series in &list.series {
        let key = group_key(&series.tagset, groups);
        match buckets.iter_mut().find(|(tags, _)| tags.agrees_with(&key)) {
            Some((_, members)) => members.push(series),
            None => buckets.push((key, vec![series])),
        }
    }

    let series = buckets
        .into_iter()
        .map(|(tagset, members)| {
            let len = members[0].values.len();
            let mut column = Vec::with_capacity(members.len());
            let values = (0..len)
                .map(|i| {
                    column.clear();
                    column.extend(
                        members
                            .iter()
                            .map(|s| s.values.get(i).copied().unwrap_or(f64::NAN)),
                    );
                    reducer(&column)
                })
                .collect();
            Timeseries::new(values, tagset)
        })
        .collect();
    SeriesList::new(series, list.timerange)
}

pub(crate) fn register(registry: &mut Registry) -> Result<()> {
    let reducers: [(&str, Reducer); 6] = [
        ("aggregate.max", max),
        ("aggregate.min", min),
        ("aggregate.mean", mean),
        ("aggregate.sum", sum),
        ("aggregate.total", total),
        ("aggregate.count", count),
    ];
    for (name, reducer) in reducers {
        registry.register(
            MetricFunction::builder(name)
                .arg("series", ArgType::SeriesList)
                .group_by()
                .build(move |_, args, groups| {
                    let list = args.series_list(0)?;
                    Ok(Value::SeriesList(aggregate_by(list, reducer, groups)))
                })?,
        )?;
    }
    Ok(())
}
