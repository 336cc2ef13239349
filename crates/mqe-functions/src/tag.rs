//! `tag.*`: rewrite tagsets without touching values.

use mqe_core::series::SeriesList;
use mqe_core::tagset::TagSet;
use mqe_eval::{ArgType, EvalError, MetricFunction, Registry, Result, Value};

fn retag(list: &SeriesList, mut f: impl FnMut(&mut TagSet)) -> SeriesList {
    let mut out = list.clone();
    for s in &mut out.series {
        f(&mut s.tagset);
    }
    out
}

pub fn drop_tag(list: &SeriesList, tag: &str) -> SeriesList {
    retag(list, |tags| {
        tags.remove(tag);
    })
}

pub fn set_tag(list: &SeriesList, tag: &str, value: &str) -> SeriesList {
    retag(list, |tags| {
        tags.insert(tag, value);
    })
}

/// Set `target` to the value of `source`; series without `source` lose
/// `target` too.
pub fn copy_tag(list: &SeriesList, target: &str, source: &str) -> SeriesList {
    retag(list, |tags| match tags.get(source).map(str::to_string) {
        Some(value) => {
            tags.insert(target, value);
        }
        None => {
            tags.remove(target);
        }
    })
}

fn non_empty<'a>(function: &str, what: &str, text: &'a str) -> Result<&'a str> {
    if text.is_empty() {
        return Err(EvalError::invalid_argument(
            function,
            format!("{what} must not be empty"),
        ));
    }
    Ok(text)
}

pub(crate) fn register(registry: &mut Registry) -> Result<()> {
    registry.register(
        MetricFunction::builder("tag.drop")
            .arg("series", ArgType::SeriesList)
            .arg("tag", ArgType::String)
            .build(|_, args, _| {
                let tag = non_empty("tag.drop", "tag", args.string(1)?)?;
                Ok(Value::SeriesList(drop_tag(args.series_list(0)?, tag)))
            })?,
    )?;
    registry.register(
        MetricFunction::builder("tag.set")
            .arg("series", ArgType::SeriesList)
            .arg("tag", ArgType::String)
            .arg("value", ArgType::String)
            .build(|_, args, _| {
                let tag = non_empty("tag.set", "tag", args.string(1)?)?;
                let value = non_empty("tag.set", "value", args.string(2)?)?;
                Ok(Value::SeriesList(set_tag(args.series_list(0)?, tag, value)))
            })?,
    )?;
    registry.register(
        MetricFunction::builder("tag.copy")
            .arg("series", ArgType::SeriesList)
            .arg("target", ArgType::String)
            .arg("source", ArgType::String)
            .build(|_, args, _| {
                let target = non_empty("tag.copy", "target tag", args.string(1)?)?;
                let source = non_empty("tag.copy", "source tag", args.string(2)?)?;
                Ok(Value::SeriesList(copy_tag(args.series_list(0)?, target, source)))
            })?,
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mqe_core::timerange::Timerange;
    use mqe_eval::{ErrorCode, Expression};

    use crate::testing::{context_with, series, series_list};

    fn sample() -> SeriesList {
        SeriesList::new(
            vec![
                series(&[("dc", "east"), ("host", "a")], &[1.0]),
                series(&[("host", "b")], &[2.0]),
            ],
            Timerange::new(0, 0, 30_000).unwrap(),
        )
    }

    #[test]
    fn drop_and_set_leave_input_alone() {
        let input = sample();
        let dropped = drop_tag(&input, "dc");
        assert_eq!(dropped.series[0].tagset, TagSet::from([("host", "a")]));
        let set = set_tag(&input, "dc", "west");
        assert_eq!(set.series[1].tagset, TagSet::from([("dc", "west"), ("host", "b")]));
        assert_eq!(input, sample());
    }

    #[test]
    fn copy_removes_target_when_source_missing() {
        let input = set_tag(&sample(), "region", "old");
        let out = copy_tag(&input, "region", "dc");
        assert_eq!(out.series[0].tagset.get("region"), Some("east"));
        assert_eq!(out.series[1].tagset.get("region"), None);
    }

    #[test]
    fn registered_tag_functions_reject_empty_names() {
        let ctx = context_with(
            "m",
            &[(TagSet::from([("host", "a")]), vec![1.0])],
            Timerange::new(0, 0, 30_000).unwrap(),
        );
        let set = Expression::call(
            "tag.set",
            vec![
                Expression::metric("m"),
                Expression::string("env"),
                Expression::string("prod"),
            ],
        );
        let out = series_list(set.evaluate(&ctx).unwrap());
        assert_eq!(out.series[0].tagset, TagSet::from([("env", "prod"), ("host", "a")]));

        let empty = Expression::call(
            "tag.drop",
            vec![Expression::metric("m"), Expression::string("")],
        );
        assert_eq!(empty.evaluate(&ctx).unwrap_err().code(), ErrorCode::InvalidArgument);
    }
}
