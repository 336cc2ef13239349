//! Tag-aware join of several series lists.

use mqe_core::series::{SeriesList, Timeseries};
use mqe_core::tagset::TagSet;

/// One compatible tuple: a series from each input list, in list order, and
/// the union of their tags.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinRow<'a> {
    pub tagset: TagSet,
    pub row: Vec<&'a Timeseries>,
}

/// Every tuple `(s1, .., sk)` with `si` from `lists[i]` whose tagsets agree
/// on each shared key. Rows are ordered by the last list's series first,
/// then by the rows built from the earlier lists. No lists yield no rows.
pub fn join<'a>(lists: &[&'a SeriesList]) -> Vec<JoinRow<'a>> {
    if lists.is_empty() {
        return Vec::new();
    }
    let mut rows = vec![JoinRow {
        tagset: TagSet::new(),
        row: Vec::new(),
    }];
    for list in lists.iter().copied() {
        let mut next = Vec::new();
        for series in &list.series {
            for prefix in &rows {
                if !prefix.tagset.agrees_with(&series.tagset) {
                    continue;
                }
                let mut row = Vec::with_capacity(prefix.row.len() + 1);
                row.extend(prefix.row.iter().copied());
                row.push(series);
                next.push(JoinRow {
                    tagset: prefix.tagset.merge(&series.tagset),
                    row,
                });
            }
        }
        rows = next;
        if rows.is_empty() {
            break;
        }
    }
    #[cfg(feature = "tracing")]
    tracing::trace!(lists = lists.len(), rows = rows.len(), "joined");
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use mqe_core::timerange::Timerange;

    use crate::testing::series;

    fn list(series: Vec<Timeseries>) -> SeriesList {
        SeriesList::new(series, Timerange::new(0, 30_000, 30_000).unwrap())
    }

    #[test]
    fn empty_inputs() {
        assert!(join(&[]).is_empty());
        let empty = list(vec![]);
        let one = list(vec![series(&[("a", "1")], &[1.0, 2.0])]);
        assert!(join(&[&one, &empty]).is_empty());
    }

    #[test]
    fn single_list_gives_singletons() {
        let one = list(vec![
            series(&[("a", "1")], &[1.0, 2.0]),
            series(&[("a", "2")], &[3.0, 4.0]),
        ]);
        let rows = join(&[&one]);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].row, vec![&one.series[1]]);
        assert_eq!(rows[1].tagset, TagSet::from([("a", "2")]));
    }

    #[test]
    fn shared_keys_must_agree() {
        let left = list(vec![
            series(&[("dc", "east"), ("host", "a")], &[1.0, 1.0]),
            series(&[("dc", "west"), ("host", "b")], &[2.0, 2.0]),
        ]);
        let right = list(vec![
            series(&[("dc", "west")], &[10.0, 10.0]),
            series(&[("dc", "north")], &[20.0, 20.0]),
        ]);
        let rows = join(&[&left, &right]);
        assert_eq!(rows.len(), 1);
        assert_eq!(
            rows[0].tagset,
            TagSet::from([("dc", "west"), ("host", "b")])
        );
        assert_eq!(rows[0].row[0].values, vec![2.0, 2.0]);
        assert_eq!(rows[0].row[1].values, vec![10.0, 10.0]);
    }

    #[test]
    fn identical_single_tag_matches_pairwise() {
        let make = |n: usize| {
            list((0..n)
                .map(|i| series(&[("host", ["a", "b", "c"][i])], &[i as f64, 0.0]))
                .collect())
        };
        let (a, b, c) = (make(3), make(2), make(3));
        assert_eq!(join(&[&a, &b, &c]).len(), 2);
    }
}
