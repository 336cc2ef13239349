//! Series primitives: single timeseries, lists of them, and tagged scalars.

use serde::{Deserialize, Serialize};

use crate::tagset::TagSet;
use crate::timerange::Timerange;

/// One series of samples. `values[i]` is NaN when slot `i` is missing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timeseries {
    pub values: Vec<f64>,
    pub tagset: TagSet,
}

impl Timeseries {
    pub fn new(values: Vec<f64>, tagset: TagSet) -> Self {
        Self { values, tagset }
    }

    /// All-NaN series of `slots` samples.
    pub fn missing(slots: usize, tagset: TagSet) -> Self {
        Self {
            values: vec![f64::NAN; slots],
            tagset,
        }
    }

    /// Copy of this series carrying `values` instead.
    pub fn with_values(&self, values: Vec<f64>) -> Self {
        Self {
            values,
            tagset: self.tagset.clone(),
        }
    }
}

/// A list of series that share one timerange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesList {
    pub series: Vec<Timeseries>,
    pub timerange: Timerange,
}

impl SeriesList {
    pub fn new(series: Vec<Timeseries>, timerange: Timerange) -> Self {
        Self { series, timerange }
    }

    pub fn empty(timerange: Timerange) -> Self {
        Self {
            series: Vec::new(),
            timerange,
        }
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Apply `f` to every series' values, preserving order and tagsets.
    pub fn map_values<F>(&self, mut f: F) -> SeriesList
    where
        F: FnMut(&[f64]) -> Vec<f64>,
    {
        SeriesList {
            series: self
                .series
                .iter()
                .map(|s| s.with_values(f(&s.values)))
                .collect(),
            timerange: self.timerange,
        }
    }

    /// Drop the first `extra` samples of each series and re-stamp to
    /// `timerange`. Used after evaluating a child over an extended window.
    pub fn trim_leading(self, extra: usize, timerange: Timerange) -> SeriesList {
        SeriesList {
            series: self
                .series
                .into_iter()
                .map(|mut s| {
                    let cut = extra.min(s.values.len());
                    s.values.drain(..cut);
                    s
                })
                .collect(),
            timerange,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaggedScalar {
    pub tagset: TagSet,
    pub value: f64,
}

/// Ordered sequence of tagged scalars (the result of a summary).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScalarSet(pub Vec<TaggedScalar>);

impl ScalarSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, tagset: TagSet, value: f64) {
        self.0.push(TaggedScalar { tagset, value });
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TaggedScalar> {
        self.0.iter()
    }

    /// Lift to a list of constant series, one per entry, over `timerange`.
    pub fn to_series_list(&self, timerange: Timerange) -> SeriesList {
        let slots = timerange.slots();
        SeriesList {
            series: self
                .0
                .iter()
                .map(|ts| Timeseries::new(vec![ts.value; slots], ts.tagset.clone()))
                .collect(),
            timerange,
        }
    }
}

impl FromIterator<TaggedScalar> for ScalarSet {
    fn from_iter<I: IntoIterator<Item = TaggedScalar>>(iter: I) -> Self {
        ScalarSet(iter.into_iter().collect())
    }
}
