//! Backend-facing interfaces: the timeseries store and the metric catalog.
//!
//! The evaluator only ever talks to storage through these traits. Concrete
//! backends (and the parallel fan-out wrapper) live in `mqe-exec`.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cancel::Timeout;
use crate::profile::Profiler;
use crate::series::{SeriesList, Timeseries};
use crate::tagset::TagSet;
use crate::timerange::Timerange;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetricKey(String);

impl MetricKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for MetricKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for MetricKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for MetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifies exactly one stored series.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaggedMetric {
    pub metric_key: MetricKey,
    pub tagset: TagSet,
}

impl TaggedMetric {
    pub fn new(metric_key: impl Into<MetricKey>, tagset: TagSet) -> Self {
        Self {
            metric_key: metric_key.into(),
            tagset,
        }
    }
}

impl fmt::Display for TaggedMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.tagset.is_empty() {
            write!(f, "{}", self.metric_key)
        } else {
            write!(f, "{}[{}]", self.metric_key, self.tagset)
        }
    }
}

/// How the backend folds raw points into one slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SampleMethod {
    #[default]
    Mean,
    Min,
    Max,
    Sum,
}

impl SampleMethod {
    /// Fold the finite values of `points` into one sample; NaN if none.
    pub fn sample(&self, points: &[f64]) -> f64 {
        let mut finite = points.iter().copied().filter(|v| !v.is_nan()).peekable();
        if finite.peek().is_none() {
            return f64::NAN;
        }
        match self {
            SampleMethod::Mean => {
                let (sum, n) = finite.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
                sum / n as f64
            }
            SampleMethod::Min => finite.fold(f64::INFINITY, f64::min),
            SampleMethod::Max => finite.fold(f64::NEG_INFINITY, f64::max),
            SampleMethod::Sum => finite.sum(),
        }
    }
}

/// Parameters shared by every metric of one fetch.
#[derive(Debug, Clone)]
pub struct RequestDetails {
    pub sample_method: SampleMethod,
    pub timerange: Timerange,
    pub timeout: Timeout,
    pub profiler: Profiler,
}

#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub metric: TaggedMetric,
    pub details: RequestDetails,
}

#[derive(Debug, Clone)]
pub struct FetchMultipleRequest {
    pub metrics: Vec<TaggedMetric>,
    pub details: RequestDetails,
}

impl FetchMultipleRequest {
    /// One request per metric, in order, sharing the details.
    pub fn to_single(&self) -> Vec<FetchRequest> {
        self.metrics
            .iter()
            .map(|metric| FetchRequest {
                metric: metric.clone(),
                details: self.details.clone(),
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StorageErrorCode {
    FetchTimeout,
    FetchIO,
    InvalidSeries,
    Limit,
    Unsupported,
}

impl StorageErrorCode {
    fn text(&self) -> &'static str {
        match self {
            StorageErrorCode::FetchTimeout => "timeout",
            StorageErrorCode::FetchIO => "fetch I/O error",
            StorageErrorCode::InvalidSeries => "invalid series",
            StorageErrorCode::Limit => "limit reached",
            StorageErrorCode::Unsupported => "unsupported operation",
        }
    }
}

/// Error reported by a timeseries backend, optionally naming the metric.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageError {
    pub metric: Option<TaggedMetric>,
    pub code: StorageErrorCode,
    pub message: String,
}

impl StorageError {
    pub fn new(code: StorageErrorCode, message: impl Into<String>) -> Self {
        Self {
            metric: None,
            code,
            message: message.into(),
        }
    }

    pub fn timeout() -> Self {
        Self::new(StorageErrorCode::FetchTimeout, "")
    }

    pub fn for_metric(mut self, metric: &TaggedMetric) -> Self {
        self.metric = Some(metric.clone());
        self
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.metric {
            Some(m) => write!(f, "[{}] {}", m, self.code.text())?,
            None => write!(f, "[] {}", self.code.text())?,
        }
        if !self.message.is_empty() {
            write!(f, " - {}", self.message)?;
        }
        Ok(())
    }
}

impl std::error::Error for StorageError {}

/// Error reported by the metric catalog.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("metadata error: {0}")]
pub struct MetadataError(pub String);

/// The timeseries backend consumed by the evaluator.
pub trait TimeseriesStorage: Send + Sync {
    /// Pick the resolution (ms) to serve `requested` without returning more
    /// than `slot_limit` slots.
    fn choose_resolution(&self, requested: Timerange, slot_limit: usize) -> i64;

    fn fetch_single(&self, request: FetchRequest) -> Result<Timeseries, StorageError>;

    /// Default: fetch each metric in turn. Wrappers override this to fan out.
    fn fetch_multiple(&self, request: FetchMultipleRequest) -> Result<SeriesList, StorageError> {
        let timerange = request.details.timerange;
        let series = request
            .to_single()
            .into_iter()
            .map(|r| self.fetch_single(r))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(SeriesList::new(series, timerange))
    }

    fn check_healthy(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

/// The metric catalog consumed by the evaluator.
pub trait MetricMetadata: Send + Sync {
    fn get_all_tags(&self, metric_key: &MetricKey) -> Result<Vec<TagSet>, MetadataError>;

    fn get_metrics_for_tag(&self, key: &str, value: &str) -> Result<Vec<MetricKey>, MetadataError>;

    fn get_all_metrics(&self) -> Result<Vec<MetricKey>, MetadataError>;

    fn add_metric(&self, metric: TaggedMetric) -> Result<(), MetadataError>;

    fn check_healthy(&self) -> Result<(), MetadataError> {
        Ok(())
    }
}
