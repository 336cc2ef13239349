//! Convenient re-exports for downstream crates.

pub use crate::api::{
    FetchMultipleRequest, FetchRequest, MetadataError, MetricKey, MetricMetadata, RequestDetails,
    SampleMethod, StorageError, StorageErrorCode, TaggedMetric, TimeseriesStorage,
};
pub use crate::budget::FetchCounter;
pub use crate::cancel::Timeout;
pub use crate::config::EngineConfig;
pub use crate::error::{Error, Result};
pub use crate::predicate::Predicate;
pub use crate::profile::Profiler;
pub use crate::series::{ScalarSet, SeriesList, TaggedScalar, Timeseries};
pub use crate::tagset::TagSet;
pub use crate::timerange::Timerange;
