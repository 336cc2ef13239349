//! Storage wrapper that records every backend call on the request's profiler.

use std::sync::Arc;

use mqe_core::api::{FetchMultipleRequest, FetchRequest, StorageError, TimeseriesStorage};
use mqe_core::series::{SeriesList, Timeseries};
use mqe_core::timerange::Timerange;

#[derive(Clone)]
pub struct ProfilingStorage {
    inner: Arc<dyn TimeseriesStorage>,
}

impl ProfilingStorage {
    pub fn new(inner: Arc<dyn TimeseriesStorage>) -> Self {
        Self { inner }
    }
}

impl TimeseriesStorage for ProfilingStorage {
    fn choose_resolution(&self, requested: Timerange, slot_limit: usize) -> i64 {
        self.inner.choose_resolution(requested, slot_limit)
    }

    fn fetch_single(&self, request: FetchRequest) -> Result<Timeseries, StorageError> {
        let _profile = request
            .details
            .profiler
            .record(format!("storage.fetch_single {}", request.metric));
        self.inner.fetch_single(request)
    }

    fn fetch_multiple(&self, request: FetchMultipleRequest) -> Result<SeriesList, StorageError> {
        let _profile = request
            .details
            .profiler
            .record(format!("storage.fetch_multiple ({} metrics)", request.metrics.len()));
        self.inner.fetch_multiple(request)
    }

    fn check_healthy(&self) -> Result<(), StorageError> {
        self.inner.check_healthy()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mqe_core::api::{RequestDetails, SampleMethod, TaggedMetric};
    use mqe_core::cancel::Timeout;
    use mqe_core::profile::Profiler;
    use mqe_core::tagset::TagSet;

    use crate::memory::PointStorage;

    #[test]
    fn records_one_profile_per_call() {
        let backend = PointStorage::new();
        let metric = TaggedMetric::new("cpu", TagSet::from([("host", "a")]));
        backend.insert(metric.clone(), [(0, 1.0)]);
        let storage = ProfilingStorage::new(Arc::new(backend));
        let profiler = Profiler::new();
        let details = RequestDetails {
            sample_method: SampleMethod::Mean,
            timerange: Timerange::new(0, 60_000, 30_000).unwrap(),
            timeout: Timeout::never(),
            profiler: profiler.clone(),
        };
        storage
            .fetch_multiple(FetchMultipleRequest {
                metrics: vec![metric],
                details,
            })
            .unwrap();
        let names: Vec<String> = profiler.all().iter().map(|p| p.name().to_string()).collect();
        assert_eq!(names, vec!["storage.fetch_multiple (1 metrics)".to_string()]);
    }
}
