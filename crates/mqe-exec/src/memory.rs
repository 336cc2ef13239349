//! In-memory timeseries backend.
//!
//! Holds raw `(timestamp_ms, value)` points per tagged metric and samples them
//! into slots at fetch time with the request's sample method. Used by tests,
//! benches and demos in place of a real store.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use mqe_core::api::{FetchRequest, StorageError, StorageErrorCode, TaggedMetric, TimeseriesStorage};
use mqe_core::series::Timeseries;
use mqe_core::timerange::Timerange;

/// Thread-safe point store. Clones share the same data.
#[derive(Debug, Clone)]
pub struct PointStorage {
    points: Arc<Mutex<HashMap<TaggedMetric, Vec<(i64, f64)>>>>,
    /// Native resolutions (ms), ascending.
    resolutions: Vec<i64>,
}

impl PointStorage {
    pub fn new() -> Self {
        Self::with_resolutions(vec![30_000])
    }

    pub fn with_resolutions(mut resolutions: Vec<i64>) -> Self {
        resolutions.retain(|r| *r > 0);
        resolutions.sort_unstable();
        resolutions.dedup();
        Self {
            points: Arc::new(Mutex::new(HashMap::new())),
            resolutions,
        }
    }

    /// Append points for `metric`, creating it if needed.
    pub fn insert(&self, metric: TaggedMetric, points: impl IntoIterator<Item = (i64, f64)>) {
        let mut data = self.points.lock().unwrap_or_else(PoisonError::into_inner);
        data.entry(metric).or_default().extend(points);
    }

    /// Store one sample per slot of `timerange`, starting at its first slot.
    pub fn insert_series(&self, metric: TaggedMetric, timerange: Timerange, values: &[f64]) {
        self.insert(
            metric,
            values
                .iter()
                .enumerate()
                .map(|(slot, v)| (timerange.timestamp(slot), *v)),
        );
    }

    pub fn contains(&self, metric: &TaggedMetric) -> bool {
        let data = self.points.lock().unwrap_or_else(PoisonError::into_inner);
        data.contains_key(metric)
    }

    /// Number of stored series.
    pub fn len(&self) -> usize {
        let data = self.points.lock().unwrap_or_else(PoisonError::into_inner);
        data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for PointStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeseriesStorage for PointStorage {
    /// Finest native resolution at least as coarse as requested that keeps
    /// the window under `slot_limit` slots; otherwise the coarsest one.
    fn choose_resolution(&self, requested: Timerange, slot_limit: usize) -> i64 {
        let duration = requested.duration();
        self.resolutions
            .iter()
            .copied()
            .filter(|r| *r >= requested.resolution())
            .find(|r| duration / r + 1 <= slot_limit as i64)
            .or_else(|| self.resolutions.last().copied())
            .map_or(requested.resolution(), |r| r.max(requested.resolution()))
    }

    fn fetch_single(&self, request: FetchRequest) -> Result<Timeseries, StorageError> {
        if request.details.timeout.is_done() {
            return Err(StorageError::timeout().for_metric(&request.metric));
        }
        let timerange = request.details.timerange;
        let data = self.points.lock().unwrap_or_else(PoisonError::into_inner);
        let points = data.get(&request.metric).ok_or_else(|| {
            StorageError::new(StorageErrorCode::InvalidSeries, "no such series")
                .for_metric(&request.metric)
        })?;

        let slots = timerange.slots();
        let mut buckets: Vec<Vec<f64>> = vec![Vec::new(); slots];
        for &(t, v) in points {
            let index = timerange.index(t);
            if (0..slots as i64).contains(&index) {
                buckets[index as usize].push(v);
            }
        }
        let values = buckets
            .iter()
            .map(|bucket| request.details.sample_method.sample(bucket))
            .collect();
        Ok(Timeseries::new(values, request.metric.tagset.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mqe_core::api::{RequestDetails, SampleMethod};
    use mqe_core::cancel::Timeout;
    use mqe_core::profile::Profiler;
    use mqe_core::tagset::TagSet;

    fn fetch(
        storage: &PointStorage,
        metric: &TaggedMetric,
        method: SampleMethod,
    ) -> Result<Timeseries, StorageError> {
        storage.fetch_single(FetchRequest {
            metric: metric.clone(),
            details: RequestDetails {
                sample_method: method,
                timerange: Timerange::new(0, 60_000, 30_000).unwrap(),
                timeout: Timeout::never(),
                profiler: Profiler::disabled(),
            },
        })
    }

    #[test]
    fn samples_points_into_slots() {
        let storage = PointStorage::new();
        let metric = TaggedMetric::new("cpu", TagSet::from([("host", "a")]));
        storage.insert(
            metric.clone(),
            [(0, 1.0), (10_000, 3.0), (60_000, 5.0), (95_000, 9.0), (-5, 7.0)],
        );
        let mean = fetch(&storage, &metric, SampleMethod::Mean).unwrap();
        assert_eq!(mean.values[0], 2.0);
        assert!(mean.values[1].is_nan());
        assert_eq!(mean.values[2], 5.0);
        assert_eq!(mean.tagset, metric.tagset);
        let sum = fetch(&storage, &metric, SampleMethod::Sum).unwrap();
        assert_eq!(sum.values[0], 4.0);
    }

    #[test]
    fn unknown_metric_is_invalid_series() {
        let storage = PointStorage::new();
        let err = fetch(&storage, &TaggedMetric::new("nope", TagSet::new()), SampleMethod::Mean)
            .unwrap_err();
        assert_eq!(err.code, StorageErrorCode::InvalidSeries);
    }

    #[test]
    fn resolution_respects_slot_limit() {
        let storage = PointStorage::with_resolutions(vec![3_600_000, 30_000, 300_000]);
        let day = Timerange::new(0, 86_400_000, 30_000).unwrap();
        assert_eq!(storage.choose_resolution(day, 5_000), 30_000);
        assert_eq!(storage.choose_resolution(day, 1_000), 300_000);
        assert_eq!(storage.choose_resolution(day, 10), 3_600_000);
    }
}
