//! Metric catalogs: an in-memory `MetadataMap` and a TTL cache that can sit
//! in front of any `MetricMetadata` implementation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use mqe_core::api::{MetadataError, MetricKey, MetricMetadata, TaggedMetric};
use mqe_core::config::EngineConfig;
use mqe_core::tagset::TagSet;

#[derive(Debug, Default)]
struct Catalog {
    tags_of_metric: HashMap<MetricKey, Vec<TagSet>>,
    all_metrics: Vec<MetricKey>,
    metrics_for_tag: HashMap<String, HashMap<String, Vec<MetricKey>>>,
}

fn push_unique<T: PartialEq>(items: &mut Vec<T>, item: T) {
    if !items.contains(&item) {
        items.push(item);
    }
}

/// In-memory catalog. Insertion order is preserved and duplicates ignored.
#[derive(Debug, Default)]
pub struct MetadataMap {
    catalog: Mutex<Catalog>,
}

impl MetadataMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_metrics(
        &self,
        metrics: impl IntoIterator<Item = TaggedMetric>,
    ) -> Result<(), MetadataError> {
        metrics.into_iter().try_for_each(|m| self.add_metric(m))
    }
}

impl MetricMetadata for MetadataMap {
    fn get_all_tags(&self, metric_key: &MetricKey) -> Result<Vec<TagSet>, MetadataError> {
        let catalog = self.catalog.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(catalog
            .tags_of_metric
            .get(metric_key)
            .cloned()
            .unwrap_or_default())
    }

    fn get_metrics_for_tag(
        &self,
        key: &str,
        value: &str,
    ) -> Result<Vec<MetricKey>, MetadataError> {
        let catalog = self.catalog.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(catalog
            .metrics_for_tag
            .get(key)
            .and_then(|values| values.get(value))
            .cloned()
            .unwrap_or_default())
    }

    fn get_all_metrics(&self) -> Result<Vec<MetricKey>, MetadataError> {
        let catalog = self.catalog.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(catalog.all_metrics.clone())
    }

    fn add_metric(&self, metric: TaggedMetric) -> Result<(), MetadataError> {
        let mut catalog = self.catalog.lock().unwrap_or_else(PoisonError::into_inner);
        for (key, value) in metric.tagset.iter() {
            let keys = catalog
                .metrics_for_tag
                .entry(key.to_string())
                .or_default()
                .entry(value.to_string())
                .or_default();
            push_unique(keys, metric.metric_key.clone());
        }
        push_unique(&mut catalog.all_metrics, metric.metric_key.clone());
        let tagsets = catalog.tags_of_metric.entry(metric.metric_key).or_default();
        push_unique(tagsets, metric.tagset);
        Ok(())
    }
}

/// Source of "now" for cache expiry.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    base: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.offset.lock().unwrap_or_else(PoisonError::into_inner) += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + *self.offset.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug, Clone)]
struct CachedTags {
    tagsets: Vec<TagSet>,
    expiry: Instant,
}

/// Caches `get_all_tags` per metric for a fixed TTL. Every other call goes
/// straight through; `add_metric` evicts the metric it touched. A zero TTL
/// disables caching.
pub struct CachedMetadata {
    inner: Arc<dyn MetricMetadata>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
    cache: Mutex<HashMap<MetricKey, CachedTags>>,
}

impl CachedMetadata {
    pub fn new(inner: Arc<dyn MetricMetadata>, ttl: Duration) -> Self {
        Self::with_clock(inner, ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(
        inner: Arc<dyn MetricMetadata>,
        ttl: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            inner,
            ttl,
            clock,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(inner: Arc<dyn MetricMetadata>, config: &EngineConfig) -> Self {
        Self::new(inner, Duration::from_millis(config.metadata_cache_ttl_ms))
    }

    /// Number of entries that have not yet expired.
    pub fn live_entries(&self) -> usize {
        let now = self.clock.now();
        let cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache.values().filter(|c| c.expiry > now).count()
    }

    pub fn invalidate_all(&self) {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn cached(&self, metric_key: &MetricKey) -> Option<Vec<TagSet>> {
        let now = self.clock.now();
        let cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache
            .get(metric_key)
            .filter(|c| c.expiry > now)
            .map(|c| c.tagsets.clone())
    }

    /// Store `tagsets` unless a fresher entry landed in the meantime.
    fn store(&self, metric_key: &MetricKey, tagsets: Vec<TagSet>) {
        let expiry = self.clock.now() + self.ttl;
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        match cache.get(metric_key) {
            Some(existing) if existing.expiry >= expiry => {}
            _ => {
                cache.insert(metric_key.clone(), CachedTags { tagsets, expiry });
            }
        }
    }
}

impl MetricMetadata for CachedMetadata {
    fn get_all_tags(&self, metric_key: &MetricKey) -> Result<Vec<TagSet>, MetadataError> {
        if self.ttl.is_zero() {
            return self.inner.get_all_tags(metric_key);
        }
        if let Some(tagsets) = self.cached(metric_key) {
            #[cfg(feature = "tracing")]
            tracing::trace!(metric = %metric_key, "tag cache hit");
            return Ok(tagsets);
        }
        #[cfg(feature = "tracing")]
        tracing::trace!(metric = %metric_key, "tag cache miss");
        let tagsets = self.inner.get_all_tags(metric_key)?;
        self.store(metric_key, tagsets.clone());
        Ok(tagsets)
    }

    fn get_metrics_for_tag(
        &self,
        key: &str,
        value: &str,
    ) -> Result<Vec<MetricKey>, MetadataError> {
        self.inner.get_metrics_for_tag(key, value)
    }

    fn get_all_metrics(&self) -> Result<Vec<MetricKey>, MetadataError> {
        self.inner.get_all_metrics()
    }

    fn add_metric(&self, metric: TaggedMetric) -> Result<(), MetadataError> {
        let key = metric.metric_key.clone();
        self.inner.add_metric(metric)?;
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&key);
        Ok(())
    }

    fn check_healthy(&self) -> Result<(), MetadataError> {
        self.inner.check_healthy()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counting {
        map: MetadataMap,
        tag_lookups: AtomicUsize,
    }

    impl MetricMetadata for Counting {
        fn get_all_tags(&self, metric_key: &MetricKey) -> Result<Vec<TagSet>, MetadataError> {
            self.tag_lookups.fetch_add(1, Ordering::SeqCst);
            self.map.get_all_tags(metric_key)
        }
        fn get_metrics_for_tag(
            &self,
            key: &str,
            value: &str,
        ) -> Result<Vec<MetricKey>, MetadataError> {
            self.map.get_metrics_for_tag(key, value)
        }
        fn get_all_metrics(&self) -> Result<Vec<MetricKey>, MetadataError> {
            self.map.get_all_metrics()
        }
        fn add_metric(&self, metric: TaggedMetric) -> Result<(), MetadataError> {
            self.map.add_metric(metric)
        }
    }

    fn metric(key: &str, host: &str) -> TaggedMetric {
        TaggedMetric::new(key, TagSet::from([("host", host)]))
    }

    #[test]
    fn map_indexes_tags_and_ignores_duplicates() {
        let map = MetadataMap::new();
        map.add_metrics([
            metric("cpu", "a"),
            metric("cpu", "b"),
            metric("cpu", "a"),
            metric("mem", "a"),
        ])
        .unwrap();
        assert_eq!(map.get_all_tags(&"cpu".into()).unwrap().len(), 2);
        assert_eq!(
            map.get_all_metrics().unwrap(),
            vec![MetricKey::from("cpu"), MetricKey::from("mem")]
        );
        assert_eq!(
            map.get_metrics_for_tag("host", "a").unwrap(),
            vec![MetricKey::from("cpu"), MetricKey::from("mem")]
        );
        assert!(map.get_metrics_for_tag("dc", "x").unwrap().is_empty());
        assert!(map.get_all_tags(&"disk".into()).unwrap().is_empty());
    }

    #[test]
    fn cache_serves_hits_until_expiry() {
        let inner = Arc::new(Counting::default());
        inner.add_metric(metric("cpu", "a")).unwrap();
        let clock = Arc::new(ManualClock::new());
        let cached =
            CachedMetadata::with_clock(inner.clone(), Duration::from_secs(60), clock.clone());

        let key = MetricKey::from("cpu");
        assert_eq!(cached.get_all_tags(&key).unwrap().len(), 1);
        assert_eq!(cached.get_all_tags(&key).unwrap().len(), 1);
        assert_eq!(inner.tag_lookups.load(Ordering::SeqCst), 1);
        assert_eq!(cached.live_entries(), 1);

        clock.advance(Duration::from_secs(61));
        assert_eq!(cached.live_entries(), 0);
        cached.get_all_tags(&key).unwrap();
        assert_eq!(inner.tag_lookups.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn add_metric_evicts_entry() {
        let inner = Arc::new(Counting::default());
        let cached = CachedMetadata::new(inner.clone(), Duration::from_secs(60));
        cached.add_metric(metric("cpu", "a")).unwrap();
        assert_eq!(cached.get_all_tags(&"cpu".into()).unwrap().len(), 1);
        cached.add_metric(metric("cpu", "b")).unwrap();
        assert_eq!(cached.get_all_tags(&"cpu".into()).unwrap().len(), 2);
        assert_eq!(inner.tag_lookups.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn zero_ttl_passes_through() {
        let inner = Arc::new(Counting::default());
        let cached = CachedMetadata::from_config(
            inner.clone(),
            &EngineConfig {
                metadata_cache_ttl_ms: 0,
                ..EngineConfig::default()
            },
        );
        cached.get_all_tags(&"cpu".into()).unwrap();
        cached.get_all_tags(&"cpu".into()).unwrap();
        assert_eq!(inner.tag_lookups.load(Ordering::SeqCst), 2);
        assert_eq!(cached.live_entries(), 0);
    }
}
