//! Engine configuration that downstream crates can serialize/deserialize.

use serde::{Deserialize, Serialize};

use crate::api::SampleMethod;
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum number of series a single query may fetch.
    pub fetch_limit: usize,

    /// Width of the ticket pool used by the parallel fetch coordinator.
    pub max_concurrent_fetches: usize,

    /// Whole-query deadline. Every ticket wait and fetch observes it.
    pub fetch_timeout_ms: u64,

    /// TTL of the `get_all_tags` cache; 0 disables caching.
    pub metadata_cache_ttl_ms: u64,

    /// Fan fetches out over the ticket pool instead of issuing them serially.
    pub fetch_concurrently: bool,

    /// Upper bound on slots per series when choosing a resolution.
    pub slot_limit: usize,

    /// Memoize subexpressions within one evaluation context.
    pub memoize: bool,

    pub default_sample_method: SampleMethod,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fetch_limit: 10_000,
            max_concurrent_fetches: 10,
            fetch_timeout_ms: 30_000,
            metadata_cache_ttl_ms: 2 * 60 * 60 * 1000, // 2h
            fetch_concurrently: true,
            slot_limit: 5_000,
            memoize: true,
            default_sample_method: SampleMethod::Mean,
        }
    }
}

impl EngineConfig {
    /// Create a config from environment variables, falling back to defaults.
    ///
    /// Environment variables:
    /// - `MQE_FETCH_LIMIT`: maximum series per query
    /// - `MQE_MAX_CONCURRENT_FETCHES`: ticket pool width
    /// - `MQE_FETCH_TIMEOUT_MS`: query deadline in ms
    /// - `MQE_METADATA_CACHE_TTL_MS`: tag cache TTL in ms (0 disables)
    /// - `MQE_FETCH_CONCURRENTLY`: `true`/`false`
    /// - `MQE_SLOT_LIMIT`: maximum slots per series
    /// - `MQE_MEMOIZE`: `true`/`false`
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(s) = std::env::var("MQE_FETCH_LIMIT") {
            if let Ok(v) = s.parse::<usize>() {
                cfg.fetch_limit = v;
            }
        }

        if let Ok(s) = std::env::var("MQE_MAX_CONCURRENT_FETCHES") {
            if let Ok(v) = s.parse::<usize>() {
                cfg.max_concurrent_fetches = v;
            }
        }

        if let Ok(s) = std::env::var("MQE_FETCH_TIMEOUT_MS") {
            if let Ok(v) = s.parse::<u64>() {
                cfg.fetch_timeout_ms = v;
            }
        }

        if let Ok(s) = std::env::var("MQE_METADATA_CACHE_TTL_MS") {
            if let Ok(v) = s.parse::<u64>() {
                cfg.metadata_cache_ttl_ms = v;
            }
        }

        if let Ok(s) = std::env::var("MQE_FETCH_CONCURRENTLY") {
            if let Ok(v) = s.parse::<bool>() {
                cfg.fetch_concurrently = v;
            }
        }

        if let Ok(s) = std::env::var("MQE_SLOT_LIMIT") {
            if let Ok(v) = s.parse::<usize>() {
                cfg.slot_limit = v;
            }
        }

        if let Ok(s) = std::env::var("MQE_MEMOIZE") {
            if let Ok(v) = s.parse::<bool>() {
                cfg.memoize = v;
            }
        }

        cfg
    }

    /// Parse a JSON document; missing fields take their defaults.
    pub fn from_json(s: &str) -> Result<Self> {
        let cfg: EngineConfig = serde_json::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_fetches == 0 {
            return Err(Error::Config("max_concurrent_fetches must be > 0".into()));
        }
        if self.fetch_timeout_ms == 0 {
            return Err(Error::Config("fetch_timeout_ms must be > 0".into()));
        }
        if self.slot_limit == 0 {
            return Err(Error::Config("slot_limit must be > 0".into()));
        }
        Ok(())
    }

    pub fn fetch_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.fetch_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_fills_defaults() {
        let cfg = EngineConfig::from_json(r#"{"fetch_limit": 7, "default_sample_method": "Max"}"#)
            .unwrap();
        assert_eq!(cfg.fetch_limit, 7);
        assert_eq!(cfg.default_sample_method, SampleMethod::Max);
        assert_eq!(cfg.max_concurrent_fetches, 10);
    }

    #[test]
    fn validate_rejects_zero_concurrency() {
        let err = EngineConfig::from_json(r#"{"max_concurrent_fetches": 0}"#).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
