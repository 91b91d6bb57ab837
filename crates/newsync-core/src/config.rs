//! Engine configuration.
//!
//! `QueryOptions` is the per-query configuration surface (stale time, cache
//! time, refetch interval, enabled). `SyncConfig` carries the engine-wide
//! defaults plus timer and retry tuning. Both deserialize from camelCase JSON
//! with every field optional.

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ============================================================================
// Constants
// ============================================================================

/// Default cache time: 10 minutes.
/// Unobserved entries stay around long enough to survive navigation back and forth.
const DEFAULT_CACHE_TIME_MS: u64 = 10 * 60 * 1000;

/// Default background refresh interval: 5 minutes.
const DEFAULT_REFETCH_INTERVAL_MS: u64 = 5 * 60 * 1000;

/// Default quiet period before a search query is issued.
const DEFAULT_SEARCH_DEBOUNCE_MS: u64 = 300;

/// Lower bound for the GC sweep period.
const DEFAULT_GC_MIN_INTERVAL_MS: u64 = 1000;

/// Initial backoff before retrying a network failure.
const DEFAULT_RETRY_BACKOFF_MS: u64 = 500;

/// Automatic retries for network failures.
const DEFAULT_NETWORK_RETRIES: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueryOptions {
    /// How long fetched data counts as fresh. 0 = stale on every revisit.
    pub stale_time_ms: u64,
    /// How long an unobserved entry survives after its last access.
    pub cache_time_ms: u64,
    /// Background refresh period while the key has subscribers.
    pub refetch_interval_ms: Option<u64>,
    /// `false` suppresses all fetching; cached data can still be read.
    pub enabled: bool,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            stale_time_ms: 0,
            cache_time_ms: DEFAULT_CACHE_TIME_MS,
            refetch_interval_ms: Some(DEFAULT_REFETCH_INTERVAL_MS),
            enabled: true,
        }
    }
}

impl QueryOptions {
    pub fn stale_time(&self) -> Duration {
        Duration::from_millis(self.stale_time_ms)
    }

    pub fn cache_time(&self) -> Duration {
        Duration::from_millis(self.cache_time_ms)
    }

    pub fn refetch_interval(&self) -> Option<Duration> {
        self.refetch_interval_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }

    pub fn with_stale_time(mut self, stale_time: Duration) -> Self {
        self.stale_time_ms = stale_time.as_millis() as u64;
        self
    }

    pub fn with_cache_time(mut self, cache_time: Duration) -> Self {
        self.cache_time_ms = cache_time.as_millis() as u64;
        self
    }

    pub fn with_refetch_interval(mut self, interval: Option<Duration>) -> Self {
        self.refetch_interval_ms = interval.map(|d| d.as_millis() as u64);
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncConfig {
    /// Options applied to queries that don't pass their own.
    pub defaults: QueryOptions,
    pub search_debounce_ms: u64,
    pub gc_min_interval_ms: u64,
    pub retry_backoff_ms: u64,
    pub network_retries: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            defaults: QueryOptions::default(),
            search_debounce_ms: DEFAULT_SEARCH_DEBOUNCE_MS,
            gc_min_interval_ms: DEFAULT_GC_MIN_INTERVAL_MS,
            retry_backoff_ms: DEFAULT_RETRY_BACKOFF_MS,
            network_retries: DEFAULT_NETWORK_RETRIES,
        }
    }
}

impl SyncConfig {
    pub fn search_debounce(&self) -> Duration {
        Duration::from_millis(self.search_debounce_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    /// GC sweep period for the default cache time.
    pub fn gc_interval(&self) -> Duration {
        self.gc_interval_for(self.defaults.cache_time())
    }

    /// GC sweep period for `cache_time`: half of it, never below the minimum.
    pub fn gc_interval_for(&self, cache_time: Duration) -> Duration {
        let half = cache_time / 2;
        half.max(Duration::from_millis(self.gc_min_interval_ms.max(1)))
    }
}
