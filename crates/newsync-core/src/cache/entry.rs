use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;

use crate::config::QueryOptions;
use crate::error::SyncError;
use crate::utils::format_age;

use super::{CacheKey, QueryParams};

/// Identifier of one underlying network fetch.
pub type RequestId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryStatus {
    Idle,
    Loading,
    Success,
    Error,
}

impl std::fmt::Display for QueryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueryStatus::Idle => write!(f, "idle"),
            QueryStatus::Loading => write!(f, "loading"),
            QueryStatus::Success => write!(f, "success"),
            QueryStatus::Error => write!(f, "error"),
        }
    }
}

/// Cached state for one key.
///
/// `data` survives failed refreshes: a refresh error on an entry that already
/// has data lands in `refresh_error` and leaves `status` alone.
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    pub params: QueryParams,
    pub options: QueryOptions,
    pub data: Option<T>,
    pub status: QueryStatus,
    /// Present only while `status == Error`.
    pub error: Option<SyncError>,
    /// Last failed background refresh of otherwise good data.
    pub refresh_error: Option<SyncError>,
    pub is_fetching: bool,
    pub fetched_at: Option<DateTime<Utc>>,
    /// `None` means stale (never fetched, or invalidated).
    pub stale_at: Option<Instant>,
    pub last_accessed_at: Instant,
    pub expires_at: Instant,
    pub in_flight_request_id: Option<RequestId>,
    pub subscriber_count: usize,
    /// Bumped on every write to `data`/`status`; fetch results that started
    /// under an older version are discarded.
    pub version: u64,
    pub pending_mutations: usize,
}

impl<T: Clone> CacheEntry<T> {
    pub fn new(params: QueryParams, options: QueryOptions, now: Instant) -> Self {
        Self {
            params,
            options,
            data: None,
            status: QueryStatus::Idle,
            error: None,
            refresh_error: None,
            is_fetching: false,
            fetched_at: None,
            stale_at: None,
            last_accessed_at: now,
            expires_at: now + options.cache_time(),
            in_flight_request_id: None,
            subscriber_count: 0,
            version: 0,
            pending_mutations: 0,
        }
    }

    pub fn is_stale(&self, now: Instant) -> bool {
        match self.stale_at {
            Some(stale_at) => now >= stale_at,
            None => true,
        }
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }

    pub fn touch(&mut self, now: Instant) {
        self.last_accessed_at = now;
        self.expires_at = now + self.options.cache_time();
    }

    /// Record a successful fetch.
    pub fn record_success(&mut self, data: T, now: Instant) {
        self.data = Some(data);
        self.status = QueryStatus::Success;
        self.error = None;
        self.refresh_error = None;
        self.fetched_at = Some(Utc::now());
        self.stale_at = Some(now + self.options.stale_time());
        self.version += 1;
    }

    /// Record a failed fetch, keeping good data visible.
    pub fn record_failure(&mut self, error: SyncError) {
        if self.data.is_some() && self.status == QueryStatus::Success {
            self.refresh_error = Some(error);
        } else {
            self.status = QueryStatus::Error;
            self.error = Some(error);
        }
        self.version += 1;
    }

    pub fn mark_stale(&mut self) {
        self.stale_at = None;
        self.version += 1;
    }

    pub fn age_display(&self) -> String {
        self.fetched_at
            .map(|at| format_age(at, Utc::now()))
            .unwrap_or_else(|| "never".to_string())
    }

    pub fn snapshot(&self, key: &CacheKey) -> QueryState<T> {
        QueryState {
            key: key.clone(),
            data: self.data.clone(),
            status: self.status,
            error: self.error.clone(),
            refresh_error: self.refresh_error.clone(),
            is_fetching: self.is_fetching,
            fetched_at: self.fetched_at,
        }
    }
}

/// What an observer sees of an entry at one point in time.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryState<T> {
    pub key: CacheKey,
    pub data: Option<T>,
    pub status: QueryStatus,
    pub error: Option<SyncError>,
    pub refresh_error: Option<SyncError>,
    pub is_fetching: bool,
    pub fetched_at: Option<DateTime<Utc>>,
}

impl<T> QueryState<T> {
    pub fn is_success(&self) -> bool {
        self.status == QueryStatus::Success
    }

    pub fn is_loading(&self) -> bool {
        self.status == QueryStatus::Loading
    }
}
