//! The key → entry map.
//!
//! `CacheStore` is plain single-owner state; the engine serializes access to
//! it. Callers never keep references to entries across an await: they read
//! snapshots out and write back through `set`, which tolerates keys that were
//! evicted in the meantime.

use std::collections::HashMap;

use tokio::time::Instant;
use tracing::debug;

use crate::config::QueryOptions;

use super::{CacheEntry, CacheKey, QueryParams, QueryState};

/// Selects entries for invalidation.
pub enum KeyFilter<'a> {
    Exact(&'a CacheKey),
    /// Every key under a scope ("articles").
    Scope(&'a str),
    Matching(&'a (dyn Fn(&CacheKey, &QueryParams) -> bool + Send + Sync)),
    All,
}

impl KeyFilter<'_> {
    pub fn matches(&self, key: &CacheKey, params: &QueryParams) -> bool {
        match self {
            KeyFilter::Exact(k) => *k == key,
            KeyFilter::Scope(scope) => key.scope() == *scope,
            KeyFilter::Matching(pred) => pred(key, params),
            KeyFilter::All => true,
        }
    }
}

/// Result of reading an entry through the store.
#[derive(Debug, Clone)]
pub struct Lookup<T> {
    pub state: QueryState<T>,
    /// The entry is missing data or stale, and fetching is enabled.
    pub needs_fetch: bool,
}

#[derive(Debug)]
pub struct CacheStore<T> {
    entries: HashMap<CacheKey, CacheEntry<T>>,
}

impl<T: Clone> Default for CacheStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> CacheStore<T> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Read `key`, creating an idle entry if it is missing.
    ///
    /// Touches the entry and adopts `options` as its current configuration.
    pub fn get(
        &mut self,
        key: &CacheKey,
        params: &QueryParams,
        options: QueryOptions,
        now: Instant,
    ) -> Lookup<T> {
        let entry = self.entries.entry(key.clone()).or_insert_with(|| {
            debug!(key = %key, "Creating cache entry");
            CacheEntry::new(params.clone(), options, now)
        });
        entry.options = options;
        entry.touch(now);
        Self::lookup(key, entry, now)
    }

    /// Read an existing entry with its own options. Used by timers.
    pub fn revisit(&mut self, key: &CacheKey, now: Instant) -> Option<Lookup<T>> {
        let entry = self.entries.get_mut(key)?;
        entry.touch(now);
        Some(Self::lookup(key, entry, now))
    }

    fn lookup(key: &CacheKey, entry: &CacheEntry<T>, now: Instant) -> Lookup<T> {
        let needs_fetch = entry.options.enabled
            && entry.pending_mutations == 0
            && (entry.data.is_none() || entry.is_stale(now));
        Lookup {
            state: entry.snapshot(key),
            needs_fetch,
        }
    }

    pub fn peek(&self, key: &CacheKey) -> Option<&CacheEntry<T>> {
        self.entries.get(key)
    }

    /// Apply `patch` to the entry for `key`. Returns `None` if it was evicted.
    pub fn set<R>(&mut self, key: &CacheKey, patch: impl FnOnce(&mut CacheEntry<T>) -> R) -> Option<R> {
        self.entries.get_mut(key).map(patch)
    }

    /// Bump `lastAccessedAt` (and with it `expiresAt`).
    pub fn touch(&mut self, key: &CacheKey, now: Instant) -> bool {
        self.set(key, |entry| entry.touch(now)).is_some()
    }

    /// Remove unobserved entries whose expiry has passed.
    ///
    /// Entries with subscribers or a pending mutation are never evicted.
    pub fn evict_expired(&mut self, now: Instant) -> Vec<CacheKey> {
        let expired: Vec<CacheKey> = self
            .entries
            .iter()
            .filter(|(_, e)| e.subscriber_count == 0 && e.pending_mutations == 0 && e.is_expired(now))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &expired {
            self.entries.remove(key);
            debug!(key = %key, "Evicted expired cache entry");
        }
        expired
    }

    /// Mark matching entries stale. Returns the matched keys.
    pub fn invalidate(&mut self, filter: &KeyFilter<'_>) -> Vec<CacheKey> {
        let mut matched = Vec::new();
        for (key, entry) in self.entries.iter_mut() {
            if filter.matches(key, &entry.params) {
                entry.mark_stale();
                matched.push(key.clone());
            }
        }
        matched
    }

    pub fn subscriber_total(&self) -> usize {
        self.entries.values().map(|e| e.subscriber_count).sum()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
