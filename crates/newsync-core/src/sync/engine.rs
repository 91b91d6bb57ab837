//! The sync engine: composition root of the cache, fetch gate, scheduler,
//! mutation coordinator and subscription hub.
//!
//! All cache state lives behind one mutex that is never held across an
//! await. Every transition of an entry is published to its subscribers while
//! that lock is held, which keeps per-key notifications in transition order.
//! The fetch gate and the scheduler have their own locks and may be taken
//! while the state lock is held, never the other way round.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use futures::future::BoxFuture;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::cache::{CacheKey, CacheStore, KeyCodec, KeyFilter, QueryParams, QueryState, QueryStatus, RequestId};
use crate::config::{QueryOptions, SyncConfig};
use crate::error::SyncError;

use super::fetcher::Fetcher;
use super::gate::{FetchGate, Flight};
use super::hub::{EngineHandle, SubscriberId, Subscription, SubscriptionHub, Unsubscribe};
use super::mutation::{MutationCoordinator, PendingMutation};
use super::scheduler::Scheduler;
use super::search::SearchDebouncer;

struct EngineState<T> {
    store: CacheStore<T>,
    hub: SubscriptionHub<T>,
    mutations: MutationCoordinator<T>,
    disposed: bool,
}

impl<T: Clone> EngineState<T> {
    fn new() -> Self {
        Self {
            store: CacheStore::new(),
            hub: SubscriptionHub::new(),
            mutations: MutationCoordinator::new(),
            disposed: false,
        }
    }

    fn ensure_live(&self) -> Result<(), SyncError> {
        if self.disposed {
            Err(SyncError::Disposed)
        } else {
            Ok(())
        }
    }
}

struct Inner<F: Fetcher> {
    this: Weak<Inner<F>>,
    fetcher: Arc<F>,
    codec: KeyCodec,
    config: SyncConfig,
    state: Mutex<EngineState<F::Data>>,
    gate: FetchGate<F::Data>,
    scheduler: Scheduler,
}

/// Counters for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStats {
    pub entries: usize,
    pub in_flight: usize,
    pub subscribers: usize,
    pub refresh_timers: usize,
}

/// Handle that re-runs the fetch behind a query result.
pub struct Refetch<T> {
    key: CacheKey,
    engine: Weak<dyn EngineHandle<T>>,
}

impl<T> Clone for Refetch<T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            engine: Weak::clone(&self.engine),
        }
    }
}

impl<T> Refetch<T> {
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// Force a fetch for the key, joining one that is already running.
    pub async fn run(&self) -> Result<T, SyncError> {
        match self.engine.upgrade() {
            Some(engine) => engine.refetch(self.key.clone()).await,
            None => Err(SyncError::Disposed),
        }
    }
}

/// `{data, status, error, refetch}` as returned by `query`.
pub struct QueryResult<T> {
    state: QueryState<T>,
    refetch: Refetch<T>,
}

impl<T> QueryResult<T> {
    pub fn key(&self) -> &CacheKey {
        &self.state.key
    }

    pub fn state(&self) -> &QueryState<T> {
        &self.state
    }

    pub fn data(&self) -> Option<&T> {
        self.state.data.as_ref()
    }

    pub fn status(&self) -> QueryStatus {
        self.state.status
    }

    pub fn error(&self) -> Option<&SyncError> {
        self.state.error.as_ref()
    }

    pub fn refetch_handle(&self) -> Refetch<T> {
        self.refetch.clone()
    }

    pub async fn refetch(&self) -> Result<T, SyncError> {
        self.refetch.run().await
    }

    pub fn into_state(self) -> QueryState<T> {
        self.state
    }
}

/// Callback binding created by `observe`. Detaches on drop.
pub struct Observer<T> {
    key: CacheKey,
    handle: Unsubscribe<T>,
}

impl<T> Observer<T> {
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    pub fn detach(&self) {
        self.handle.unsubscribe();
    }

    pub fn is_detached(&self) -> bool {
        self.handle.is_detached()
    }
}

impl<T> Drop for Observer<T> {
    fn drop(&mut self) {
        self.handle.unsubscribe();
    }
}

/// Client-side sync engine over one `Fetcher`.
///
/// Clone is cheap: all clones share the same cache. Must be created inside a
/// tokio runtime.
pub struct SyncEngine<F: Fetcher> {
    inner: Arc<Inner<F>>,
}

impl<F: Fetcher> Clone for SyncEngine<F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

async fn fetch_with_retry<F: Fetcher>(
    fetcher: &F,
    params: &QueryParams,
    retries: u32,
    backoff: Duration,
) -> Result<F::Data, SyncError> {
    let mut attempt = 0;
    let mut delay = backoff;
    loop {
        match fetcher.fetch(params).await {
            Err(e) if e.is_retryable() && attempt < retries => {
                attempt += 1;
                warn!(error = %e, attempt, backoff_ms = delay.as_millis() as u64, "Fetch failed, retrying");
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
            result => return result,
        }
    }
}

impl<F: Fetcher> Inner<F> {
    fn lock(&self) -> MutexGuard<'_, EngineState<F::Data>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn handle(&self) -> Weak<dyn EngineHandle<F::Data>> {
        let weak: Weak<dyn EngineHandle<F::Data>> = self.this.clone();
        weak
    }

    fn current(&self, key: &CacheKey) -> Result<QueryState<F::Data>, SyncError> {
        let state = self.lock();
        state.ensure_live()?;
        state
            .store
            .peek(key)
            .map(|entry| entry.snapshot(key))
            .ok_or_else(|| SyncError::NotCached(key.to_string()))
    }

    /// Start a fetch for `key`, or join the one in flight.
    fn start_fetch(&self, key: &CacheKey, params: QueryParams) -> Flight<F::Data> {
        self.gate.run(key, |request_id| {
            let started_version = self.begin_fetch(key, request_id);
            let fetcher = Arc::clone(&self.fetcher);
            let this = self.this.clone();
            let key = key.clone();
            let retries = self.config.network_retries;
            let backoff = self.config.retry_backoff();
            async move {
                let result = fetch_with_retry(fetcher.as_ref(), &params, retries, backoff).await;
                match this.upgrade() {
                    Some(inner) => inner.finish_fetch(&key, request_id, started_version, &result),
                    None => debug!(key = %key, "Engine dropped before fetch settled"),
                }
                result
            }
        })
    }

    /// Record the fetch on its entry and return the write counter it started under.
    fn begin_fetch(&self, key: &CacheKey, request_id: RequestId) -> Option<u64> {
        let mut state = self.lock();
        let EngineState { store, hub, .. } = &mut *state;
        let (version, snapshot) = store.set(key, |entry| {
            entry.in_flight_request_id = Some(request_id);
            entry.is_fetching = true;
            if entry.data.is_none() && entry.pending_mutations == 0 {
                entry.status = QueryStatus::Loading;
                entry.error = None;
            }
            (entry.version, entry.snapshot(key))
        })?;
        hub.publish(&snapshot);
        Some(version)
    }

    /// Apply a fetch outcome unless a newer write landed since it started.
    fn finish_fetch(
        &self,
        key: &CacheKey,
        request_id: RequestId,
        started_version: Option<u64>,
        result: &Result<F::Data, SyncError>,
    ) {
        let mut state = self.lock();
        if state.disposed {
            return;
        }
        let abandoned = self.gate.is_abandoned(key, request_id);
        let EngineState { store, hub, .. } = &mut *state;
        let now = Instant::now();
        let Some(snapshot) = store.set(key, |entry| {
            if entry.in_flight_request_id == Some(request_id) {
                entry.in_flight_request_id = None;
                entry.is_fetching = false;
            }
            if started_version == Some(entry.version) && entry.pending_mutations == 0 {
                match result {
                    Ok(data) => entry.record_success(data.clone(), now),
                    Err(e) => {
                        warn!(key = %key, request_id, error = %e, "Fetch failed");
                        entry.record_failure(e.clone());
                    }
                }
            } else {
                debug!(key = %key, request_id, "Discarding outdated fetch result");
            }
            entry.snapshot(key)
        }) else {
            debug!(key = %key, request_id, "Entry evicted before fetch settled");
            return;
        };
        if abandoned {
            debug!(key = %key, request_id, "Fetch settled with no observers");
        } else {
            hub.publish(&snapshot);
        }
    }

    async fn force_fetch(&self, key: &CacheKey) -> Result<F::Data, SyncError> {
        let (params, enabled, data) = {
            let state = self.lock();
            state.ensure_live()?;
            let entry = state
                .store
                .peek(key)
                .ok_or_else(|| SyncError::NotCached(key.to_string()))?;
            (entry.params.clone(), entry.options.enabled, entry.data.clone())
        };
        if !enabled {
            debug!(key = %key, "Fetching disabled, serving cached data");
            return data.ok_or_else(|| SyncError::NotCached(key.to_string()));
        }
        self.start_fetch(key, params).wait().await
    }

    fn subscribe(&self, key: &CacheKey) -> Result<Subscription<F::Data>, SyncError> {
        let (id, rx) = {
            let mut state = self.lock();
            state.ensure_live()?;
            let EngineState { store, hub, .. } = &mut *state;
            let now = Instant::now();
            let (current, count, period) = store
                .set(key, |entry| {
                    entry.subscriber_count += 1;
                    entry.touch(now);
                    (entry.snapshot(key), entry.subscriber_count, entry.options.refetch_interval())
                })
                .ok_or_else(|| SyncError::NotCached(key.to_string()))?;
            let (id, rx) = hub.add(key, current);
            if count == 1 {
                self.gate.resume(key);
                if let Some(period) = period {
                    self.start_refresh_timer(key, period);
                }
            }
            debug!(key = %key, subscriber = id, subscribers = count, "Subscribed");
            (id, rx)
        };
        let handle = Unsubscribe::new(key.clone(), id, self.handle());
        Ok(Subscription::new(key.clone(), rx, handle))
    }

    fn start_refresh_timer(&self, key: &CacheKey, period: Duration) {
        let this = self.this.clone();
        let timer_key = key.clone();
        self.scheduler.start_refresh(key, period, move || {
            let this = this.clone();
            let key = timer_key.clone();
            async move {
                match this.upgrade() {
                    Some(inner) => inner.refresh_tick(&key).await,
                    None => false,
                }
            }
        });
    }

    /// One background refresh: re-read the entry and fetch only if it is stale.
    async fn refresh_tick(&self, key: &CacheKey) -> bool {
        let pending = {
            let mut state = self.lock();
            if state.disposed {
                return false;
            }
            let params = match state.store.peek(key) {
                Some(entry) if entry.subscriber_count > 0 => entry.params.clone(),
                _ => return false,
            };
            state
                .store
                .revisit(key, Instant::now())
                .filter(|lookup| lookup.needs_fetch)
                .map(|_| params)
        };
        if let Some(params) = pending {
            debug!(key = %key, "Background refresh");
            let _ = self.start_fetch(key, params).wait().await;
        }
        true
    }

    fn start_gc_timer(&self, period: Duration) {
        let this = self.this.clone();
        self.scheduler.start_gc(period, move || {
            let this = this.clone();
            async move { this.upgrade().is_some_and(|inner| inner.sweep()) }
        });
    }

    /// Shorten the GC period when `options` keep entries for less time than
    /// the running sweep allows. The period never grows back.
    fn fit_gc_to(&self, options: &QueryOptions) {
        let period = self.config.gc_interval_for(options.cache_time());
        if self.scheduler.gc_period().is_some_and(|current| period < current) {
            debug!(period_ms = period.as_millis() as u64, "Tightening GC period");
            self.start_gc_timer(period);
        }
    }

    fn sweep(&self) -> bool {
        let mut state = self.lock();
        if state.disposed {
            return false;
        }
        let evicted = state.store.evict_expired(Instant::now());
        if !evicted.is_empty() {
            info!(count = evicted.len(), remaining = state.store.len(), "GC evicted cache entries");
        }
        true
    }

    /// Settle a mutation and publish the rebuilt entry.
    ///
    /// A subscribed entry invalidated while mutations were pending skipped
    /// its refresh; the last settlement starts it.
    fn settle_mutation(
        &self,
        pending: PendingMutation,
        outcome: Result<Option<F::Data>, SyncError>,
    ) -> Result<F::Data, SyncError> {
        let key = pending.key().clone();
        let (result, refresh) = {
            let mut state = self.lock();
            let EngineState { store, hub, mutations, .. } = &mut *state;
            let result = match outcome {
                Ok(server) => mutations.confirm(store, pending, server).map(|(data, snapshot)| {
                    hub.publish(&snapshot);
                    data
                }),
                Err(error) => {
                    if let Some(snapshot) = mutations.rollback(store, pending, error.clone()) {
                        hub.publish(&snapshot);
                    }
                    Err(error)
                }
            };
            let refresh = store
                .peek(&key)
                .filter(|entry| {
                    entry.pending_mutations == 0
                        && entry.stale_at.is_none()
                        && entry.subscriber_count > 0
                        && entry.options.enabled
                })
                .map(|entry| entry.params.clone());
            (result, refresh)
        };
        if let Some(params) = refresh {
            debug!(key = %key, "Refreshing entry invalidated during mutation");
            self.start_fetch(&key, params);
        }
        result
    }
}

impl<F: Fetcher> EngineHandle<F::Data> for Inner<F> {
    fn detach(&self, key: &CacheKey, id: SubscriberId) {
        let mut state = self.lock();
        let EngineState { store, hub, .. } = &mut *state;
        hub.remove(key, id);
        let now = Instant::now();
        let remaining = store.set(key, |entry| {
            entry.subscriber_count = entry.subscriber_count.saturating_sub(1);
            entry.touch(now);
            entry.subscriber_count
        });
        debug!(key = %key, subscriber = id, "Unsubscribed");
        if remaining.unwrap_or(0) == 0 {
            self.gate.abandon(key);
            self.scheduler.stop_refresh(key);
        }
    }

    fn refetch(&self, key: CacheKey) -> BoxFuture<'static, Result<F::Data, SyncError>> {
        let this = self.this.upgrade();
        Box::pin(async move {
            match this {
                Some(inner) => inner.force_fetch(&key).await,
                None => Err(SyncError::Disposed),
            }
        })
    }
}

impl<F: Fetcher> SyncEngine<F> {
    /// Build an engine and start its GC timer.
    pub fn create(fetcher: F, config: SyncConfig) -> Self {
        let codec = fetcher.codec();
        let inner = Arc::new_cyclic(|this| Inner {
            this: this.clone(),
            fetcher: Arc::new(fetcher),
            codec,
            config,
            state: Mutex::new(EngineState::new()),
            gate: FetchGate::new(),
            scheduler: Scheduler::new(),
        });

        inner.start_gc_timer(inner.config.gc_interval());
        info!(gc_interval_ms = inner.config.gc_interval().as_millis() as u64, "Sync engine created");
        Self { inner }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    pub fn codec(&self) -> &KeyCodec {
        &self.inner.codec
    }

    pub fn fetcher(&self) -> &F {
        &self.inner.fetcher
    }

    /// Derive the cache key for `params` without touching the cache.
    pub fn key_for(&self, params: &QueryParams) -> Result<CacheKey, SyncError> {
        self.inner.codec.encode(params)
    }

    /// Read `params` with the engine's default options.
    pub async fn query(&self, params: &QueryParams) -> Result<QueryResult<F::Data>, SyncError> {
        self.query_with(params, self.inner.config.defaults).await
    }

    /// Read `params`.
    ///
    /// A cache hit returns at once, stale or not; a stale hit also starts a
    /// background fetch. Only a first load waits for the network. Fetch
    /// failures come back in the state, not as `Err`; `Err` means the params
    /// were invalid or the engine is disposed.
    pub async fn query_with(
        &self,
        params: &QueryParams,
        options: QueryOptions,
    ) -> Result<QueryResult<F::Data>, SyncError> {
        let (key, params) = self.inner.codec.prepare(params)?;
        let lookup = {
            let mut state = self.inner.lock();
            state.ensure_live()?;
            state.store.get(&key, &params, options, Instant::now())
        };
        self.inner.fit_gc_to(&options);

        if !lookup.needs_fetch {
            return Ok(self.result(lookup.state));
        }

        let has_data = lookup.state.data.is_some();
        let flight = self.inner.start_fetch(&key, params);
        if !has_data {
            let _ = flight.wait().await;
        }
        let state = match self.inner.current(&key) {
            Ok(state) => state,
            Err(SyncError::NotCached(_)) => lookup.state,
            Err(e) => return Err(e),
        };
        Ok(self.result(state))
    }

    fn result(&self, state: QueryState<F::Data>) -> QueryResult<F::Data> {
        QueryResult {
            refetch: Refetch {
                key: state.key.clone(),
                engine: self.inner.handle(),
            },
            state,
        }
    }

    /// Warm the cache for `params` without subscribing.
    pub async fn prefetch(&self, params: &QueryParams) -> Result<(), SyncError> {
        let (key, params) = self.inner.codec.prepare(params)?;
        let lookup = {
            let mut state = self.inner.lock();
            state.ensure_live()?;
            state
                .store
                .get(&key, &params, self.inner.config.defaults, Instant::now())
        };
        if lookup.needs_fetch {
            debug!(key = %key, "Prefetching");
            let _ = self.inner.start_fetch(&key, params).wait().await;
        }
        Ok(())
    }

    /// Force a fetch for `key` regardless of staleness.
    pub async fn refetch(&self, key: &CacheKey) -> Result<F::Data, SyncError> {
        self.inner.force_fetch(key).await
    }

    /// Current state of `key` without touching it.
    pub fn peek(&self, key: &CacheKey) -> Option<QueryState<F::Data>> {
        self.inner.current(key).ok()
    }

    /// Attach to an existing entry. The current state is the first delivery.
    pub fn subscribe(&self, key: &CacheKey) -> Result<Subscription<F::Data>, SyncError> {
        self.inner.subscribe(key)
    }

    /// Bind `on_change` to `params`: subscribe, fetch if needed, and forward
    /// every transition until the returned observer is detached.
    pub fn observe<C>(
        &self,
        params: &QueryParams,
        options: QueryOptions,
        on_change: C,
    ) -> Result<Observer<F::Data>, SyncError>
    where
        C: Fn(QueryState<F::Data>) + Send + 'static,
    {
        let (key, params) = self.inner.codec.prepare(params)?;
        let lookup = {
            let mut state = self.inner.lock();
            state.ensure_live()?;
            state.store.get(&key, &params, options, Instant::now())
        };
        self.inner.fit_gc_to(&options);
        let mut subscription = self.inner.subscribe(&key)?;
        let handle = subscription.handle();
        if lookup.needs_fetch {
            self.inner.start_fetch(&key, params);
        }
        tokio::spawn(async move {
            while let Some(state) = subscription.recv().await {
                on_change(state);
            }
        });
        Ok(Observer { key, handle })
    }

    /// Mark matching entries stale. Subscribed ones refresh right away.
    ///
    /// Any fetch in flight for a matched key is superseded: it still settles
    /// for whoever awaits it but can no longer write to the cache.
    pub fn invalidate(&self, filter: KeyFilter<'_>) -> usize {
        let (matched, refresh) = {
            let mut state = self.inner.lock();
            if state.disposed {
                return 0;
            }
            let keys = state.store.invalidate(&filter);
            let mut refresh = Vec::new();
            for key in &keys {
                let superseded = self.inner.gate.supersede(key).is_some();
                if let Some(entry) = state.store.peek(key) {
                    let wanted = entry.subscriber_count > 0 || superseded;
                    if wanted && entry.options.enabled && entry.pending_mutations == 0 {
                        refresh.push((key.clone(), entry.params.clone()));
                    }
                }
            }
            (keys.len(), refresh)
        };
        info!(matched, refreshing = refresh.len(), "Invalidated cache entries");
        for (key, params) in refresh {
            self.inner.start_fetch(&key, params);
        }
        matched
    }

    /// Apply `patch` optimistically, then settle with `remote`'s outcome.
    ///
    /// `remote` returning `Ok(None)` keeps the optimistic data. On failure only
    /// this mutation's patch is undone: the entry is rebuilt from the last
    /// confirmed data plus any other mutation still pending on the key, and
    /// the error is returned. `patch` may run again during those rebuilds.
    /// The mutation settles even if the returned future is dropped.
    pub async fn mutate<P, R>(&self, key: &CacheKey, patch: P, remote: R) -> Result<F::Data, SyncError>
    where
        P: Fn(&mut F::Data) + Send + 'static,
        R: Future<Output = Result<Option<F::Data>, SyncError>> + Send + 'static,
    {
        let pending = {
            let mut state = self.inner.lock();
            state.ensure_live()?;
            let EngineState { store, hub, mutations, .. } = &mut *state;
            let (pending, snapshot) = mutations.begin(store, key, patch)?;
            hub.publish(&snapshot);
            pending
        };

        let inner = Arc::clone(&self.inner);
        let settle = tokio::spawn(async move {
            let outcome = remote.await;
            inner.settle_mutation(pending, outcome)
        });
        match settle.await {
            Ok(result) => result,
            Err(e) => {
                warn!(key = %key, error = %e, "Mutation task did not complete");
                Err(SyncError::Cancelled)
            }
        }
    }

    /// Debounced free-text search over `base`, writing into param `field`.
    pub fn debouncer(&self, base: QueryParams, field: impl Into<String>) -> SearchDebouncer<F> {
        SearchDebouncer::new(self.clone(), base, field.into(), self.inner.config.search_debounce())
    }

    pub fn stats(&self) -> EngineStats {
        let state = self.inner.lock();
        EngineStats {
            entries: state.store.len(),
            in_flight: self.inner.gate.len(),
            subscribers: state.store.subscriber_total(),
            refresh_timers: self.inner.scheduler.refresh_count(),
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.lock().disposed
    }

    /// Stop timers, abort in-flight fetches, close every subscription and
    /// drop the cache. Later calls fail with `SyncError::Disposed`.
    pub fn dispose(&self) {
        {
            let mut state = self.inner.lock();
            if state.disposed {
                return;
            }
            state.disposed = true;
            state.hub.clear();
            state.store.clear();
            state.mutations.clear();
        }
        self.inner.scheduler.shutdown();
        self.inner.gate.abort_all();
        info!("Sync engine disposed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counter {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Fetcher for Counter {
        type Data = usize;

        async fn fetch(&self, _params: &QueryParams) -> Result<usize, SyncError> {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok(self.calls.fetch_add(1, Ordering::SeqCst) + 1)
        }
    }

    fn engine() -> SyncEngine<Counter> {
        SyncEngine::create(Counter { calls: AtomicUsize::new(0) }, SyncConfig::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_query_waits_for_data() {
        let engine = engine();
        let result = engine.query(&QueryParams::new("n")).await.unwrap();
        assert_eq!(result.data(), Some(&1));
        assert_eq!(result.status(), QueryStatus::Success);
        assert!(!result.state().is_fetching);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refetch_handle_forces_fetch() {
        let engine = SyncEngine::create(
            Counter { calls: AtomicUsize::new(0) },
            SyncConfig {
                defaults: QueryOptions::default().with_stale_time(Duration::from_secs(60)),
                ..SyncConfig::default()
            },
        );
        let params = QueryParams::new("n");
        let result = engine.query(&params).await.unwrap();
        assert_eq!(result.refetch().await, Ok(2));

        // Fresh data: no fetch on revisit
        let again = engine.query(&params).await.unwrap();
        assert_eq!(again.data(), Some(&2));
        assert_eq!(engine.fetcher().calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disposed_engine_rejects_calls() {
        let engine = engine();
        let params = QueryParams::new("n");
        let result = engine.query(&params).await.unwrap();
        engine.dispose();
        engine.dispose();

        assert!(engine.is_disposed());
        assert_eq!(engine.query(&params).await.err(), Some(SyncError::Disposed));
        assert_eq!(result.refetch().await, Err(SyncError::Disposed));
        assert_eq!(engine.stats(), EngineStats::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_params_fail_before_fetching() {
        let engine = engine();
        let err = engine.query(&QueryParams::new("bad scope")).await.err();
        assert!(matches!(err, Some(SyncError::Validation(_))));
        assert_eq!(engine.fetcher().calls.load(Ordering::SeqCst), 0);
    }
}
