//! Engine timers.
//!
//! Three kinds of timer run on the tokio clock:
//!
//! - a background refresh loop per subscribed key
//! - one GC sweep loop per engine
//! - debounce timers for free-text search (`Debouncer`)
//!
//! Each loop awaits its own tick before sleeping again, so ticks for the same
//! key never overlap.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::debug;

use crate::cache::CacheKey;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Spawn a loop that calls `tick` every `period` until it returns `false`.
///
/// The first tick fires one full period after the start.
fn spawn_loop<F, Fut>(period: Duration, mut tick: F) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = bool> + Send + 'static,
{
    tokio::spawn(async move {
        let mut interval = interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            if !tick().await {
                break;
            }
        }
    })
}

#[derive(Default)]
pub struct Scheduler {
    refresh: Mutex<HashMap<CacheKey, JoinHandle<()>>>,
    gc: Mutex<Option<(Duration, JoinHandle<()>)>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start (or restart) the background refresh loop for `key`.
    ///
    /// `tick` returns `false` once the key no longer needs refreshing.
    pub fn start_refresh<F, Fut>(&self, key: &CacheKey, period: Duration, tick: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        debug!(key = %key, period_ms = period.as_millis() as u64, "Starting refresh timer");
        let handle = spawn_loop(period, tick);
        if let Some(previous) = lock(&self.refresh).insert(key.clone(), handle) {
            previous.abort();
        }
    }

    pub fn stop_refresh(&self, key: &CacheKey) -> bool {
        match lock(&self.refresh).remove(key) {
            Some(handle) => {
                debug!(key = %key, "Stopping refresh timer");
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Refresh loops that are still running.
    pub fn refresh_count(&self) -> usize {
        let mut refresh = lock(&self.refresh);
        refresh.retain(|_, handle| !handle.is_finished());
        refresh.len()
    }

    pub fn start_gc<F, Fut>(&self, period: Duration, tick: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        debug!(period_ms = period.as_millis() as u64, "Starting GC timer");
        let handle = spawn_loop(period, tick);
        if let Some((_, previous)) = lock(&self.gc).replace((period, handle)) {
            previous.abort();
        }
    }

    /// Period of the running GC loop.
    pub fn gc_period(&self) -> Option<Duration> {
        lock(&self.gc)
            .as_ref()
            .filter(|(_, handle)| !handle.is_finished())
            .map(|(period, _)| *period)
    }

    /// Abort every timer.
    pub fn shutdown(&self) {
        for (_, handle) in lock(&self.refresh).drain() {
            handle.abort();
        }
        if let Some((_, handle)) = lock(&self.gc).take() {
            handle.abort();
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Restartable one-shot timer.
///
/// Scheduling a new action cancels the one still waiting, so only the last
/// action of a burst ever runs.
pub struct Debouncer {
    delay: Duration,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: Mutex::new(None),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Run `action` once `delay` passes without another `schedule` call.
    pub fn schedule<Fut>(&self, action: Fut)
    where
        Fut: Future<Output = ()> + Send + 'static,
    {
        let delay = self.delay;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            action.await;
        });
        if let Some(previous) = lock(&self.pending).replace(handle) {
            previous.abort();
        }
    }

    pub fn cancel(&self) {
        if let Some(handle) = lock(&self.pending).take() {
            handle.abort();
        }
    }

    /// A scheduled action has not finished yet.
    pub fn is_pending(&self) -> bool {
        lock(&self.pending)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}
