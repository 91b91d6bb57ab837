//! Request coalescing.
//!
//! `FetchGate` keeps at most one tracked network operation per key. The first
//! caller for a key becomes the leader: its fetch future is spawned and every
//! later caller joins it through a watch channel, receiving the same outcome.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tokio::task::AbortHandle;
use tracing::debug;

use crate::cache::{CacheKey, RequestId};
use crate::error::SyncError;

type Outcome<T> = Option<Result<T, SyncError>>;

struct InFlight<T> {
    id: RequestId,
    rx: watch::Receiver<Outcome<T>>,
    abort: Option<AbortHandle>,
    /// Every observer detached; the result still lands in the cache silently.
    abandoned: bool,
}

type InFlightMap<T> = Arc<Mutex<HashMap<CacheKey, InFlight<T>>>>;

fn lock_map<T>(map: &Mutex<HashMap<CacheKey, InFlight<T>>>) -> MutexGuard<'_, HashMap<CacheKey, InFlight<T>>> {
    map.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Cleans up the in-flight record even if the fetch task is aborted.
///
/// On drop without `complete`, joiners receive `SyncError::Cancelled`.
struct InFlightGuard<T> {
    key: CacheKey,
    id: RequestId,
    in_flight: InFlightMap<T>,
    tx: Option<watch::Sender<Outcome<T>>>,
}

impl<T> InFlightGuard<T> {
    fn complete(mut self, result: Result<T, SyncError>) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(Some(result));
        }
    }
}

impl<T> Drop for InFlightGuard<T> {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(Some(Err(SyncError::Cancelled)));
        }
        let mut map = lock_map(&self.in_flight);
        // A superseded record may already have been replaced by a newer fetch
        if map.get(&self.key).is_some_and(|f| f.id == self.id) {
            map.remove(&self.key);
        }
    }
}

/// Handle on a (possibly shared) fetch.
pub struct Flight<T> {
    id: RequestId,
    joined: bool,
    rx: watch::Receiver<Outcome<T>>,
}

impl<T: Clone> Flight<T> {
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// `true` if this handle joined a fetch someone else started.
    pub fn joined(&self) -> bool {
        self.joined
    }

    /// Wait for the fetch to settle.
    pub async fn wait(mut self) -> Result<T, SyncError> {
        loop {
            if let Some(result) = self.rx.borrow_and_update().as_ref() {
                return result.clone();
            }
            if self.rx.changed().await.is_err() {
                return Err(SyncError::Cancelled);
            }
        }
    }
}

pub struct FetchGate<T> {
    in_flight: InFlightMap<T>,
    next_id: AtomicU64,
}

impl<T> Default for FetchGate<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> FetchGate<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
        }
    }

    /// Join the in-flight fetch for `key`, or start one with `fetcher`.
    ///
    /// `fetcher` is called at most once, synchronously, only when a new fetch
    /// starts; the future it returns runs on its own task so the fetch
    /// outlives any individual caller.
    pub fn run<F, Fut>(&self, key: &CacheKey, fetcher: F) -> Flight<T>
    where
        F: FnOnce(RequestId) -> Fut,
        Fut: Future<Output = Result<T, SyncError>> + Send + 'static,
    {
        let (id, tx, rx) = {
            let mut map = lock_map(&self.in_flight);
            if let Some(existing) = map.get(key) {
                debug!(key = %key, request_id = existing.id, "Joining in-flight fetch");
                return Flight {
                    id: existing.id,
                    joined: true,
                    rx: existing.rx.clone(),
                };
            }
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            let (tx, rx) = watch::channel(None);
            map.insert(
                key.clone(),
                InFlight {
                    id,
                    rx: rx.clone(),
                    abort: None,
                    abandoned: false,
                },
            );
            (id, tx, rx)
        };

        debug!(key = %key, request_id = id, "Starting fetch");
        let guard = InFlightGuard {
            key: key.clone(),
            id,
            in_flight: Arc::clone(&self.in_flight),
            tx: Some(tx),
        };
        let fut = fetcher(id);
        let handle = tokio::spawn(async move {
            let result = fut.await;
            guard.complete(result);
        });

        if let Some(record) = lock_map(&self.in_flight).get_mut(key) {
            if record.id == id {
                record.abort = Some(handle.abort_handle());
            }
        }

        Flight {
            id,
            joined: false,
            rx,
        }
    }

    pub fn in_flight(&self, key: &CacheKey) -> Option<RequestId> {
        lock_map(&self.in_flight).get(key).map(|f| f.id)
    }

    pub fn len(&self) -> usize {
        lock_map(&self.in_flight).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Mark the fetch for `key` as unobserved.
    pub fn abandon(&self, key: &CacheKey) {
        if let Some(record) = lock_map(&self.in_flight).get_mut(key) {
            debug!(key = %key, request_id = record.id, "Abandoning in-flight fetch");
            record.abandoned = true;
        }
    }

    /// An observer re-attached before the fetch settled.
    pub fn resume(&self, key: &CacheKey) {
        if let Some(record) = lock_map(&self.in_flight).get_mut(key) {
            record.abandoned = false;
        }
    }

    pub fn is_abandoned(&self, key: &CacheKey, id: RequestId) -> bool {
        lock_map(&self.in_flight)
            .get(key)
            .is_some_and(|f| f.id == id && f.abandoned)
    }

    /// Stop tracking the fetch for `key` without cancelling it.
    ///
    /// Its current joiners still receive its outcome, but the next `run` for
    /// the key starts a fresh fetch.
    pub fn supersede(&self, key: &CacheKey) -> Option<RequestId> {
        let removed = lock_map(&self.in_flight).remove(key).map(|f| f.id);
        if let Some(id) = removed {
            debug!(key = %key, request_id = id, "Superseded in-flight fetch");
        }
        removed
    }

    /// Abort every tracked fetch. Joiners receive `SyncError::Cancelled`.
    pub fn abort_all(&self) {
        let handles: Vec<AbortHandle> = lock_map(&self.in_flight)
            .values_mut()
            .filter_map(|f| f.abort.take())
            .collect();
        for handle in handles {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{KeyCodec, QueryParams};
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn key(name: &str) -> CacheKey {
        KeyCodec::new()
            .encode(&QueryParams::new("test").with("name", name))
            .expect("params should encode")
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_runs_share_one_fetch() {
        let gate: FetchGate<u32> = FetchGate::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let k = key("a");

        let flights: Vec<Flight<u32>> = (0..5)
            .map(|_| {
                let calls = Arc::clone(&calls);
                gate.run(&k, move |_| async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Ok(42)
                })
            })
            .collect();

        assert_eq!(flights.iter().filter(|f| f.joined()).count(), 4);
        let results = futures::future::join_all(flights.into_iter().map(Flight::wait)).await;
        assert!(results.iter().all(|r| r == &Ok(42)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Settled records are cleared; the next run starts a new fetch
        tokio::task::yield_now().await;
        assert!(gate.is_empty());
        let again = gate.run(&k, |_| async { Ok(7) });
        assert!(!again.joined());
        assert_eq!(again.wait().await, Ok(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_errors_reach_every_joiner() {
        let gate: FetchGate<u32> = FetchGate::new();
        let k = key("b");
        let first = gate.run(&k, |_| async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Err(SyncError::Server { status: 500, message: "boom".into() })
        });
        let second = gate.run(&k, |_| async { Ok(1) });
        assert!(second.joined());
        let expected = Err(SyncError::Server { status: 500, message: "boom".into() });
        assert_eq!(first.wait().await, expected);
        assert_eq!(second.wait().await, expected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_supersede_lets_a_new_fetch_start() {
        let gate: FetchGate<&'static str> = FetchGate::new();
        let k = key("c");
        let old = gate.run(&k, |_| async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok("old")
        });
        assert_eq!(gate.supersede(&k), Some(old.id()));

        let new = gate.run(&k, |_| async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok("new")
        });
        assert!(!new.joined());
        assert_ne!(new.id(), old.id());
        assert_eq!(new.wait().await, Ok("new"));
        assert_eq!(old.wait().await, Ok("old"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandon_and_resume() {
        let gate: FetchGate<u32> = FetchGate::new();
        let k = key("d");
        let flight = gate.run(&k, |_| async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok(1)
        });
        let id = flight.id();
        gate.abandon(&k);
        assert!(gate.is_abandoned(&k, id));
        gate.resume(&k);
        assert!(!gate.is_abandoned(&k, id));
        assert_eq!(flight.wait().await, Ok(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_abort_all_cancels_joiners() {
        let gate: FetchGate<u32> = FetchGate::new();
        let k = key("e");
        let flight = gate.run(&k, |_| async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(1)
        });
        tokio::task::yield_now().await;
        gate.abort_all();
        assert_eq!(flight.wait().await, Err(SyncError::Cancelled));
        assert!(gate.in_flight(&k).is_none());
    }
}
