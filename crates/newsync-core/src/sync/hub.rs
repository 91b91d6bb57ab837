//! Fan-out of entry-state transitions to observers.
//!
//! Each subscriber owns an unbounded channel. The engine publishes while it
//! holds its state lock, so every subscriber of a key sees that key's
//! transitions in the order they happened, and none is skipped.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use futures::future::BoxFuture;
use tokio::sync::mpsc;
use tracing::debug;

use crate::cache::{CacheKey, QueryState};
use crate::error::SyncError;

pub type SubscriberId = u64;

/// The slice of the engine that handles outside the lock call back into.
pub(crate) trait EngineHandle<T>: Send + Sync {
    fn detach(&self, key: &CacheKey, id: SubscriberId);

    fn refetch(&self, key: CacheKey) -> BoxFuture<'static, Result<T, SyncError>>;
}

pub struct SubscriptionHub<T> {
    listeners: HashMap<CacheKey, Vec<(SubscriberId, mpsc::UnboundedSender<QueryState<T>>)>>,
    next_id: SubscriberId,
}

impl<T: Clone> Default for SubscriptionHub<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> SubscriptionHub<T> {
    pub fn new() -> Self {
        Self {
            listeners: HashMap::new(),
            next_id: 1,
        }
    }

    /// Register a listener. `current` is delivered first so there is no gap
    /// between attaching and the next transition.
    pub fn add(
        &mut self,
        key: &CacheKey,
        current: QueryState<T>,
    ) -> (SubscriberId, mpsc::UnboundedReceiver<QueryState<T>>) {
        let id = self.next_id;
        self.next_id += 1;
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(current);
        self.listeners.entry(key.clone()).or_default().push((id, tx));
        (id, rx)
    }

    /// Remove a listener. Returns `false` if it was already gone.
    pub fn remove(&mut self, key: &CacheKey, id: SubscriberId) -> bool {
        let Some(list) = self.listeners.get_mut(key) else {
            return false;
        };
        let before = list.len();
        list.retain(|(sid, _)| *sid != id);
        let removed = list.len() != before;
        if list.is_empty() {
            self.listeners.remove(key);
        }
        removed
    }

    /// Deliver `state` to every listener of its key. Returns the delivery count.
    pub fn publish(&mut self, state: &QueryState<T>) -> usize {
        let Some(list) = self.listeners.get_mut(&state.key) else {
            return 0;
        };
        list.retain(|(id, tx)| {
            let open = tx.send(state.clone()).is_ok();
            if !open {
                debug!(key = %state.key, subscriber = id, "Dropping closed subscriber channel");
            }
            open
        });
        list.len()
    }

    pub fn listener_count(&self, key: &CacheKey) -> usize {
        self.listeners.get(key).map_or(0, Vec::len)
    }

    /// Drop every listener; their receivers see the channel close.
    pub fn clear(&mut self) {
        self.listeners.clear();
    }
}

/// Cloneable detach handle for a subscription.
///
/// Detaching is idempotent: only the first call decrements the key's
/// subscriber count.
pub struct Unsubscribe<T> {
    inner: Arc<UnsubscribeInner<T>>,
}

impl<T> Clone for Unsubscribe<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct UnsubscribeInner<T> {
    key: CacheKey,
    id: SubscriberId,
    engine: Weak<dyn EngineHandle<T>>,
    detached: AtomicBool,
}

impl<T> Unsubscribe<T> {
    pub(crate) fn new(key: CacheKey, id: SubscriberId, engine: Weak<dyn EngineHandle<T>>) -> Self {
        Self {
            inner: Arc::new(UnsubscribeInner {
                key,
                id,
                engine,
                detached: AtomicBool::new(false),
            }),
        }
    }

    pub fn unsubscribe(&self) {
        if self.inner.detached.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(engine) = self.inner.engine.upgrade() {
            engine.detach(&self.inner.key, self.inner.id);
        }
    }

    pub fn is_detached(&self) -> bool {
        self.inner.detached.load(Ordering::SeqCst)
    }
}

/// An attached observer of one key. Detaches on drop.
pub struct Subscription<T> {
    key: CacheKey,
    rx: mpsc::UnboundedReceiver<QueryState<T>>,
    handle: Unsubscribe<T>,
}

impl<T> Subscription<T> {
    pub(crate) fn new(
        key: CacheKey,
        rx: mpsc::UnboundedReceiver<QueryState<T>>,
        handle: Unsubscribe<T>,
    ) -> Self {
        Self { key, rx, handle }
    }

    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// Next transition, or `None` once detached or the engine is disposed.
    pub async fn recv(&mut self) -> Option<QueryState<T>> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<QueryState<T>> {
        self.rx.try_recv().ok()
    }

    /// Drain every transition delivered so far.
    pub fn drain(&mut self) -> Vec<QueryState<T>> {
        let mut states = Vec::new();
        while let Ok(state) = self.rx.try_recv() {
            states.push(state);
        }
        states
    }

    pub fn unsubscribe(&self) {
        self.handle.unsubscribe();
    }

    pub fn handle(&self) -> Unsubscribe<T> {
        self.handle.clone()
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.handle.unsubscribe();
    }
}
