//! Optimistic mutations.
//!
//! A mutation is a two-phase protocol on one cache entry: `begin` applies the
//! local patch, then exactly one of `confirm` or `rollback` settles it.
//!
//! Several mutations may overlap on the same key. The coordinator keeps, per
//! key, the last confirmed data and the patches still awaiting the server.
//! Every settlement rebuilds the entry as that base with the remaining
//! patches replayed in order, so a rollback only ever removes its own patch.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::cache::{CacheKey, CacheStore, QueryState, QueryStatus};
use crate::error::SyncError;

type Patch<T> = Box<dyn Fn(&mut T) + Send>;

/// Confirmed data for one key plus the patches still in flight on top of it.
struct Ledger<T> {
    base: T,
    pending: Vec<(u64, Patch<T>)>,
}

impl<T: Clone> Ledger<T> {
    fn take(&mut self, id: u64) -> Option<Patch<T>> {
        let index = self.pending.iter().position(|(pending, _)| *pending == id)?;
        Some(self.pending.remove(index).1)
    }

    fn replay(&self) -> T {
        let mut data = self.base.clone();
        for (_, patch) in &self.pending {
            patch(&mut data);
        }
        data
    }
}

/// A mutation between `begin` and its settlement.
#[derive(Debug)]
pub struct PendingMutation {
    id: u64,
    key: CacheKey,
}

impl PendingMutation {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn key(&self) -> &CacheKey {
        &self.key
    }
}

pub struct MutationCoordinator<T> {
    next_id: u64,
    ledgers: HashMap<CacheKey, Ledger<T>>,
}

impl<T: Clone> Default for MutationCoordinator<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> MutationCoordinator<T> {
    pub fn new() -> Self {
        Self {
            next_id: 0,
            ledgers: HashMap::new(),
        }
    }

    /// Mutations still awaiting settlement on `key`.
    pub fn pending_on(&self, key: &CacheKey) -> usize {
        self.ledgers.get(key).map_or(0, |ledger| ledger.pending.len())
    }

    /// Apply `patch` to the entry's data and mark it loading.
    ///
    /// `patch` is kept until settlement and re-run whenever the entry is
    /// rebuilt, so it must depend only on what it captures.
    /// Fails with `NotCached` when the key has no data to patch.
    pub fn begin<P>(
        &mut self,
        store: &mut CacheStore<T>,
        key: &CacheKey,
        patch: P,
    ) -> Result<(PendingMutation, QueryState<T>), SyncError>
    where
        P: Fn(&mut T) + Send + 'static,
    {
        let id = self.next_id + 1;
        let ledgers = &mut self.ledgers;
        let state = store
            .set(key, |entry| {
                let data = entry.data.as_mut()?;
                let ledger = ledgers.entry(key.clone()).or_insert_with(|| Ledger {
                    base: data.clone(),
                    pending: Vec::new(),
                });
                patch(data);
                ledger.pending.push((id, Box::new(patch)));
                entry.status = QueryStatus::Loading;
                entry.pending_mutations += 1;
                entry.version += 1;
                Some(entry.snapshot(key))
            })
            .flatten()
            .ok_or_else(|| SyncError::NotCached(key.to_string()))?;

        self.next_id = id;
        debug!(key = %key, mutation = id, pending = self.pending_on(key), "Applied optimistic mutation");
        Ok((PendingMutation { id, key: key.clone() }, state))
    }

    /// Settle successfully.
    ///
    /// `server` becomes the new confirmed data when present; otherwise the
    /// mutation's own patch is folded into it. Patches still pending are
    /// replayed on top. Returns the rebuilt data and the state to publish.
    pub fn confirm(
        &mut self,
        store: &mut CacheStore<T>,
        pending: PendingMutation,
        server: Option<T>,
    ) -> Result<(T, QueryState<T>), SyncError> {
        let PendingMutation { id, key } = pending;
        let rebuilt = match self.ledgers.get_mut(&key) {
            Some(ledger) => {
                let patch = ledger.take(id);
                match (server, patch) {
                    (Some(data), _) => ledger.base = data,
                    (None, Some(patch)) => patch(&mut ledger.base),
                    (None, None) => {}
                }
                Some(ledger.replay())
            }
            None => server,
        };
        let others = self.release(&key);

        let settled = store.set(&key, |entry| {
            if let Some(data) = rebuilt {
                entry.data = Some(data);
            }
            entry.status = if others { QueryStatus::Loading } else { QueryStatus::Success };
            entry.error = None;
            entry.pending_mutations = entry.pending_mutations.saturating_sub(1);
            entry.version += 1;
            entry.data.clone().map(|data| (data, entry.snapshot(&key)))
        });
        debug!(key = %key, mutation = id, "Confirmed mutation");
        settled
            .flatten()
            .ok_or_else(|| SyncError::NotCached(key.to_string()))
    }

    /// Settle with a failure: drop this mutation's patch, rebuild the entry
    /// from the rest, and surface `error`.
    pub fn rollback(
        &mut self,
        store: &mut CacheStore<T>,
        pending: PendingMutation,
        error: SyncError,
    ) -> Option<QueryState<T>> {
        let PendingMutation { id, key } = pending;
        warn!(key = %key, mutation = id, error = %error, "Mutation failed, rolling back");
        let rebuilt = self.ledgers.get_mut(&key).map(|ledger| {
            ledger.take(id);
            ledger.replay()
        });
        self.release(&key);

        store.set(&key, |entry| {
            if let Some(data) = rebuilt {
                entry.data = Some(data);
            }
            entry.status = QueryStatus::Error;
            entry.error = Some(error);
            entry.pending_mutations = entry.pending_mutations.saturating_sub(1);
            entry.version += 1;
            entry.snapshot(&key)
        })
    }

    /// Forget every ledger.
    pub fn clear(&mut self) {
        self.ledgers.clear();
    }

    /// Drop the ledger for `key` once nothing is pending. Returns whether
    /// other mutations remain.
    fn release(&mut self, key: &CacheKey) -> bool {
        if self.pending_on(key) > 0 {
            return true;
        }
        self.ledgers.remove(key);
        false
    }
}
