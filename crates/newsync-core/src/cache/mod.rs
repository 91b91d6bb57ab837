//! In-memory query cache.
//!
//! This module provides the building blocks the sync engine coordinates:
//!
//! - `KeyCodec` / `CacheKey`: canonical keys derived from query parameters
//! - `CacheEntry` / `QueryState`: per-key state and the snapshot observers see
//! - `CacheStore`: the key → entry map with staleness and expiry bookkeeping
//!
//! Nothing here is persisted; entries live until the GC sweep evicts them.

pub mod entry;
pub mod key;
pub mod store;

pub use entry::{CacheEntry, QueryState, QueryStatus, RequestId};
pub use key::{CacheKey, KeyCodec, ParamRule, ParamValue, QueryParams};
pub use store::{CacheStore, KeyFilter, Lookup};
