//! Fetch coordination and the engine that ties the cache together.
//!
//! - `FetchGate`: one network operation per key, shared by every caller
//! - `Scheduler` / `Debouncer`: refresh, GC and search timers
//! - `MutationCoordinator`: optimistic apply, then confirm or roll back
//! - `SubscriptionHub`: ordered per-key notifications
//! - `SyncEngine`: the public surface (`query`, `mutate`, `invalidate`, `prefetch`)

pub mod engine;
pub mod fetcher;
pub mod gate;
pub mod hub;
pub mod mutation;
pub mod scheduler;
pub mod search;

pub use engine::{EngineStats, Observer, QueryResult, Refetch, SyncEngine};
pub use fetcher::{ArticleFetcher, Catalog, CatalogFetcher, Fetcher, CATALOG_SCOPE};
pub use gate::{FetchGate, Flight};
pub use hub::{SubscriberId, Subscription, SubscriptionHub, Unsubscribe};
pub use mutation::{MutationCoordinator, PendingMutation};
pub use scheduler::{Debouncer, Scheduler};
pub use search::SearchDebouncer;
