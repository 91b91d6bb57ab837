//! Newsync core - client-side data sync for the news article service.
//!
//! This crate keeps a local cache of article listings in step with the
//! remote service: cache hits are served immediately (stale-while-revalidate),
//! concurrent requests for the same listing share one network call,
//! bookmarks are applied optimistically and rolled back on failure, and idle
//! entries are garbage-collected.
//!
//! `ArticleFeed` is the entry point for the article service; `SyncEngine` is
//! the generic engine underneath it.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod feed;
pub mod models;
pub mod sync;
pub mod utils;

pub use api::{ApiClient, ApiError, ArticleFilters, ArticleSource};
pub use cache::{CacheKey, KeyCodec, KeyFilter, QueryParams, QueryState, QueryStatus};
pub use config::{QueryOptions, SyncConfig};
pub use error::SyncError;
pub use feed::ArticleFeed;
pub use models::{Article, ArticlePage};
pub use sync::{EngineStats, Fetcher, Observer, QueryResult, Subscription, SyncEngine};
