//! The fetch contract of the remote article service.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::cache::{KeyCodec, ParamRule, QueryParams};
use crate::error::SyncError;
use crate::models::{
    Article, ArticlePage, ArticleStats, BookmarkResponse, HealthStatus, RefreshResponse,
};

/// Scope under which article listings are cached.
pub const ARTICLES_SCOPE: &str = "articles";

/// Largest page size the service serves.
pub const MAX_PER_PAGE: u32 = 100;

/// Highest page number accepted before a request is considered malformed.
const MAX_PAGE: u32 = 10_000;

/// Longest accepted free-text search.
const MAX_SEARCH_LENGTH: usize = 200;

/// Filters for an article listing. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleFilters {
    pub category: Option<String>,
    pub source: Option<String>,
    pub min_credibility: Option<f64>,
    pub search: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl ArticleFilters {
    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn min_credibility(mut self, min: f64) -> Self {
        self.min_credibility = Some(min);
        self
    }

    pub fn search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    pub fn page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    pub fn per_page(mut self, per_page: u32) -> Self {
        self.per_page = Some(per_page);
        self
    }

    pub fn to_params(&self) -> QueryParams {
        QueryParams::new(ARTICLES_SCOPE)
            .with("category", self.category.clone())
            .with("source", self.source.clone())
            .with("minCredibility", self.min_credibility)
            .with("search", self.search.clone())
            .with("page", self.page)
            .with("perPage", self.per_page)
    }

    /// Inverse of `to_params` for params that passed `codec()`.
    pub fn from_params(params: &QueryParams) -> Self {
        Self {
            category: params.text("category").map(str::to_string),
            source: params.text("source").map(str::to_string),
            min_credibility: params.float("minCredibility"),
            search: params.text("search").map(str::to_string),
            page: params.uint("page"),
            per_page: params.uint("perPage"),
        }
    }

    /// Key codec with the listing's input rules.
    pub fn codec() -> KeyCodec {
        KeyCodec::new()
            .with_rule("minCredibility", ParamRule::UnitInterval)
            .with_rule("page", ParamRule::PositiveInt { max: MAX_PAGE })
            .with_rule("perPage", ParamRule::PositiveInt { max: MAX_PER_PAGE })
            .with_rule("search", ParamRule::MaxLength(MAX_SEARCH_LENGTH))
    }
}

/// The remote article service as seen by the client.
///
/// Implementations map transport failures to `SyncError::Network` and non-2xx
/// responses to `SyncError::Server`.
#[async_trait]
pub trait ArticleSource: Send + Sync + 'static {
    async fn list_articles(&self, filters: &ArticleFilters) -> Result<ArticlePage, SyncError>;

    async fn list_categories(&self) -> Result<Vec<String>, SyncError>;

    async fn list_sources(&self) -> Result<Vec<String>, SyncError>;

    async fn toggle_bookmark(&self, article_id: &str) -> Result<BookmarkResponse, SyncError>;

    async fn trigger_refresh(&self) -> Result<RefreshResponse, SyncError>;

    async fn get_article(&self, article_id: &str) -> Result<Article, SyncError>;

    async fn stats(&self) -> Result<ArticleStats, SyncError>;

    async fn health(&self) -> Result<HealthStatus, SyncError>;
}
