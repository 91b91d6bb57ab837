//! Article feed: the engine configured for the article service.
//!
//! `ArticleFeed` runs two engines over one `ArticleSource`: paginated
//! listings keyed by their filters, and the category and source catalogs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::api::source::ARTICLES_SCOPE;
use crate::api::{ArticleFilters, ArticleSource};
use crate::cache::{CacheKey, KeyFilter, QueryState};
use crate::config::{QueryOptions, SyncConfig};
use crate::error::SyncError;
use crate::models::{Article, ArticlePage, ArticleStats, HealthStatus, RefreshResponse};
use crate::sync::{
    ArticleFetcher, Catalog, CatalogFetcher, Observer, QueryResult, SearchDebouncer, SyncEngine,
};

// ============================================================================
// Constants
// ============================================================================

/// Catalog lists stay fresh for 5 minutes.
/// Categories and sources change only when the service ingests new feeds.
const CATALOG_STALE_TIME: Duration = Duration::from_secs(5 * 60);

pub struct ArticleFeed<S: ArticleSource> {
    source: Arc<S>,
    articles: SyncEngine<ArticleFetcher<S>>,
    catalog: SyncEngine<CatalogFetcher<S>>,
}

impl<S: ArticleSource> ArticleFeed<S> {
    pub fn new(source: S, config: SyncConfig) -> Self {
        Self::with_source(Arc::new(source), config)
    }

    pub fn with_source(source: Arc<S>, config: SyncConfig) -> Self {
        let mut catalog_config = config.clone();
        catalog_config.defaults = catalog_config.defaults.with_stale_time(CATALOG_STALE_TIME);
        Self {
            articles: SyncEngine::create(ArticleFetcher::new(Arc::clone(&source)), config),
            catalog: SyncEngine::create(CatalogFetcher::new(Arc::clone(&source)), catalog_config),
            source,
        }
    }

    pub fn source(&self) -> &Arc<S> {
        &self.source
    }

    /// The listings engine, for stats and explicit invalidation.
    pub fn engine(&self) -> &SyncEngine<ArticleFetcher<S>> {
        &self.articles
    }

    pub fn catalog_engine(&self) -> &SyncEngine<CatalogFetcher<S>> {
        &self.catalog
    }

    pub fn key_for(&self, filters: &ArticleFilters) -> Result<CacheKey, SyncError> {
        self.articles.key_for(&filters.to_params())
    }

    pub async fn articles(&self, filters: &ArticleFilters) -> Result<QueryResult<ArticlePage>, SyncError> {
        self.articles.query(&filters.to_params()).await
    }

    pub async fn articles_with(
        &self,
        filters: &ArticleFilters,
        options: QueryOptions,
    ) -> Result<QueryResult<ArticlePage>, SyncError> {
        self.articles.query_with(&filters.to_params(), options).await
    }

    pub async fn prefetch(&self, filters: &ArticleFilters) -> Result<(), SyncError> {
        self.articles.prefetch(&filters.to_params()).await
    }

    pub fn observe<C>(&self, filters: &ArticleFilters, on_change: C) -> Result<Observer<ArticlePage>, SyncError>
    where
        C: Fn(QueryState<ArticlePage>) + Send + 'static,
    {
        self.articles
            .observe(&filters.to_params(), self.articles.config().defaults, on_change)
    }

    pub async fn categories(&self) -> Result<QueryResult<Vec<String>>, SyncError> {
        self.catalog.query(&Catalog::Categories.params()).await
    }

    pub async fn sources(&self) -> Result<QueryResult<Vec<String>>, SyncError> {
        self.catalog.query(&Catalog::Sources.params()).await
    }

    /// Flip an article's bookmark optimistically, then reconcile with the
    /// service's answer.
    ///
    /// The patch sets the flag from a shared cell rather than flipping it, so
    /// when the service disagrees the correction lands on whatever the page
    /// holds at settlement, including other bookmarks toggled meanwhile.
    pub async fn toggle_bookmark(&self, key: &CacheKey, article_id: &str) -> Result<ArticlePage, SyncError> {
        let expected = self
            .articles
            .peek(key)
            .and_then(|state| state.data)
            .ok_or_else(|| SyncError::NotCached(key.to_string()))?
            .find(article_id)
            .map(|article| !article.bookmarked)
            .ok_or_else(|| SyncError::NotCached(format!("article {} in {}", article_id, key)))?;
        let target = Arc::new(AtomicBool::new(expected));

        let source = Arc::clone(&self.source);
        let answer = Arc::clone(&target);
        let id = article_id.to_string();
        let remote = async move {
            let response = source.toggle_bookmark(&id).await?;
            if response.bookmarked != expected {
                debug!(article_id = %id, bookmarked = response.bookmarked, "Service disagreed with optimistic bookmark");
                answer.store(response.bookmarked, Ordering::SeqCst);
            }
            Ok::<_, SyncError>(None)
        };

        let id = article_id.to_string();
        self.articles
            .mutate(
                key,
                move |page| {
                    if let Some(article) = page.find_mut(&id) {
                        article.bookmarked = target.load(Ordering::SeqCst);
                    }
                },
                remote,
            )
            .await
    }

    /// Ask the service to re-ingest its feeds. On acceptance every cached
    /// listing is invalidated.
    pub async fn trigger_refresh(&self) -> Result<RefreshResponse, SyncError> {
        let response = self.source.trigger_refresh().await?;
        if response.is_accepted() {
            let count = self.articles.invalidate(KeyFilter::Scope(ARTICLES_SCOPE));
            info!(invalidated = count, "Service refresh accepted");
        }
        Ok(response)
    }

    /// Debounced search over `base`. Any search text in `base` is replaced.
    pub fn search(&self, base: &ArticleFilters) -> SearchDebouncer<ArticleFetcher<S>> {
        let mut params = base.to_params();
        params.remove("search");
        self.articles.debouncer(params, "search")
    }

    pub async fn article(&self, article_id: &str) -> Result<Article, SyncError> {
        self.source.get_article(article_id).await
    }

    pub async fn stats(&self) -> Result<ArticleStats, SyncError> {
        self.source.stats().await
    }

    pub async fn health(&self) -> Result<HealthStatus, SyncError> {
        self.source.health().await
    }

    pub fn dispose(&self) {
        self.articles.dispose();
        self.catalog.dispose();
    }
}
