//! What the engine fetches with.
//!
//! A `SyncEngine` is generic over one `Fetcher`. The article feed runs two
//! engines over the same `ArticleSource`: one for paginated listings and one
//! for the category and source catalogs.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::api::source::ARTICLES_SCOPE;
use crate::api::{ArticleFilters, ArticleSource};
use crate::cache::{KeyCodec, QueryParams};
use crate::error::SyncError;
use crate::models::ArticlePage;

/// Scope under which catalog lists are cached.
pub const CATALOG_SCOPE: &str = "catalog";

#[async_trait]
pub trait Fetcher: Send + Sync + 'static {
    type Data: Clone + Send + Sync + 'static;

    /// Codec used to validate params and derive keys.
    fn codec(&self) -> KeyCodec {
        KeyCodec::new()
    }

    /// Load data for canonical `params`.
    async fn fetch(&self, params: &QueryParams) -> Result<Self::Data, SyncError>;
}

/// Paginated article listings.
pub struct ArticleFetcher<S> {
    source: Arc<S>,
}

impl<S: ArticleSource> ArticleFetcher<S> {
    pub fn new(source: Arc<S>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl<S: ArticleSource> Fetcher for ArticleFetcher<S> {
    type Data = ArticlePage;

    fn codec(&self) -> KeyCodec {
        ArticleFilters::codec()
    }

    async fn fetch(&self, params: &QueryParams) -> Result<ArticlePage, SyncError> {
        if params.scope() != ARTICLES_SCOPE {
            return Err(SyncError::Validation(format!(
                "unexpected scope '{}' for article listings",
                params.scope()
            )));
        }
        let filters = ArticleFilters::from_params(params);
        debug!(?filters, "Fetching articles");
        self.source.list_articles(&filters).await
    }
}

/// The lists behind the category and source pickers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Catalog {
    Categories,
    Sources,
}

impl Catalog {
    pub fn as_str(&self) -> &'static str {
        match self {
            Catalog::Categories => "categories",
            Catalog::Sources => "sources",
        }
    }

    pub fn params(&self) -> QueryParams {
        QueryParams::new(CATALOG_SCOPE).with("list", self.as_str())
    }

    fn from_params(params: &QueryParams) -> Result<Self, SyncError> {
        match (params.scope(), params.text("list")) {
            (CATALOG_SCOPE, Some("categories")) => Ok(Catalog::Categories),
            (CATALOG_SCOPE, Some("sources")) => Ok(Catalog::Sources),
            (scope, list) => Err(SyncError::Validation(format!(
                "unknown catalog {}:{}",
                scope,
                list.unwrap_or("<none>")
            ))),
        }
    }
}

pub struct CatalogFetcher<S> {
    source: Arc<S>,
}

impl<S: ArticleSource> CatalogFetcher<S> {
    pub fn new(source: Arc<S>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl<S: ArticleSource> Fetcher for CatalogFetcher<S> {
    type Data = Vec<String>;

    async fn fetch(&self, params: &QueryParams) -> Result<Vec<String>, SyncError> {
        match Catalog::from_params(params)? {
            Catalog::Categories => self.source.list_categories().await,
            Catalog::Sources => self.source.list_sources().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_params_round_trip() {
        for catalog in [Catalog::Categories, Catalog::Sources] {
            assert_eq!(Catalog::from_params(&catalog.params()), Ok(catalog));
        }
    }

    #[test]
    fn test_unknown_catalog_is_rejected() {
        let params = QueryParams::new(CATALOG_SCOPE).with("list", "authors");
        assert!(matches!(
            Catalog::from_params(&params),
            Err(SyncError::Validation(_))
        ));
        let params = QueryParams::new("articles").with("list", "sources");
        assert!(Catalog::from_params(&params).is_err());
    }
}
