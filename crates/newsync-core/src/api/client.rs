//! API client for the article service's REST routes.
//!
//! This module provides the `ApiClient` struct, the HTTP implementation of
//! `ArticleSource`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use crate::error::SyncError;
use crate::models::{
    Article, ArticlePage, ArticleStats, BookmarkResponse, CategoriesResponse, HealthStatus,
    RefreshResponse, SourcesResponse,
};

use super::{ApiError, ArticleFilters, ArticleSource};

// ============================================================================
// Constants
// ============================================================================

/// Default service location for local development
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

/// HTTP request timeout in seconds.
/// 30s allows for slow scoring backends while failing fast enough for good UX.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Page size used when the caller doesn't ask for one.
const DEFAULT_PER_PAGE: u32 = 20;

/// Listing responses come either as a page object or as a bare array.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ListingResponse {
    Page(ArticlePage),
    Bare(Vec<Article>),
}

/// API client for the article service.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    /// Create a new API client for the service at `base_url`
    pub fn new(base_url: impl Into<String>) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn articles_url(&self, path: &str) -> String {
        format!("{}/api/articles{}", self.base_url, path)
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    async fn parse<T: DeserializeOwned>(response: reqwest::Response, url: &str) -> Result<T, ApiError> {
        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| {
            ApiError::InvalidResponse(format!("Failed to parse JSON response from {}: {}", url, e))
        })
    }

    async fn get<T: DeserializeOwned>(&self, url: &str, query: &[(&str, String)]) -> Result<T, ApiError> {
        debug!(url = url, "GET");
        let response = self
            .client
            .get(url)
            .header(header::ACCEPT, "application/json")
            .query(query)
            .send()
            .await?;
        let response = Self::check_response(response).await?;
        Self::parse(response, url).await
    }

    async fn post<T: DeserializeOwned>(&self, url: &str) -> Result<T, ApiError> {
        debug!(url = url, "POST");
        let response = self
            .client
            .post(url)
            .header(header::ACCEPT, "application/json")
            .send()
            .await?;
        let response = Self::check_response(response).await?;
        Self::parse(response, url).await
    }

    /// Query-string pairs for a listing request.
    fn listing_query(filters: &ArticleFilters) -> Vec<(&'static str, String)> {
        let mut query = Vec::new();
        if let Some(ref category) = filters.category {
            query.push(("category", category.clone()));
        }
        if let Some(ref source) = filters.source {
            query.push(("source", source.clone()));
        }
        if let Some(min) = filters.min_credibility {
            query.push(("min_credibility", min.to_string()));
        }
        if let Some(ref search) = filters.search {
            query.push(("search", search.clone()));
        }
        query.push(("page", filters.page.unwrap_or(1).to_string()));
        query.push((
            "per_page",
            filters.per_page.unwrap_or(DEFAULT_PER_PAGE).to_string(),
        ));
        query
    }

    async fn fetch_articles(&self, filters: &ArticleFilters) -> Result<ArticlePage, ApiError> {
        let url = self.articles_url("/");
        let listing: ListingResponse = self.get(&url, &Self::listing_query(filters)).await?;
        Ok(match listing {
            ListingResponse::Page(page) => page,
            ListingResponse::Bare(articles) => ArticlePage::from_articles(
                articles,
                filters.page.unwrap_or(1),
                filters.per_page.unwrap_or(DEFAULT_PER_PAGE),
            ),
        })
    }

    /// Fetch the distinct categories present in the feed
    async fn fetch_categories(&self) -> Result<Vec<String>, ApiError> {
        let response: CategoriesResponse = self.get(&self.articles_url("/categories"), &[]).await?;
        Ok(response.categories)
    }

    /// Fetch the distinct sources present in the feed
    async fn fetch_sources(&self) -> Result<Vec<String>, ApiError> {
        let response: SourcesResponse = self.get(&self.articles_url("/sources"), &[]).await?;
        Ok(response.sources)
    }

    async fn fetch_health(&self) -> Result<HealthStatus, ApiError> {
        self.get(&format!("{}/api/health", self.base_url), &[]).await
    }
}

#[async_trait]
impl ArticleSource for ApiClient {
    async fn list_articles(&self, filters: &ArticleFilters) -> Result<ArticlePage, SyncError> {
        Ok(self.fetch_articles(filters).await?)
    }

    async fn list_categories(&self) -> Result<Vec<String>, SyncError> {
        Ok(self.fetch_categories().await?)
    }

    async fn list_sources(&self) -> Result<Vec<String>, SyncError> {
        Ok(self.fetch_sources().await?)
    }

    async fn toggle_bookmark(&self, article_id: &str) -> Result<BookmarkResponse, SyncError> {
        let url = self.articles_url(&format!("/{}/bookmark", article_id));
        Ok(self.post(&url).await?)
    }

    async fn trigger_refresh(&self) -> Result<RefreshResponse, SyncError> {
        Ok(self.post(&self.articles_url("/refresh")).await?)
    }

    async fn get_article(&self, article_id: &str) -> Result<Article, SyncError> {
        let url = self.articles_url(&format!("/{}", article_id));
        Ok(self.get(&url, &[]).await?)
    }

    async fn stats(&self) -> Result<ArticleStats, SyncError> {
        Ok(self.get(&self.articles_url("/stats/summary"), &[]).await?)
    }

    async fn health(&self) -> Result<HealthStatus, SyncError> {
        Ok(self.fetch_health().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listing_query() {
        let filters = ArticleFilters::default()
            .category("technology")
            .min_credibility(0.6)
            .search("ai new");
        let query = ApiClient::listing_query(&filters);
        assert_eq!(
            query,
            vec![
                ("category", "technology".to_string()),
                ("min_credibility", "0.6".to_string()),
                ("search", "ai new".to_string()),
                ("page", "1".to_string()),
                ("per_page", "20".to_string()),
            ]
        );
    }

    #[test]
    fn test_parse_bare_listing() {
        let json = r#"[{"id":"1","title":"t","source":"s","published_date":"2024-06-01T09:00:00","url":"u"}]"#;
        let listing: ListingResponse = serde_json::from_str(json).expect("listing should parse");
        assert!(matches!(listing, ListingResponse::Bare(ref a) if a.len() == 1));
    }

    #[test]
    fn test_parse_page_listing() {
        let json = r#"{"articles":[],"total":0,"page":3,"perPage":10}"#;
        match serde_json::from_str::<ListingResponse>(json).expect("listing should parse") {
            ListingResponse::Page(page) => {
                assert_eq!(page.page, 3);
                assert_eq!(page.per_page, 10);
            }
            ListingResponse::Bare(_) => panic!("expected page listing"),
        }
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let client = ApiClient::new("http://localhost:8000/").expect("client should build");
        assert_eq!(client.base_url(), "http://localhost:8000");
        assert_eq!(client.articles_url("/sources"), "http://localhost:8000/api/articles/sources");
    }
}
