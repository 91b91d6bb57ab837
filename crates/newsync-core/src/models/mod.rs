//! Data models for the article service.
//!
//! This module contains the wire types consumed from the remote service:
//!
//! - `Article`, `ArticlePage`: article summaries and paginated listings
//! - `CredibilityLevel`: bucketed credibility score for display
//! - Catalog and service types: categories, sources, bookmark and refresh
//!   acknowledgements, statistics, health

pub mod article;
pub mod catalog;

pub use article::{Article, ArticlePage, CredibilityLevel};
pub use catalog::{
    ArticleStats, BookmarkResponse, CategoriesResponse, HealthStatus, RefreshResponse,
    SourceCount, SourcesResponse,
};
