//! REST API client module for the article service.
//!
//! This module provides the `ArticleSource` trait (the fetch contract the
//! sync engine consumes) and `ApiClient`, its HTTP implementation against the
//! article service's `/api/articles` routes.

pub mod client;
pub mod error;
pub mod source;

pub use client::ApiClient;
pub use error::ApiError;
pub use source::{ArticleFilters, ArticleSource};
