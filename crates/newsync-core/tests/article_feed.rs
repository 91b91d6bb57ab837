//! `ArticleFeed` against an in-memory article service.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use newsync_core::api::{ArticleFilters, ArticleSource};
use newsync_core::cache::QueryStatus;
use newsync_core::config::{QueryOptions, SyncConfig};
use newsync_core::error::SyncError;
use newsync_core::models::{
    Article, ArticlePage, ArticleStats, BookmarkResponse, HealthStatus, RefreshResponse,
};
use newsync_core::ArticleFeed;

const LATENCY: Duration = Duration::from_millis(10);

fn article(id: &str, score: f64) -> Article {
    serde_json::from_value(serde_json::json!({
        "_id": id,
        "title": format!("Story {}", id),
        "summary": null,
        "source": "Wire",
        "category": "technology",
        "published_date": "2026-03-01T08:00:00",
        "credibility_score": score,
        "url": format!("https://news.example/{}", id),
    }))
    .expect("fixture article should parse")
}

#[derive(Default)]
struct MockService {
    listings: Mutex<Vec<ArticleFilters>>,
    catalog_calls: AtomicUsize,
    /// `None` fails the bookmark call; otherwise the service's answer.
    bookmark_answer: Mutex<Option<bool>>,
    /// Per-article answers that take precedence over `bookmark_answer`.
    bookmark_overrides: Mutex<HashMap<String, Option<bool>>>,
    refresh_accepted: bool,
}

impl MockService {
    fn listing_calls(&self) -> usize {
        self.listings.lock().unwrap().len()
    }
}

#[async_trait]
impl ArticleSource for MockService {
    async fn list_articles(&self, filters: &ArticleFilters) -> Result<ArticlePage, SyncError> {
        self.listings.lock().unwrap().push(filters.clone());
        tokio::time::sleep(LATENCY).await;
        // Two of three clear 0.6; the service would filter, the mock does not
        let articles = vec![article("a1", 0.9), article("a2", 0.65), article("a3", 0.3)];
        Ok(ArticlePage::from_articles(articles, 1, 20))
    }

    async fn list_categories(&self) -> Result<Vec<String>, SyncError> {
        self.catalog_calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(LATENCY).await;
        Ok(vec!["technology".into(), "world".into()])
    }

    async fn list_sources(&self) -> Result<Vec<String>, SyncError> {
        self.catalog_calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(LATENCY).await;
        Ok(vec!["Wire".into()])
    }

    async fn toggle_bookmark(&self, article_id: &str) -> Result<BookmarkResponse, SyncError> {
        tokio::time::sleep(LATENCY).await;
        let answer = self
            .bookmark_overrides
            .lock()
            .unwrap()
            .get(article_id)
            .copied()
            .unwrap_or(*self.bookmark_answer.lock().unwrap());
        match answer {
            Some(bookmarked) => Ok(BookmarkResponse { bookmarked }),
            None => Err(SyncError::Server { status: 404, message: "Article not found".into() }),
        }
    }

    async fn trigger_refresh(&self) -> Result<RefreshResponse, SyncError> {
        Ok(RefreshResponse {
            accepted: Some(self.refresh_accepted),
            ..RefreshResponse::default()
        })
    }

    async fn get_article(&self, article_id: &str) -> Result<Article, SyncError> {
        Ok(article(article_id, 0.5))
    }

    async fn stats(&self) -> Result<ArticleStats, SyncError> {
        Err(SyncError::Server { status: 501, message: "not implemented".into() })
    }

    async fn health(&self) -> Result<HealthStatus, SyncError> {
        Err(SyncError::Network("offline".into()))
    }
}

fn feed(service: MockService) -> ArticleFeed<MockService> {
    ArticleFeed::new(service, SyncConfig::default())
}

fn technology() -> ArticleFilters {
    ArticleFilters::default().category("technology")
}

#[tokio::test(start_paused = true)]
async fn test_min_credibility_is_forwarded_and_keyed_separately() {
    let feed = feed(MockService::default());
    let strict = technology().min_credibility(0.6);

    let result = feed.articles(&strict).await.unwrap();
    let page = result.data().expect("first load should have data");
    assert_eq!(page.articles.len(), 3);

    let recorded = feed.source().listings.lock().unwrap().clone();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].min_credibility, Some(0.6));
    assert_eq!(recorded[0].category.as_deref(), Some("technology"));

    assert_ne!(
        feed.key_for(&strict).unwrap(),
        feed.key_for(&technology()).unwrap()
    );
    feed.articles(&technology()).await.unwrap();
    assert_eq!(feed.source().listing_calls(), 2);
    assert_eq!(feed.engine().stats().entries, 2);
}

#[tokio::test(start_paused = true)]
async fn test_out_of_range_filters_never_reach_the_service() {
    let feed = feed(MockService::default());
    let err = feed
        .articles(&technology().min_credibility(1.5))
        .await
        .err();
    assert!(matches!(err, Some(SyncError::Validation(_))));
    let err = feed.articles(&technology().per_page(500)).await.err();
    assert!(matches!(err, Some(SyncError::Validation(_))));
    assert_eq!(feed.source().listing_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_bookmark_is_applied_before_the_service_confirms() {
    let service = MockService::default();
    *service.bookmark_answer.lock().unwrap() = Some(true);
    let feed = feed(service);
    let key = feed.articles(&technology()).await.unwrap().key().clone();
    let mut subscription = feed.engine().subscribe(&key).unwrap();

    let page = feed.toggle_bookmark(&key, "a2").await.unwrap();
    assert!(page.find("a2").unwrap().bookmarked);

    let states = subscription.drain();
    assert_eq!(states.len(), 3);
    let optimistic = &states[1];
    assert_eq!(optimistic.status, QueryStatus::Loading);
    assert!(optimistic.data.as_ref().unwrap().find("a2").unwrap().bookmarked);
    assert_eq!(states[2].status, QueryStatus::Success);
}

#[tokio::test(start_paused = true)]
async fn test_failed_bookmark_rolls_back() {
    let feed = feed(MockService::default());
    let key = feed.articles(&technology()).await.unwrap().key().clone();
    let before = feed.engine().peek(&key).unwrap().data;

    let err = feed.toggle_bookmark(&key, "a1").await.unwrap_err();

    assert_eq!(err, SyncError::Server { status: 404, message: "Article not found".into() });
    let after = feed.engine().peek(&key).unwrap();
    assert_eq!(after.data, before);
    assert_eq!(after.status, QueryStatus::Error);
    assert_eq!(after.error, Some(err));
}

#[tokio::test(start_paused = true)]
async fn test_bookmark_follows_the_service_answer() {
    let service = MockService::default();
    // The service reports the article as not bookmarked after the flip
    *service.bookmark_answer.lock().unwrap() = Some(false);
    let feed = feed(service);
    let key = feed.articles(&technology()).await.unwrap().key().clone();

    let page = feed.toggle_bookmark(&key, "a3").await.unwrap();
    assert!(!page.find("a3").unwrap().bookmarked);
    let state = feed.engine().peek(&key).unwrap();
    assert_eq!(state.status, QueryStatus::Success);
    assert!(!state.data.unwrap().find("a3").unwrap().bookmarked);
}

#[tokio::test(start_paused = true)]
async fn test_overlapping_bookmarks_settle_independently() {
    let service = MockService::default();
    *service.bookmark_answer.lock().unwrap() = Some(true);
    {
        let mut overrides = service.bookmark_overrides.lock().unwrap();
        overrides.insert("a1".into(), None);
        overrides.insert("a3".into(), Some(false));
    }
    let feed = feed(service);
    let key = feed.articles(&technology()).await.unwrap().key().clone();

    // All three flips are applied before any answer comes back
    let (a1, a2, a3) = tokio::join!(
        feed.toggle_bookmark(&key, "a1"),
        feed.toggle_bookmark(&key, "a2"),
        feed.toggle_bookmark(&key, "a3"),
    );

    assert!(a1.is_err());
    assert!(a2.unwrap().find("a2").unwrap().bookmarked);
    assert!(!a3.unwrap().find("a3").unwrap().bookmarked);

    let state = feed.engine().peek(&key).unwrap();
    assert_ne!(state.status, QueryStatus::Loading);
    let page = state.data.unwrap();
    assert!(!page.find("a1").unwrap().bookmarked);
    assert!(page.find("a2").unwrap().bookmarked);
    assert!(!page.find("a3").unwrap().bookmarked);
}

#[tokio::test(start_paused = true)]
async fn test_bookmark_of_unknown_article_is_rejected() {
    let feed = feed(MockService::default());
    let key = feed.articles(&technology()).await.unwrap().key().clone();
    let err = feed.toggle_bookmark(&key, "missing").await.unwrap_err();
    assert!(matches!(err, SyncError::NotCached(_)));
}

#[tokio::test(start_paused = true)]
async fn test_accepted_refresh_invalidates_every_listing() {
    let service = MockService {
        refresh_accepted: true,
        ..MockService::default()
    };
    let feed = feed(service);
    let fresh = QueryOptions::default().with_stale_time(Duration::from_secs(3600));
    feed.articles_with(&technology(), fresh).await.unwrap();
    feed.articles_with(&ArticleFilters::default(), fresh).await.unwrap();
    feed.articles_with(&technology(), fresh).await.unwrap();
    assert_eq!(feed.source().listing_calls(), 2);

    let response = feed.trigger_refresh().await.unwrap();
    assert!(response.is_accepted());

    feed.articles_with(&technology(), fresh).await.unwrap();
    feed.articles_with(&ArticleFilters::default(), fresh).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(feed.source().listing_calls(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_rejected_refresh_keeps_cache_fresh() {
    let feed = feed(MockService::default());
    let fresh = QueryOptions::default().with_stale_time(Duration::from_secs(3600));
    feed.articles_with(&technology(), fresh).await.unwrap();

    assert!(!feed.trigger_refresh().await.unwrap().is_accepted());
    feed.articles_with(&technology(), fresh).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(feed.source().listing_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_catalogs_are_cached() {
    let feed = feed(MockService::default());
    let categories = feed.categories().await.unwrap();
    assert_eq!(
        categories.data(),
        Some(&vec!["technology".to_string(), "world".to_string()])
    );
    feed.categories().await.unwrap();
    let sources = feed.sources().await.unwrap();
    assert_eq!(sources.data(), Some(&vec!["Wire".to_string()]));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(feed.source().catalog_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_typing_settles_into_one_search() {
    let feed = feed(MockService::default());
    let search = feed.search(&technology().search("stale text"));

    search.set_query("a").unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    search.set_query("ai").unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    search.set_query("ai new").unwrap();
    tokio::time::sleep(Duration::from_millis(400)).await;

    let recorded = feed.source().listings.lock().unwrap().clone();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].search.as_deref(), Some("ai new"));
    assert_eq!(recorded[0].category.as_deref(), Some("technology"));
    assert!(search.latest().unwrap().is_success());
}

#[tokio::test(start_paused = true)]
async fn test_observe_binding_receives_listing() {
    let feed = feed(MockService::default());
    let totals = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&totals);
    let observer = feed
        .observe(&technology(), move |state| {
            sink.lock().unwrap().push(state.data.map(|page| page.total));
        })
        .unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(totals.lock().unwrap().last(), Some(&Some(3)));
    drop(observer);
    assert_eq!(feed.engine().stats().subscribers, 0);
}

#[tokio::test(start_paused = true)]
async fn test_dispose_shuts_down_both_engines() {
    let feed = feed(MockService::default());
    feed.articles(&technology()).await.unwrap();
    feed.dispose();
    assert_eq!(feed.articles(&technology()).await.err(), Some(SyncError::Disposed));
    assert_eq!(feed.categories().await.err(), Some(SyncError::Disposed));
}
