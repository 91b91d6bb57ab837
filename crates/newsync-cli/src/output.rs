//! Plain-text rendering of feed results.

use newsync_core::models::{ArticleStats, HealthStatus};
use newsync_core::utils::{format_age, truncate_string};
use newsync_core::{Article, ArticlePage, QueryState, QueryStatus};

/// Column width for article titles
const TITLE_WIDTH: usize = 60;

/// Column width for source names
const SOURCE_WIDTH: usize = 18;

pub fn article_line(article: &Article) -> String {
    format!(
        "{} {:<title$}  {:<source$}  {:<6}  {:>9}  {}",
        if article.bookmarked { "*" } else { " " },
        truncate_string(&article.title, TITLE_WIDTH),
        truncate_string(&article.source, SOURCE_WIDTH),
        article.credibility_level().to_string(),
        article.age_display(),
        article.id,
        title = TITLE_WIDTH,
        source = SOURCE_WIDTH,
    )
}

pub fn page(page: &ArticlePage) -> String {
    let mut out = String::new();
    for article in &page.articles {
        out.push_str(&article_line(article));
        out.push('\n');
    }
    out.push_str(&format!(
        "Page {} of {} ({} articles)",
        page.page,
        page.total_pages(),
        page.total
    ));
    out
}

pub fn article_detail(article: &Article) -> String {
    let mut lines = vec![
        article.title.clone(),
        format!("{} | {} | {}", article.source, article.category, article.age_display()),
        format!(
            "Credibility: {} ({:.2}, confidence {:.2})",
            article.credibility_level(),
            article.credibility_score,
            article.credibility_confidence
        ),
    ];
    if let Some(author) = &article.author {
        lines.push(format!("By {}", author));
    }
    if !article.tags.is_empty() {
        lines.push(format!("Tags: {}", article.tags.join(", ")));
    }
    if !article.summary.is_empty() {
        lines.push(String::new());
        lines.push(article.summary.clone());
    }
    lines.push(String::new());
    lines.push(article.url.clone());
    lines.join("\n")
}

/// One-line header describing where a listing state stands.
pub fn state_header<T>(state: &QueryState<T>) -> String {
    let mut header = match state.status {
        QueryStatus::Idle => "idle".to_string(),
        QueryStatus::Loading => "loading...".to_string(),
        QueryStatus::Success => "up to date".to_string(),
        QueryStatus::Error => match &state.error {
            Some(e) => format!("error: {}", e),
            None => "error".to_string(),
        },
    };
    if let Some(at) = state.fetched_at {
        header.push_str(&format!(" (fetched {})", format_age(at, chrono::Utc::now())));
    }
    if state.is_fetching && state.status != QueryStatus::Loading {
        header.push_str(", refreshing");
    }
    if let Some(e) = &state.refresh_error {
        header.push_str(&format!(", last refresh failed: {}", e));
    }
    header
}

pub fn stats(stats: &ArticleStats) -> String {
    let mut lines = vec![
        format!("Total articles:  {}", stats.total_articles),
        format!("Last 24 hours:   {}", stats.recent_articles),
    ];
    if !stats.top_sources.is_empty() {
        lines.push("Top sources:".to_string());
        for source in &stats.top_sources {
            lines.push(format!(
                "  {:<width$} {}",
                source.source.as_deref().unwrap_or("(unknown)"),
                source.count,
                width = SOURCE_WIDTH
            ));
        }
    }
    lines.join("\n")
}

pub fn health(health: &HealthStatus) -> String {
    let mut line = format!("Service: {}", health.status);
    if let Some(db) = &health.database {
        line.push_str(&format!(", database: {}", db));
    }
    if let Some(e) = &health.error {
        line.push_str(&format!(" ({})", e));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use newsync_core::models::SourceCount;
    use newsync_core::{CacheKey, KeyCodec, QueryParams, SyncError};

    fn key() -> CacheKey {
        KeyCodec::new().encode(&QueryParams::new("articles")).unwrap()
    }

    #[test]
    fn test_state_header() {
        let mut state: QueryState<()> = QueryState {
            key: key(),
            data: Some(()),
            status: QueryStatus::Success,
            error: None,
            refresh_error: None,
            is_fetching: true,
            fetched_at: None,
        };
        assert_eq!(state_header(&state), "up to date, refreshing");

        state.is_fetching = false;
        state.refresh_error = Some(SyncError::Network("timed out".into()));
        assert_eq!(
            state_header(&state),
            "up to date, last refresh failed: Network error: timed out"
        );

        state.status = QueryStatus::Error;
        state.error = Some(SyncError::Server { status: 500, message: "boom".into() });
        state.refresh_error = None;
        assert_eq!(state_header(&state), "error: Server error 500: boom");
    }

    #[test]
    fn test_stats_lists_sources() {
        let text = stats(&ArticleStats {
            total_articles: 120,
            recent_articles: 7,
            top_sources: vec![SourceCount { source: Some("Wire".into()), count: 40 }],
        });
        assert!(text.contains("Total articles:  120"));
        assert!(text.contains("Wire"));
    }

    #[test]
    fn test_health_line() {
        let status = HealthStatus {
            status: "healthy".into(),
            database: Some("connected".into()),
            error: None,
            timestamp: None,
        };
        assert_eq!(health(&status), "Service: healthy, database: connected");
    }
}
