use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoriesResponse {
    pub categories: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourcesResponse {
    pub sources: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookmarkResponse {
    pub bookmarked: bool,
}

/// Acknowledgement of a manual refresh request.
///
/// Newer services answer `{"accepted": true}`; the scoring backend answers
/// `{"message": "...", "status": "processing"}`. Either form is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RefreshResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accepted: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl RefreshResponse {
    pub fn is_accepted(&self) -> bool {
        match (self.accepted, self.status.as_deref()) {
            (Some(accepted), _) => accepted,
            (None, Some(status)) => status.eq_ignore_ascii_case("processing"),
            (None, None) => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceCount {
    #[serde(rename = "_id", alias = "source")]
    pub source: Option<String>,
    pub count: u64,
}

/// Aggregate counts from the stats endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleStats {
    #[serde(alias = "total_articles")]
    pub total_articles: u64,
    /// Articles published in the last 24 hours.
    #[serde(alias = "recent_articles")]
    pub recent_articles: u64,
    #[serde(alias = "top_sources", default)]
    pub top_sources: Vec<SourceCount>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        self.status.eq_ignore_ascii_case("healthy")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refresh_response_forms() {
        let accepted: RefreshResponse =
            serde_json::from_str(r#"{"accepted": true}"#).expect("should parse");
        assert!(accepted.is_accepted());

        let processing: RefreshResponse = serde_json::from_str(
            r#"{"message": "Article refresh triggered", "status": "processing"}"#,
        )
        .expect("should parse");
        assert!(processing.is_accepted());

        let rejected: RefreshResponse =
            serde_json::from_str(r#"{"accepted": false}"#).expect("should parse");
        assert!(!rejected.is_accepted());
        assert!(!RefreshResponse::default().is_accepted());
    }

    #[test]
    fn test_parse_stats_summary() {
        let json = r#"{"total_articles": 120, "recent_articles": 14, "top_sources": [{"_id": "Reuters", "count": 40}, {"_id": null, "count": 2}]}"#;
        let stats: ArticleStats = serde_json::from_str(json).expect("stats should parse");
        assert_eq!(stats.total_articles, 120);
        assert_eq!(stats.recent_articles, 14);
        assert_eq!(stats.top_sources[0].source.as_deref(), Some("Reuters"));
        assert_eq!(stats.top_sources[1].source, None);
    }

    #[test]
    fn test_health_status() {
        let healthy: HealthStatus = serde_json::from_str(
            r#"{"status": "healthy", "database": "connected", "timestamp": "2024-06-01T10:00:00"}"#,
        )
        .expect("should parse");
        assert!(healthy.is_healthy());

        let down: HealthStatus =
            serde_json::from_str(r#"{"status": "unhealthy", "error": "ping failed"}"#)
                .expect("should parse");
        assert!(!down.is_healthy());
        assert_eq!(down.error.as_deref(), Some("ping failed"));
    }
}
