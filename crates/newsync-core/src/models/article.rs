use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::utils::format_age;

/// Scores at or above this read as "High" credibility.
const HIGH_CREDIBILITY: f64 = 0.7;

/// Scores at or above this (and below high) read as "Medium".
const MEDIUM_CREDIBILITY: f64 = 0.4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredibilityLevel {
    High,
    Medium,
    Low,
}

impl std::fmt::Display for CredibilityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CredibilityLevel::High => write!(f, "High"),
            CredibilityLevel::Medium => write!(f, "Medium"),
            CredibilityLevel::Low => write!(f, "Low"),
        }
    }
}

/// An article summary as served by the article service.
///
/// Immutable value data except for `bookmarked`, which is the one field the
/// client flips optimistically. Both camelCase and the service's snake_case
/// field names are accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub struct Article {
    #[serde(alias = "_id")]
    pub id: String,
    pub title: String,
    #[serde(default, deserialize_with = "de_string_or_null")]
    pub summary: String,
    pub source: String,
    #[serde(default, deserialize_with = "de_string_or_null")]
    pub category: String,
    #[serde(alias = "published_date", alias = "published_at", deserialize_with = "de_timestamp")]
    pub published_at: DateTime<Utc>,
    #[serde(alias = "reading_time_minutes", default)]
    pub reading_time_minutes: u32,
    #[serde(alias = "credibility_score", default)]
    pub credibility_score: f64,
    #[serde(alias = "credibility_confidence", default)]
    pub credibility_confidence: f64,
    pub url: String,
    #[serde(alias = "image_url", default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub bookmarked: bool,
}

impl Article {
    pub fn credibility_level(&self) -> CredibilityLevel {
        if self.credibility_score >= HIGH_CREDIBILITY {
            CredibilityLevel::High
        } else if self.credibility_score >= MEDIUM_CREDIBILITY {
            CredibilityLevel::Medium
        } else {
            CredibilityLevel::Low
        }
    }

    pub fn age_display(&self) -> String {
        format_age(self.published_at, Utc::now())
    }
}

/// One page of an article listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub struct ArticlePage {
    pub articles: Vec<Article>,
    #[serde(default)]
    pub total: u64,
    #[serde(default = "first_page")]
    pub page: u32,
    #[serde(alias = "per_page", default)]
    pub per_page: u32,
}

fn first_page() -> u32 {
    1
}

impl ArticlePage {
    /// Wrap a bare article list (the service's legacy listing shape).
    pub fn from_articles(articles: Vec<Article>, page: u32, per_page: u32) -> Self {
        Self {
            total: articles.len() as u64,
            articles,
            page,
            per_page,
        }
    }

    pub fn find(&self, article_id: &str) -> Option<&Article> {
        self.articles.iter().find(|a| a.id == article_id)
    }

    pub fn find_mut(&mut self, article_id: &str) -> Option<&mut Article> {
        self.articles.iter_mut().find(|a| a.id == article_id)
    }

    pub fn total_pages(&self) -> u32 {
        if self.per_page == 0 {
            return 1;
        }
        self.total.div_ceil(self.per_page as u64).max(1) as u32
    }
}

/// Unscored articles carry `null` summaries and categories.
fn de_string_or_null<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Accept RFC 3339 timestamps as well as the service's naive ISO timestamps (UTC).
fn de_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    if let Ok(dt) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_camel_case_article() {
        let json = r#"{"id":"a1","title":"Chips","summary":"New fab","source":"Wire","category":"technology","publishedAt":"2024-05-01T08:30:00Z","readingTimeMinutes":4,"credibilityScore":0.82,"credibilityConfidence":0.75,"url":"https://example.com/a1","imageUrl":null}"#;
        let article: Article = serde_json::from_str(json).expect("article should parse");
        assert_eq!(article.id, "a1");
        assert_eq!(article.reading_time_minutes, 4);
        assert_eq!(article.credibility_level(), CredibilityLevel::High);
        assert!(!article.bookmarked);
        assert!(article.tags.is_empty());
    }

    #[test]
    fn test_parse_service_snake_case_article() {
        let json = r#"{"id":"665f1c","title":"Storm warning","content":"...","url":"https://example.com/s","source":"BBC News","published_date":"2024-06-04T17:02:11.123456","summary":null,"credibility_score":0.55,"category":"world","tags":["weather"],"image_url":"https://example.com/s.jpg","author":null}"#;
        let article: Article = serde_json::from_str(json).expect("article should parse");
        assert_eq!(article.summary, "");
        assert_eq!(article.source, "BBC News");
        assert_eq!(article.credibility_level(), CredibilityLevel::Medium);
        assert_eq!(article.image_url.as_deref(), Some("https://example.com/s.jpg"));
        assert_eq!(article.published_at.to_rfc3339(), "2024-06-04T17:02:11.123456+00:00");
        assert_eq!(article.tags, vec!["weather".to_string()]);
    }

    #[test]
    fn test_credibility_levels() {
        let mut article: Article = serde_json::from_str(
            r#"{"id":"x","title":"t","source":"s","publishedAt":"2024-01-01T00:00:00Z","url":"u"}"#,
        )
        .expect("article should parse");
        article.credibility_score = 0.7;
        assert_eq!(article.credibility_level(), CredibilityLevel::High);
        article.credibility_score = 0.4;
        assert_eq!(article.credibility_level(), CredibilityLevel::Medium);
        article.credibility_score = 0.1;
        assert_eq!(article.credibility_level(), CredibilityLevel::Low);
        assert_eq!(CredibilityLevel::Low.to_string(), "Low");
    }

    #[test]
    fn test_total_pages() {
        let page = ArticlePage { articles: vec![], total: 41, page: 1, per_page: 20 };
        assert_eq!(page.total_pages(), 3);
        let empty = ArticlePage { articles: vec![], total: 0, page: 1, per_page: 20 };
        assert_eq!(empty.total_pages(), 1);
    }
}
