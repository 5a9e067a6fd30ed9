//! Data models shared by the collection pipeline.
//!
//! - [`LinkRecord`]: an article link found on a search-results page
//! - [`ArticleRecord`]: the structured content extracted from one article page
//! - [`DayResult`]: the outcome of one calendar day's collection cycle
//! - [`DatedArticle`]: an article tagged with the day whose search found it
//! - [`CrawlResult`]: the outcome of a single (non-daily) crawl
//!
//! Artifact JSON uses the short field names downstream tooling expects
//! (`press`, `date`, `content`, `reporter`); the Rust field names say what
//! the values are.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Where a result link points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LinkType {
    /// The portal's own canonical article page.
    #[serde(rename = "naver", alias = "primary")]
    Primary,
    /// The publisher's original site.
    #[serde(rename = "original")]
    Original,
}

impl LinkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkType::Primary => "naver",
            LinkType::Original => "original",
        }
    }
}

/// An article link collected from a search-results page.
///
/// `url` is the identity: a collection never holds two records with the same
/// url.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkRecord {
    pub url: String,
    pub link_type: LinkType,
    pub title: Option<String>,
    /// The day pinned in the search that found this link, if any.
    pub search_date: Option<NaiveDate>,
    pub collected_at: DateTime<Utc>,
}

impl LinkRecord {
    pub fn to_entry(&self) -> LinkEntry {
        LinkEntry {
            url: self.url.clone(),
            link_type: self.link_type,
            title: self.title.clone(),
        }
    }
}

/// Serialized form of a [`LinkRecord`] in per-day link artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkEntry {
    pub url: String,
    #[serde(rename = "type")]
    pub link_type: LinkType,
    pub title: Option<String>,
}

/// Structured content of one article page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleRecord {
    pub url: String,
    pub title: String,
    #[serde(rename = "press")]
    pub source_name: String,
    /// Publication date exactly as the page shows it.
    #[serde(rename = "date")]
    pub published: String,
    #[serde(rename = "content")]
    pub body: String,
    #[serde(rename = "reporter")]
    pub byline: String,
    pub extracted_at: DateTime<Utc>,
}

impl ArticleRecord {
    /// A record carrying only its url, used when the page could not be
    /// fetched.
    pub fn empty(url: &str, extracted_at: DateTime<Utc>) -> Self {
        Self {
            url: url.to_string(),
            title: String::new(),
            source_name: String::new(),
            published: String::new(),
            body: String::new(),
            byline: String::new(),
            extracted_at,
        }
    }

    /// Title and body present, and the trimmed body longer than
    /// `min_body_chars` characters.
    pub fn is_valid(&self, min_body_chars: usize) -> bool {
        !self.title.is_empty()
            && !self.body.is_empty()
            && self.body.trim().chars().count() > min_body_chars
    }
}

/// An article tagged with the day whose search discovered it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatedArticle {
    #[serde(rename = "collection_date")]
    pub day: NaiveDate,
    #[serde(flatten)]
    pub article: ArticleRecord,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DayStatus {
    Success,
    Failed,
}

/// Outcome of one calendar day's collection cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayResult {
    pub date: NaiveDate,
    pub status: DayStatus,
    pub urls_collected: usize,
    pub contents_extracted: usize,
    pub url_file: Option<PathBuf>,
    pub content_file: Option<PathBuf>,
    pub error: Option<String>,
}

impl DayResult {
    pub fn failed(date: NaiveDate, error: impl Into<String>) -> Self {
        Self {
            date,
            status: DayStatus::Failed,
            urls_collected: 0,
            contents_extracted: 0,
            url_file: None,
            content_file: None,
            error: Some(error.into()),
        }
    }
}

/// An error recorded during a single crawl.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlError {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Outcome of a single-range crawl: every link found, every valid article
/// extracted, and any errors met along the way.
#[derive(Debug, Clone, Serialize)]
pub struct CrawlResult {
    pub query: String,
    pub period: String,
    #[serde(serialize_with = "serialize_links")]
    pub urls: Vec<LinkRecord>,
    pub articles: Vec<ArticleRecord>,
    pub errors: Vec<CrawlError>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

fn serialize_links<S: serde::Serializer>(links: &[LinkRecord], s: S) -> Result<S::Ok, S::Error> {
    s.collect_seq(links.iter().map(LinkRecord::to_entry))
}

impl CrawlResult {
    pub fn new(query: &str, period: &str, start_time: DateTime<Utc>) -> Self {
        Self {
            query: query.to_string(),
            period: period.to_string(),
            urls: Vec::new(),
            articles: Vec::new(),
            errors: Vec::new(),
            start_time,
            end_time: None,
        }
    }

    pub fn add_error(&mut self, kind: &str, message: impl Into<String>, at: DateTime<Utc>) {
        self.errors.push(CrawlError {
            kind: kind.to_string(),
            message: message.into(),
            timestamp: at,
        });
    }

    pub fn complete(&mut self, at: DateTime<Utc>) {
        self.end_time = Some(at);
    }

    pub fn duration_secs(&self) -> f64 {
        self.end_time
            .map(|end| (end - self.start_time).num_milliseconds() as f64 / 1000.0)
            .unwrap_or_default()
    }

    pub fn stats(&self) -> CrawlStats {
        CrawlStats {
            query: self.query.clone(),
            period: self.period.clone(),
            total_urls: self.urls.len(),
            total_articles: self.articles.len(),
            total_errors: self.errors.len(),
            start_time: self.start_time,
            end_time: self.end_time,
            duration_secs: self.duration_secs(),
        }
    }
}

/// Summary counts of a [`CrawlResult`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrawlStats {
    pub query: String,
    pub period: String,
    pub total_urls: usize,
    pub total_articles: usize,
    pub total_errors: usize,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_secs: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 20, 9, 0, 0).unwrap()
    }

    fn article(body: &str) -> ArticleRecord {
        ArticleRecord {
            url: "https://n.news.naver.com/mnews/article/001/0000000001".into(),
            title: "방산 수출 역대 최대".into(),
            source_name: "연합뉴스".into(),
            published: "2025-05-20 09:13:01".into(),
            body: body.into(),
            byline: "홍길동 기자".into(),
            extracted_at: ts(),
        }
    }

    #[test]
    fn test_article_serializes_with_artifact_keys() {
        let value = serde_json::to_value(article("본문")).unwrap();
        let mut keys: Vec<_> = value.as_object().unwrap().keys().cloned().collect();
        keys.sort();
        assert_eq!(
            keys,
            ["content", "date", "extracted_at", "press", "reporter", "title", "url"]
        );
        assert_eq!(value["press"], "연합뉴스");
    }

    #[test]
    fn test_article_deserializes_from_artifact() {
        let json = r#"{
            "url": "https://n.news.naver.com/mnews/article/001/1",
            "title": "t",
            "press": "p",
            "date": "d",
            "content": "c",
            "reporter": "r",
            "extracted_at": "2025-05-20T09:00:00Z"
        }"#;
        let parsed: ArticleRecord = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.source_name, "p");
        assert_eq!(parsed.body, "c");
        assert_eq!(parsed.extracted_at, ts());
    }

    #[test]
    fn test_validity_predicate() {
        assert!(article(&"가".repeat(51)).is_valid(50));
        assert!(!article(&"가".repeat(50)).is_valid(50));
        assert!(!article("").is_valid(0));

        let mut untitled = article(&"가".repeat(100));
        untitled.title.clear();
        assert!(!untitled.is_valid(50));
    }

    #[test]
    fn test_empty_record_is_invalid() {
        let record = ArticleRecord::empty("https://example.com/a", ts());
        assert_eq!(record.url, "https://example.com/a");
        assert!(record.title.is_empty() && record.body.is_empty());
        assert!(!record.is_valid(0));
    }

    #[test]
    fn test_link_entry_shape() {
        let link = LinkRecord {
            url: "https://n.news.naver.com/mnews/article/001/1".into(),
            link_type: LinkType::Primary,
            title: Some("제목".into()),
            search_date: NaiveDate::from_ymd_opt(2025, 5, 20),
            collected_at: ts(),
        };
        let value = serde_json::to_value(link.to_entry()).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "url": "https://n.news.naver.com/mnews/article/001/1",
                "type": "naver",
                "title": "제목"
            })
        );
    }

    #[test]
    fn test_link_type_accepts_primary_alias() {
        let entry: LinkEntry =
            serde_json::from_str(r#"{"url": "u", "type": "primary", "title": null}"#).unwrap();
        assert_eq!(entry.link_type, LinkType::Primary);
    }

    #[test]
    fn test_dated_article_flattens() {
        let dated = DatedArticle {
            day: NaiveDate::from_ymd_opt(2025, 5, 21).unwrap(),
            article: article("본문"),
        };
        let value = serde_json::to_value(&dated).unwrap();
        assert_eq!(value["collection_date"], "2025-05-21");
        assert_eq!(value["title"], "방산 수출 역대 최대");
    }

    #[test]
    fn test_crawl_result_stats() {
        let mut result = CrawlResult::new("반도체", "1w", ts());
        result.articles.push(article("본문"));
        result.add_error("extract", "blocked", ts());
        result.complete(ts() + chrono::TimeDelta::milliseconds(2500));

        let stats = result.stats();
        assert_eq!(stats.total_urls, 0);
        assert_eq!(stats.total_articles, 1);
        assert_eq!(stats.total_errors, 1);
        assert_eq!(stats.duration_secs, 2.5);

        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["errors"][0]["type"], "extract");
    }

    #[test]
    fn test_failed_day_result() {
        let day = NaiveDate::from_ymd_opt(2025, 5, 22).unwrap();
        let result = DayResult::failed(day, "boom");
        assert_eq!(result.status, DayStatus::Failed);
        assert_eq!(result.error.as_deref(), Some("boom"));
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["status"], "failed");
        assert_eq!(value["date"], "2025-05-22");
    }
}
