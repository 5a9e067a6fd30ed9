//! Single-range crawl: one search, its links, and optionally their content.

use crate::collector::Pipeline;
use crate::collector::merge::balanced_indices;
use crate::models::{CrawlResult, LinkType};
use crate::scrapers::links::CollectOptions;
use crate::search::SearchQuery;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

/// Which links get their content extracted when there are more links than
/// the content limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectionMode {
    /// The first `limit` links.
    #[default]
    Sequential,
    /// `limit` links spread evenly over the whole result list.
    Balanced,
}

impl SelectionMode {
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "sequential" => SelectionMode::Sequential,
            "balanced" | "even_distribution" => SelectionMode::Balanced,
            other => {
                warn!(mode = other, "Unknown extraction mode; using sequential");
                SelectionMode::Sequential
            }
        }
    }

    /// Indices into a list of `n` links to extract, `limit == 0` meaning all.
    pub fn pick(self, n: usize, limit: usize) -> Vec<usize> {
        match self {
            SelectionMode::Balanced if limit > 0 => balanced_indices(n, limit),
            _ if limit > 0 => (0..n.min(limit)).collect(),
            _ => (0..n).collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CrawlRequest {
    pub search: SearchQuery,
    /// Human-readable period recorded in the result (`1w`, `custom`, ...).
    pub period_label: String,
    pub max_pages: usize,
    pub max_urls: usize,
    pub type_filter: Option<LinkType>,
    pub extract_content: bool,
    pub content_limit: usize,
    pub mode: SelectionMode,
    pub request_delay: f64,
    pub content_delay: f64,
}

pub struct NewsCrawler {
    pipeline: Arc<Pipeline>,
}

impl NewsCrawler {
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        Self { pipeline }
    }

    /// Run one crawl. Problems are recorded in the result's `errors`; the
    /// call itself never fails.
    #[instrument(level = "info", skip_all, fields(query = %req.search.query, period = %req.period_label))]
    pub async fn crawl(&self, req: &CrawlRequest) -> CrawlResult {
        let clock = self.pipeline.clock();
        let mut result = CrawlResult::new(&req.search.query, &req.period_label, clock.now());

        let search_url = match req.search.build_url() {
            Ok(url) => url,
            Err(e) => {
                error!(error = %e, "Could not build search URL");
                result.add_error("search_error", e.to_string(), clock.now());
                result.complete(clock.now());
                return result;
            }
        };
        info!(url = %search_url, "Search URL ready");

        let opts = CollectOptions {
            max_pages: req.max_pages,
            max_links: req.max_urls,
            delay_secs: req.request_delay,
            type_filter: req.type_filter,
            ..CollectOptions::default()
        };
        result.urls = self.pipeline.links.collect_from_search(&search_url, &opts).await;
        info!(count = result.urls.len(), "Link collection finished");

        if req.extract_content && !result.urls.is_empty() {
            let picks = req.mode.pick(result.urls.len(), req.content_limit);
            let urls: Vec<&str> = picks.iter().map(|&i| result.urls[i].url.as_str()).collect();
            info!(selected = urls.len(), of = result.urls.len(), mode = ?req.mode, "Extracting content");

            let articles = self.pipeline.extract_valid(&urls, req.content_delay).await;
            let attempted = urls.len();
            let skipped = attempted - articles.len();
            if skipped > 0 {
                result.add_error(
                    "invalid_content",
                    format!("{skipped} of {attempted} articles had no usable content"),
                    clock.now(),
                );
            }
            result.articles = articles;
            info!(count = result.articles.len(), "Content extraction finished");
        }

        result.complete(clock.now());
        info!(
            urls = result.urls.len(),
            articles = result.articles.len(),
            errors = result.errors.len(),
            secs = result.duration_secs(),
            "Crawl complete"
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CrawlerConfig;
    use crate::scrapers::links::page_url;
    use crate::search::Period;
    use crate::testing::{ManualClock, StaticPages};
    use chrono::NaiveDate;

    fn article_url(n: usize) -> String {
        format!("https://n.news.naver.com/mnews/article/001/{n:010}")
    }

    fn search_page(range: std::ops::Range<usize>) -> String {
        range
            .map(|n| {
                format!(
                    r#"<div class="news_wrap"><a href="{}">네이버뉴스</a>
                       <span>검색 결과로 나온 충분히 긴 기사 제목 번호 {n}</span></div>"#,
                    article_url(n)
                )
            })
            .collect()
    }

    fn article_page(n: usize) -> String {
        format!(
            r#"<h2 class="media_end_head_headline">기사 {n}</h2>
               <div id="newsct_article">{}</div>"#,
            "충분히 긴 본문 문장입니다. ".repeat(6)
        )
    }

    fn request(search: SearchQuery) -> CrawlRequest {
        CrawlRequest {
            search,
            period_label: "1w".into(),
            max_pages: 1,
            max_urls: 0,
            type_filter: None,
            extract_content: true,
            content_limit: 0,
            mode: SelectionMode::Sequential,
            request_delay: 1.0,
            content_delay: 1.5,
        }
    }

    fn setup(search: &SearchQuery, links: usize) -> (Arc<StaticPages>, NewsCrawler) {
        let pages = StaticPages::new();
        let url = search.build_url().unwrap();
        pages.page(&page_url(&url, 1), &search_page(0..links));
        for n in 0..links {
            pages.page(&article_url(n), &article_page(n));
        }
        let pipeline = Pipeline::new(&CrawlerConfig::default(), pages.clone(), ManualClock::new()).unwrap();
        (pages, NewsCrawler::new(Arc::new(pipeline)))
    }

    #[test]
    fn test_selection_modes() {
        assert_eq!(SelectionMode::Sequential.pick(10, 3), vec![0, 1, 2]);
        assert_eq!(SelectionMode::Balanced.pick(10, 3), vec![0, 3, 6]);
        assert_eq!(SelectionMode::Balanced.pick(4, 0), vec![0, 1, 2, 3]);
        assert_eq!(SelectionMode::Sequential.pick(2, 5), vec![0, 1]);
        assert_eq!(SelectionMode::from_name("Balanced"), SelectionMode::Balanced);
        assert_eq!(SelectionMode::from_name("whatever"), SelectionMode::Sequential);
    }

    #[tokio::test]
    async fn test_crawl_collects_and_extracts_balanced() {
        let search = SearchQuery::new("반도체").with_period(Period::Week);
        let (pages, crawler) = setup(&search, 6);
        let mut req = request(search);
        req.content_limit = 3;
        req.mode = SelectionMode::Balanced;

        let result = crawler.crawl(&req).await;
        assert_eq!(result.urls.len(), 6);
        let titles: Vec<&str> = result.articles.iter().map(|a| a.title.as_str()).collect();
        assert_eq!(titles, ["기사 0", "기사 2", "기사 4"]);
        assert!(result.errors.is_empty());
        assert!(result.end_time.is_some());
        assert!(!pages.requested().contains(&article_url(1)));
    }

    #[tokio::test]
    async fn test_crawl_without_content() {
        let search = SearchQuery::new("반도체");
        let (pages, crawler) = setup(&search, 4);
        let mut req = request(search);
        req.extract_content = false;
        req.max_urls = 2;

        let result = crawler.crawl(&req).await;
        assert_eq!(result.urls.len(), 2);
        assert!(result.articles.is_empty());
        assert_eq!(pages.requested().len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_articles_are_recorded() {
        let search = SearchQuery::new("반도체");
        let (pages, crawler) = setup(&search, 3);
        pages.page(&article_url(1), "<html><body>removed</body></html>");

        let result = crawler.crawl(&request(search)).await;
        assert_eq!(result.articles.len(), 2);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].kind, "invalid_content");
    }

    #[tokio::test]
    async fn test_bad_search_is_recorded_not_raised() {
        let day = |d| NaiveDate::from_ymd_opt(2025, 5, d).unwrap();
        let search = SearchQuery::new("q").with_period(Period::Custom { from: day(9), to: day(1) });
        let pages = StaticPages::new();
        let pipeline = Pipeline::new(&CrawlerConfig::default(), pages.clone(), ManualClock::new()).unwrap();
        let crawler = NewsCrawler::new(Arc::new(pipeline));

        let result = crawler.crawl(&request(search)).await;
        assert!(result.urls.is_empty());
        assert_eq!(result.errors[0].kind, "search_error");
        assert!(pages.requested().is_empty());
    }
}
