//! Article-link collection from search-result pages.
//!
//! A result page is scanned for anchors pointing at the portal's canonical
//! article pages (`n.news.naver.com/.../article/...`). Each link's title is
//! recovered from the surrounding result card: the first sufficiently long
//! text node among the link's container ancestors. Older markup without
//! canonical links is handled by a set of legacy title-anchor selectors,
//! consulted only when the canonical pass finds nothing on the page.

use crate::config::CrawlingConfig;
use crate::models::{LinkRecord, LinkType};
use crate::net::clock::{Clock, jittered};
use crate::net::fetcher::PageSource;
use crate::scrapers::selector::spaced_text;
use crate::utils::truncate_for_log;
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

static ARTICLE_LINK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"https?://n\.news\.naver\.com/.+/article/").expect("article link pattern")
});

static ANCHORS: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").expect("anchor selector"));

static LEGACY_TITLE_ANCHORS: Lazy<Vec<Selector>> = Lazy::new(|| {
    [
        "div.news_area a.news_tit[href]",
        "div.news_wrap a.news_tit[href]",
        "a.news_tit[href]",
    ]
    .iter()
    .map(|css| Selector::parse(css).expect("legacy selector"))
    .collect()
});

/// Results per search page; page `n` starts at result `(n - 1) * 10 + 1`.
pub const RESULTS_PER_PAGE: usize = 10;

/// Containers searched for a link's title.
const TITLE_CONTAINERS: [&str; 3] = ["div", "li", "article"];

/// `search_url` offset to the first result of `page` (1-based).
pub fn page_url(search_url: &str, page: usize) -> String {
    let start = page.saturating_sub(1) * RESULTS_PER_PAGE + 1;
    format!("{search_url}&start={start}")
}

pub fn is_article_link(url: &str) -> bool {
    ARTICLE_LINK.is_match(url)
}

/// Limits and filters for one [`LinkExtractor::collect_from_search`] call.
#[derive(Debug, Clone, Default)]
pub struct CollectOptions {
    /// Stop after this many pages; 0 means no page limit.
    pub max_pages: usize,
    /// Stop as soon as this many links are collected; 0 means no limit.
    pub max_links: usize,
    /// Base pause between pages, in seconds (up to one second of jitter is
    /// added).
    pub delay_secs: f64,
    pub type_filter: Option<LinkType>,
    /// Tag stamped on every collected link.
    pub search_date: Option<NaiveDate>,
    /// When set, a link whose title is similar (see [`is_similar_title`]) to
    /// an already collected title is dropped.
    pub similar_title_threshold: Option<f64>,
}

pub struct LinkExtractor {
    source: Arc<dyn PageSource>,
    clock: Arc<dyn Clock>,
    crawling: CrawlingConfig,
}

impl LinkExtractor {
    pub fn new(source: Arc<dyn PageSource>, clock: Arc<dyn Clock>, crawling: CrawlingConfig) -> Self {
        Self {
            source,
            clock,
            crawling,
        }
    }

    /// Parse one search-results page into links, in document order, with no
    /// url or title repeated.
    pub fn extract_links(&self, html: &str) -> Vec<LinkRecord> {
        let doc = Html::parse_document(html);
        let now = self.clock.now();
        let mut links = Vec::new();
        let mut seen_urls = HashSet::new();
        let mut seen_titles = HashSet::new();

        for anchor in doc.select(&ANCHORS) {
            let Some(href) = anchor.value().attr("href") else {
                continue;
            };
            if !is_article_link(href) || seen_urls.contains(href) {
                continue;
            }
            let title = self.resolve_title(anchor);
            if let Some(title) = &title {
                if !seen_titles.insert(title.clone()) {
                    debug!(%href, "Skipping link whose title already appeared on this page");
                    continue;
                }
            }
            seen_urls.insert(href.to_string());
            links.push(LinkRecord {
                url: href.to_string(),
                link_type: LinkType::Primary,
                title,
                search_date: None,
                collected_at: now,
            });
        }

        if links.is_empty() {
            debug!("No canonical article links; trying legacy result markup");
            for selector in LEGACY_TITLE_ANCHORS.iter() {
                for anchor in doc.select(selector) {
                    let Some(href) = anchor.value().attr("href") else {
                        continue;
                    };
                    if !seen_urls.insert(href.to_string()) {
                        continue;
                    }
                    let link_type = if is_article_link(href) {
                        LinkType::Primary
                    } else {
                        LinkType::Original
                    };
                    let title = spaced_text(anchor);
                    links.push(LinkRecord {
                        url: href.to_string(),
                        link_type,
                        title: (!title.is_empty()).then_some(title),
                        search_date: None,
                        collected_at: now,
                    });
                }
            }
        }

        debug!(count = links.len(), "Extracted links from page");
        links
    }

    /// First title-like text node in the nearest container ancestors of
    /// `anchor`.
    fn resolve_title(&self, anchor: ElementRef<'_>) -> Option<String> {
        let mut current = *anchor;
        for _ in 0..self.crawling.title_ancestor_depth {
            current = current.parent()?;
            let Some(container) = ElementRef::wrap(current) else {
                continue;
            };
            let name = container.value().name();
            if !TITLE_CONTAINERS.iter().any(|c| *c == name) {
                continue;
            }
            if let Some(text) = container
                .text()
                .map(str::trim)
                .find(|t| self.is_title_candidate(t))
            {
                return Some(text.to_string());
            }
        }
        None
    }

    fn is_title_candidate(&self, text: &str) -> bool {
        text.chars().count() > self.crawling.min_title_chars
            && !text.starts_with("http")
            && !self
                .crawling
                .boilerplate_labels
                .iter()
                .any(|label| text.contains(label.as_str()))
    }

    /// Walk the search result pages for `search_url`, collecting unique
    /// links until a limit is hit or the results look exhausted.
    ///
    /// # Arguments
    ///
    /// * `search_url` - Search URL without a `start` parameter
    /// * `opts` - Page/link limits, pacing, filters and tagging
    ///
    /// # Returns
    ///
    /// Links in discovery order. Fetch failures never abort the walk; they
    /// count toward the consecutive-empty-page limit.
    #[instrument(
        level = "info",
        skip_all,
        fields(max_pages = opts.max_pages, max_links = opts.max_links, day = ?opts.search_date)
    )]
    pub async fn collect_from_search(&self, search_url: &str, opts: &CollectOptions) -> Vec<LinkRecord> {
        let mut collected: Vec<LinkRecord> = Vec::new();
        let mut seen = HashSet::new();
        let mut page = 1;
        let mut empty_streak = 0;

        loop {
            let url = page_url(search_url, page);
            info!(page, url = %truncate_for_log(&url, 160), "Scanning search page");

            let added = match self.source.fetch(&url).await {
                Err(e) => {
                    warn!(page, error = %e, "Search page fetch failed");
                    0
                }
                Ok(html) => {
                    let mut found = self.extract_links(&html);
                    if let Some(filter) = opts.type_filter {
                        let before = found.len();
                        found.retain(|link| link.link_type == filter);
                        debug!(page, before, after = found.len(), filter = filter.as_str(), "Filtered by link type");
                    }

                    let mut added = 0;
                    for mut link in found {
                        if !seen.insert(link.url.clone()) {
                            debug!(url = %link.url, "Duplicate link skipped");
                            continue;
                        }
                        if let Some(threshold) = opts.similar_title_threshold {
                            if has_similar_title(&collected, &link, threshold) {
                                debug!(url = %link.url, "Near-duplicate title skipped");
                                continue;
                            }
                        }
                        link.search_date = opts.search_date;
                        collected.push(link);
                        added += 1;

                        if opts.max_links > 0 && collected.len() >= opts.max_links {
                            info!(page, total = collected.len(), "Link limit reached");
                            return collected;
                        }
                    }
                    added
                }
            };

            if added > 0 {
                info!(page, added, total = collected.len(), "New links collected");
                empty_streak = 0;
            } else {
                empty_streak += 1;
                debug!(page, empty_streak, "Page yielded no new links");
            }

            if empty_streak >= self.crawling.max_consecutive_empty_pages {
                info!(
                    pages = empty_streak,
                    total = collected.len(),
                    "Consecutive empty pages; assuming results are exhausted"
                );
                break;
            }
            if opts.max_pages > 0 && page >= opts.max_pages {
                info!(page, total = collected.len(), "Page limit reached");
                break;
            }

            page += 1;
            self.clock.sleep(jittered(opts.delay_secs, 1.0)).await;
        }

        collected
    }
}

fn has_similar_title(collected: &[LinkRecord], link: &LinkRecord, threshold: f64) -> bool {
    let Some(title) = link.title.as_deref() else {
        return false;
    };
    collected
        .iter()
        .filter_map(|c| c.title.as_deref())
        .any(|other| is_similar_title(title, other, threshold))
}

/// Whether two titles are near-duplicates.
///
/// Short titles (six characters or fewer) must match exactly; otherwise the
/// edit-distance similarity ratio must reach `threshold`.
pub fn is_similar_title(a: &str, b: &str, threshold: f64) -> bool {
    if a.is_empty() || b.is_empty() {
        return false;
    }
    if a.chars().count() <= 6 || b.chars().count() <= 6 {
        return a == b;
    }
    similarity_ratio(a, b) >= threshold
}

/// `1 - levenshtein(a, b) / max(len a, len b)`, over characters.
fn similarity_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let longest = a.len().max(b.len());
    if longest == 0 {
        return 1.0;
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut row = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        row[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = prev[j] + usize::from(ca != cb);
            row[j + 1] = substitution.min(prev[j + 1] + 1).min(row[j] + 1);
        }
        std::mem::swap(&mut prev, &mut row);
    }
    1.0 - prev[b.len()] as f64 / longest as f64
}
