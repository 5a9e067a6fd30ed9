//! Collection runs.
//!
//! - [`crawl`]: one search over one period, links plus optional content.
//! - [`daily`]: one search per calendar day over a date range, with per-day
//!   failure containment and a final quota merge.
//! - [`merge`]: quota selection policies over a multi-day collection.
//!
//! Both run types share a [`Pipeline`]: the link collector, the article
//! extractor, and the sequential extraction loop that paces article fetches.

pub mod crawl;
pub mod daily;
pub mod merge;

use crate::config::{ConfigError, CrawlerConfig, CrawlingConfig};
use crate::models::ArticleRecord;
use crate::net::clock::{Clock, jittered};
use crate::net::fetcher::PageSource;
use crate::scrapers::article::ArticleExtractor;
use crate::scrapers::links::LinkExtractor;
use std::sync::Arc;
use tracing::{info, warn};

/// Random extra seconds added to every pause between article fetches.
const CONTENT_DELAY_JITTER_SECS: f64 = 0.5;

pub struct Pipeline {
    pub links: LinkExtractor,
    pub articles: ArticleExtractor,
    clock: Arc<dyn Clock>,
    crawling: CrawlingConfig,
    min_body_chars: usize,
}

impl Pipeline {
    pub fn new(config: &CrawlerConfig, source: Arc<dyn PageSource>, clock: Arc<dyn Clock>) -> Result<Self, ConfigError> {
        Ok(Self {
            links: LinkExtractor::new(source.clone(), clock.clone(), config.crawling.clone()),
            articles: ArticleExtractor::new(&config.extraction, source, clock.clone())?,
            clock,
            crawling: config.crawling.clone(),
            min_body_chars: config.extraction.min_content_length,
        })
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub fn crawling(&self) -> &CrawlingConfig {
        &self.crawling
    }

    /// Extract `urls` one after another, pausing `delay_secs` (plus jitter)
    /// between fetches, and keep only valid articles.
    pub async fn extract_valid(&self, urls: &[&str], delay_secs: f64) -> Vec<ArticleRecord> {
        let mut valid = Vec::with_capacity(urls.len());
        for (i, url) in urls.iter().enumerate() {
            if i > 0 {
                self.clock
                    .sleep(jittered(delay_secs, CONTENT_DELAY_JITTER_SECS))
                    .await;
            }
            info!(n = i + 1, of = urls.len(), %url, "Extracting article");
            let record = self.articles.extract(url).await;
            if record.is_valid(self.min_body_chars) {
                valid.push(record);
            } else {
                warn!(%url, "Extracted content is not valid; skipping");
            }
        }
        valid
    }
}
