//! JSON artifact persistence.
//!
//! # Output Structure
//!
//! ```text
//! temp_dir/
//! ├── urls_{query}_{YYYYMMDD}.json        # per-day links: [{url, type, title}]
//! └── contents_{query}_{YYYYMMDD}.json    # per-day articles
//!
//! url_data_dir/
//! └── urls_{query}_{timestamp}.json       # single crawl links + metadata
//!
//! news_data_dir/
//! ├── news_{query}_{timestamp}_batch{n}.json
//! ├── merged_{query}_{start}_{end}.json   # quota selection over a range
//! └── stats/
//!     ├── crawl_stats_{query}_{timestamp}.json
//!     └── daily_collection_stats_{query}_{timestamp}.json
//! ```
//!
//! All files are pretty-printed UTF-8 JSON. `{query}` is the slugified
//! search text.

use crate::config::StorageConfig;
use crate::models::{ArticleRecord, CrawlResult, DatedArticle, LinkEntry, LinkRecord};
use crate::utils::slugify_query;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{error, info, instrument};

#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Files written for one single-range crawl.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CrawlArtifacts {
    pub url_file: Option<PathBuf>,
    pub article_files: Vec<PathBuf>,
    pub stats_file: Option<PathBuf>,
}

#[derive(Serialize)]
struct UrlFile<'a> {
    query: &'a str,
    period: &'a str,
    collection_timestamp: String,
    total_urls: usize,
    urls: Vec<LinkEntry>,
}

#[derive(Serialize)]
struct BatchMetadata<'a> {
    query: &'a str,
    period: &'a str,
    extraction_timestamp: &'a str,
    batch_number: usize,
    total_batches: usize,
    articles_in_batch: usize,
}

#[derive(Serialize)]
struct ArticleBatch<'a> {
    metadata: BatchMetadata<'a>,
    articles: &'a [ArticleRecord],
}

#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    storage: StorageConfig,
}

impl ArtifactWriter {
    pub fn new(storage: StorageConfig) -> Self {
        Self { storage }
    }

    /// Per-day link array in `temp_dir`.
    pub async fn write_day_links(
        &self,
        query: &str,
        day: NaiveDate,
        links: &[LinkRecord],
    ) -> Result<PathBuf, OutputError> {
        let path = self.storage.temp_dir.join(day_file_name("urls", query, day));
        let entries: Vec<LinkEntry> = links.iter().map(LinkRecord::to_entry).collect();
        write_json(&path, &entries).await?;
        Ok(path)
    }

    /// Per-day article array in `temp_dir`.
    pub async fn write_day_articles(
        &self,
        query: &str,
        day: NaiveDate,
        articles: &[ArticleRecord],
    ) -> Result<PathBuf, OutputError> {
        let path = self.day_articles_path(query, day);
        write_json(&path, articles).await?;
        Ok(path)
    }

    /// Where [`write_day_articles`](Self::write_day_articles) puts `day`.
    pub fn day_articles_path(&self, query: &str, day: NaiveDate) -> PathBuf {
        self.storage.temp_dir.join(day_file_name("contents", query, day))
    }

    /// Read back a per-day article array written by
    /// [`write_day_articles`](Self::write_day_articles).
    pub async fn read_day_articles(&self, path: &Path) -> Result<Vec<ArticleRecord>, OutputError> {
        let bytes = fs::read(path).await.map_err(|source| OutputError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// The merged selection of a date range, each article tagged with its
    /// `collection_date`.
    pub async fn write_merged(
        &self,
        query: &str,
        start: NaiveDate,
        end: NaiveDate,
        articles: &[DatedArticle],
    ) -> Result<PathBuf, OutputError> {
        let name = format!(
            "merged_{}_{}_{}.json",
            slugify_query(query),
            start.format("%Y%m%d"),
            end.format("%Y%m%d")
        );
        let path = self.storage.news_data_dir.join(name);
        write_json(&path, articles).await?;
        Ok(path)
    }

    /// Run statistics under `news_data_dir/stats`.
    pub async fn write_stats<T: Serialize + ?Sized>(
        &self,
        prefix: &str,
        query: &str,
        stats: &T,
        at: DateTime<Utc>,
    ) -> Result<PathBuf, OutputError> {
        let name = format!(
            "{prefix}_{}_{}.json",
            slugify_query(query),
            at.format("%Y%m%d_%H%M%S")
        );
        let path = self.storage.news_data_dir.join("stats").join(name);
        write_json(&path, stats).await?;
        Ok(path)
    }

    /// Persist a single crawl: its links, its articles in batches of
    /// `max_news_per_file`, and its summary stats.
    #[instrument(level = "info", skip_all, fields(query = %result.query))]
    pub async fn write_crawl(&self, result: &CrawlResult, at: DateTime<Utc>) -> Result<CrawlArtifacts, OutputError> {
        let stamp = at.format("%Y%m%d%H%M%S").to_string();
        let slug = slugify_query(&result.query);
        let mut artifacts = CrawlArtifacts::default();

        if !result.urls.is_empty() {
            let path = self.storage.url_data_dir.join(format!("urls_{slug}_{stamp}.json"));
            let file = UrlFile {
                query: &result.query,
                period: &result.period,
                collection_timestamp: stamp.clone(),
                total_urls: result.urls.len(),
                urls: result.urls.iter().map(LinkRecord::to_entry).collect(),
            };
            write_json(&path, &file).await?;
            artifacts.url_file = Some(path);
        }

        let batch_size = self.storage.max_news_per_file.max(1);
        let total_batches = result.articles.len().div_ceil(batch_size);
        for (i, batch) in result.articles.chunks(batch_size).enumerate() {
            let batch_number = i + 1;
            let path = self
                .storage
                .news_data_dir
                .join(format!("news_{slug}_{stamp}_batch{batch_number}.json"));
            let file = ArticleBatch {
                metadata: BatchMetadata {
                    query: &result.query,
                    period: &result.period,
                    extraction_timestamp: &stamp,
                    batch_number,
                    total_batches,
                    articles_in_batch: batch.len(),
                },
                articles: batch,
            };
            write_json(&path, &file).await?;
            artifacts.article_files.push(path);
        }

        artifacts.stats_file = Some(
            self.write_stats("crawl_stats", &result.query, &result.stats(), at)
                .await?,
        );
        info!(
            url_file = ?artifacts.url_file,
            batches = artifacts.article_files.len(),
            "Wrote crawl artifacts"
        );
        Ok(artifacts)
    }
}

fn day_file_name(kind: &str, query: &str, day: NaiveDate) -> String {
    format!("{kind}_{}_{}.json", slugify_query(query), day.format("%Y%m%d"))
}

/// Serialize `value` as pretty JSON to `path`, creating parent directories.
async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), OutputError> {
    let json = serde_json::to_vec_pretty(value)?;
    if let Some(dir) = path.parent() {
        if let Err(e) = fs::create_dir_all(dir).await {
            error!(dir = %dir.display(), error = %e, "Failed to create output dir");
            return Err(OutputError::Io {
                path: dir.to_path_buf(),
                source: e,
            });
        }
    }
    fs::write(path, json).await.map_err(|source| OutputError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    info!(path = %path.display(), "Wrote JSON");
    Ok(())
}
