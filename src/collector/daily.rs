//! Day-by-day collection over a date range.
//!
//! Each calendar day gets its own search pinned to that day, its own link
//! collection and content extraction, and its own [`DayResult`]. A day that
//! fails is recorded and the range carries on. After the last day the
//! collected articles can be cut down to a global quota (see
//! [`merge`](crate::collector::merge)).

use crate::collector::Pipeline;
use crate::collector::merge::{self, MergeMode};
use crate::models::{DatedArticle, DayResult, DayStatus};
use crate::net::clock::jittered;
use crate::outputs::json::{ArtifactWriter, OutputError};
use crate::scrapers::links::CollectOptions;
use crate::search::{NewsType, SearchError, SearchQuery, SortOrder};
use crate::utils::date_range;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// Whatever went wrong inside one day's cycle.
#[derive(Debug, thiserror::Error)]
pub enum DayError {
    #[error("search: {0}")]
    Search(#[from] SearchError),

    #[error("output: {0}")]
    Output(#[from] OutputError),
}

#[derive(Debug, Clone)]
pub struct DailyRequest {
    pub query: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub sort: SortOrder,
    pub news_type: NewsType,
    pub extract_content: bool,
    /// Global quota applied after the last day; 0 keeps everything.
    pub content_limit: usize,
    pub mode: MergeMode,
    /// Per-day cap on links (and therefore articles); 0 means no cap.
    pub daily_limit: usize,
    pub save_intermediate: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RangeStatus {
    /// Every day succeeded.
    Completed,
    /// Some days failed.
    Partial,
    /// No day succeeded.
    Failed,
}

/// The quota selection made at the end of a range.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergedSummary {
    pub mode: String,
    pub limit: usize,
    pub selected: usize,
    pub file: Option<PathBuf>,
}

/// Statistics of one date-range run, persisted under `stats/`.
#[derive(Debug, Clone, Serialize)]
pub struct RangeReport {
    pub query: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub total_days: usize,
    pub daily_results: Vec<DayResult>,
    pub total_urls: usize,
    pub total_contents: usize,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub elapsed_secs: f64,
    pub status: RangeStatus,
    pub merged: Option<MergedSummary>,
}

impl RangeReport {
    pub fn failed_days(&self) -> usize {
        self.daily_results
            .iter()
            .filter(|d| d.status == DayStatus::Failed)
            .count()
    }
}

pub struct DailyCollector {
    pipeline: Arc<Pipeline>,
    writer: ArtifactWriter,
}

impl DailyCollector {
    pub fn new(pipeline: Arc<Pipeline>, writer: ArtifactWriter) -> Self {
        Self { pipeline, writer }
    }

    /// One day's cycle: search, links, optional content, optional artifacts.
    #[instrument(level = "info", skip_all, fields(query = %req.query, %day))]
    pub async fn collect_single_day(
        &self,
        req: &DailyRequest,
        day: NaiveDate,
    ) -> Result<(DayResult, Vec<DatedArticle>), DayError> {
        let search_url = SearchQuery::for_day(req.query.as_str(), day, req.sort, req.news_type).build_url()?;
        let crawling = self.pipeline.crawling();

        let opts = CollectOptions {
            max_links: req.daily_limit,
            delay_secs: crawling.delay_between_requests,
            search_date: Some(day),
            ..CollectOptions::default()
        };
        let links = self.pipeline.links.collect_from_search(&search_url, &opts).await;
        info!(links = links.len(), "Links collected");

        let mut result = DayResult {
            date: day,
            status: DayStatus::Success,
            urls_collected: links.len(),
            contents_extracted: 0,
            url_file: None,
            content_file: None,
            error: None,
        };

        if req.save_intermediate && !links.is_empty() {
            result.url_file = Some(self.writer.write_day_links(&req.query, day, &links).await?);
        }

        let mut dated = Vec::new();
        if req.extract_content && !links.is_empty() {
            let cap = if req.daily_limit > 0 { req.daily_limit } else { links.len() };
            let urls: Vec<&str> = links.iter().take(cap).map(|l| l.url.as_str()).collect();
            let articles = self
                .pipeline
                .extract_valid(&urls, crawling.content_delay)
                .await;
            result.contents_extracted = articles.len();

            if req.save_intermediate && !articles.is_empty() {
                result.content_file = Some(self.writer.write_day_articles(&req.query, day, &articles).await?);
            }
            dated = articles
                .into_iter()
                .map(|article| DatedArticle { day, article })
                .collect();
        }

        info!(
            urls = result.urls_collected,
            contents = result.contents_extracted,
            "Day complete"
        );
        Ok((result, dated))
    }

    /// Run every day in `start..=end`, then apply the global quota.
    ///
    /// # Errors
    ///
    /// Only an inverted range is an error. Failures inside a day become a
    /// failed [`DayResult`]; artifact write failures after the last day are
    /// logged.
    #[instrument(level = "info", skip_all, fields(query = %req.query, start = %req.start, end = %req.end))]
    pub async fn collect_date_range(&self, req: &DailyRequest) -> Result<RangeReport, SearchError> {
        if req.start > req.end {
            return Err(SearchError::InvertedRange {
                from: req.start,
                to: req.end,
            });
        }
        let clock = self.pipeline.clock();
        let crawling = self.pipeline.crawling();
        let start_time = clock.now();
        let days = date_range(req.start, req.end);
        info!(days = days.len(), "Starting date range collection");

        let mut daily_results = Vec::with_capacity(days.len());
        let mut articles = Vec::new();
        for (i, day) in days.iter().enumerate() {
            if i > 0 {
                clock
                    .sleep(jittered(crawling.delay_between_requests, crawling.day_delay_jitter_secs))
                    .await;
            }
            info!(n = i + 1, of = days.len(), %day, "Collecting day");
            match self.collect_single_day(req, *day).await {
                Ok((result, dated)) => {
                    daily_results.push(result);
                    articles.extend(dated);
                }
                Err(e) => {
                    error!(%day, error = %e, "Day failed; continuing with the next one");
                    daily_results.push(DayResult::failed(*day, e.to_string()));
                }
            }
        }

        let mut merged = None;
        if req.extract_content && req.content_limit > 0 {
            let selection = MergeRequest {
                query: &req.query,
                start: req.start,
                end: req.end,
                limit: req.content_limit,
                mode: req.mode,
            };
            let summary = match merge_and_write(&self.writer, &selection, &articles).await {
                Ok(summary) => summary,
                Err(e) => {
                    error!(error = %e, "Could not write merged selection");
                    MergedSummary {
                        mode: req.mode.to_string(),
                        limit: req.content_limit,
                        selected: 0,
                        file: None,
                    }
                }
            };
            merged = Some(summary);
        }

        let failed = daily_results
            .iter()
            .filter(|d| d.status == DayStatus::Failed)
            .count();
        let status = if failed == 0 {
            RangeStatus::Completed
        } else if failed < daily_results.len() {
            RangeStatus::Partial
        } else {
            RangeStatus::Failed
        };

        let end_time = clock.now();
        let report = RangeReport {
            query: req.query.clone(),
            start_date: req.start,
            end_date: req.end,
            total_days: days.len(),
            total_urls: daily_results.iter().map(|d| d.urls_collected).sum(),
            total_contents: daily_results.iter().map(|d| d.contents_extracted).sum(),
            daily_results,
            start_time,
            end_time,
            elapsed_secs: (end_time - start_time).num_milliseconds() as f64 / 1000.0,
            status,
            merged,
        };

        if let Err(e) = self
            .writer
            .write_stats("daily_collection_stats", &req.query, &report, end_time)
            .await
        {
            warn!(error = %e, "Could not write range statistics");
        }
        info!(
            urls = report.total_urls,
            contents = report.total_contents,
            failed_days = failed,
            status = ?report.status,
            secs = report.elapsed_secs,
            "Date range collection complete"
        );
        Ok(report)
    }
}

/// A quota selection over `start..=end`.
#[derive(Debug, Clone, Copy)]
pub struct MergeRequest<'a> {
    pub query: &'a str,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub limit: usize,
    pub mode: MergeMode,
}

async fn merge_and_write(
    writer: &ArtifactWriter,
    req: &MergeRequest<'_>,
    articles: &[DatedArticle],
) -> Result<MergedSummary, OutputError> {
    let selected = merge::select(articles, req.limit, req.mode);
    let file = writer
        .write_merged(req.query, req.start, req.end, &selected)
        .await?;
    Ok(MergedSummary {
        mode: req.mode.to_string(),
        limit: req.limit,
        selected: selected.len(),
        file: Some(file),
    })
}

/// Rebuild the merged selection from the per-day content files an earlier
/// range run left in `temp_dir`, without touching the network. Days with no
/// saved file are skipped.
///
/// # Errors
///
/// A saved file that cannot be read or parsed, or a failed merged write.
#[instrument(level = "info", skip_all, fields(query = req.query, start = %req.start, end = %req.end))]
pub async fn merge_saved_days(writer: &ArtifactWriter, req: &MergeRequest<'_>) -> Result<MergedSummary, OutputError> {
    let mut articles = Vec::new();
    let mut days_found = 0;
    for day in date_range(req.start, req.end) {
        let path = writer.day_articles_path(req.query, day);
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            debug!(%day, path = %path.display(), "No saved contents for day");
            continue;
        }
        let saved = writer.read_day_articles(&path).await?;
        days_found += 1;
        articles.extend(saved.into_iter().map(|article| DatedArticle { day, article }));
    }
    info!(days = days_found, articles = articles.len(), "Loaded saved day contents");
    merge_and_write(writer, req, &articles).await
}
