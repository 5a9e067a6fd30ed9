//! # Naver News Crawler
//!
//! Collects Naver News search results, extracts article content, and keeps
//! going when the portal starts answering with 403s.
//!
//! ## Usage
//!
//! ```sh
//! naver_news_crawler crawl 반도체 --period 1m --extract-content
//! naver_news_crawler daily 반도체 --start-date 20250501 --end-date 20250531
//! ```
//!
//! ## Architecture
//!
//! 1. **Sessions**: a small pool of warmed-up cookie sessions, rotated least
//!    recently used first and cooled down when blocked
//! 2. **Fetching**: retries with backoff on top of the pool
//! 3. **Links**: result pages walked until they stop yielding new links
//! 4. **Content**: selector chains applied to each article page
//! 5. **Output**: JSON artifacts per day, per crawl and per merged range

use chrono::Duration as TimeDelta;
use clap::Parser;
use std::error::Error;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod cli;
mod collector;
mod config;
mod models;
mod net;
mod outputs;
mod scrapers;
mod search;
#[cfg(test)]
mod testing;
mod utils;

use cli::{Cli, Command, CrawlArgs, DailyArgs, MergeArgs};
use collector::Pipeline;
use collector::crawl::{CrawlRequest, NewsCrawler, SelectionMode};
use collector::daily::{DailyCollector, DailyRequest, MergeRequest, merge_saved_days};
use collector::merge::MergeMode;
use config::CrawlerConfig;
use net::{Clock, FetchSettings, Fetcher, ReqwestSessionFactory, SessionPool, SystemClock};
use outputs::json::ArtifactWriter;
use search::{Period, SearchQuery};
use utils::{ensure_writable_dir, truncate_for_log};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Cli::parse();

    // --- Tracing init ---
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("naver_news_crawler starting up");
    debug!(?args, "Parsed CLI arguments");

    let mut config = match CrawlerConfig::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            return Err(e.into());
        }
    };
    config.validate()?;
    args.command.apply_storage_overrides(&mut config.storage);

    // Early check: output directories must be writable before any request is made
    for dir in [&config.storage.news_data_dir, &config.storage.url_data_dir] {
        if let Err(e) = ensure_writable_dir(dir).await {
            error!(
                path = %dir.display(),
                error = %e,
                "Output directory is not writable (fix perms or choose a different path)"
            );
            return Err(e.into());
        }
    }

    let writer = ArtifactWriter::new(config.storage.clone());
    let pool = match &args.command {
        Command::Crawl(crawl) => {
            let (pool, pipeline, clock) = build_pipeline(&config).await?;
            run_crawl(crawl, &config, pipeline, &writer, clock.as_ref()).await?;
            Some(pool)
        }
        Command::Daily(daily) => {
            let (pool, pipeline, clock) = build_pipeline(&config).await?;
            run_daily(daily, pipeline, writer, clock.as_ref()).await?;
            Some(pool)
        }
        // Offline: no sessions are built.
        Command::Merge(merge) => {
            run_merge(merge, &writer).await?;
            None
        }
    };

    if let Some(pool) = pool {
        let status = pool.status();
        info!(
            pool_size = status.pool_size,
            available = status.available,
            blocked = status.blocked,
            "Session pool status"
        );
        for session in &status.sessions {
            debug!(
                id = session.id,
                requests = session.request_count,
                errors = session.error_count,
                blocked_until = ?session.blocked_until,
                "Session"
            );
        }
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "naver_news_crawler finished"
    );
    Ok(())
}

/// Warm up the session pool and wire the fetcher into a pipeline.
async fn build_pipeline(
    config: &CrawlerConfig,
) -> Result<(Arc<SessionPool>, Arc<Pipeline>, Arc<dyn Clock>), Box<dyn Error>> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let factory = Arc::new(ReqwestSessionFactory::new(config.network.clone()));
    let pool = Arc::new(SessionPool::build(config.session.clone(), factory, clock.clone()).await?);
    let fetcher = Arc::new(Fetcher::new(
        pool.clone(),
        clock.clone(),
        FetchSettings::from(&config.network),
    ));
    let pipeline = Arc::new(Pipeline::new(config, fetcher, clock.clone())?);
    Ok((pool, pipeline, clock))
}

async fn run_crawl(
    args: &CrawlArgs,
    config: &CrawlerConfig,
    pipeline: Arc<Pipeline>,
    writer: &ArtifactWriter,
    clock: &dyn Clock,
) -> Result<(), Box<dyn Error>> {
    let period = match (args.start_date, args.end_date) {
        (Some(from), Some(to)) => Period::custom(from, to)?,
        _ => args.period,
    };
    let search = SearchQuery::new(args.query.as_str())
        .with_sort(args.sort)
        .with_period(period)
        .with_news_type(args.news_type);
    info!(search = %search, "Starting crawl");

    let request = CrawlRequest {
        search,
        period_label: period.to_string(),
        max_pages: args.pages,
        max_urls: args.max_urls,
        type_filter: args.url_type.filter(),
        extract_content: args.extract_content,
        content_limit: args.content_limit,
        mode: SelectionMode::from_name(&args.extraction_mode),
        request_delay: args.delay.unwrap_or(config.crawling.delay_between_requests),
        content_delay: args.content_delay.unwrap_or(config.crawling.content_delay),
    };
    let result = NewsCrawler::new(pipeline).crawl(&request).await;
    for e in &result.errors {
        warn!(kind = %e.kind, message = %truncate_for_log(&e.message, 200), "Crawl error");
    }

    let artifacts = writer.write_crawl(&result, clock.now()).await?;
    info!(
        url_file = ?artifacts.url_file,
        batches = artifacts.article_files.len(),
        stats_file = ?artifacts.stats_file,
        "Crawl written"
    );
    Ok(())
}

async fn run_daily(
    args: &DailyArgs,
    pipeline: Arc<Pipeline>,
    writer: ArtifactWriter,
    clock: &dyn Clock,
) -> Result<(), Box<dyn Error>> {
    let (start, end) = match (args.start_date, args.end_date) {
        (Some(start), Some(end)) => (start, end),
        _ => {
            let end = clock.now().date_naive();
            let Some(days) = args.period.lookback_days() else {
                error!(period = %args.period, "Period cannot be turned into a date range; give --start-date and --end-date");
                return Err(format!("period {} has no date range", args.period).into());
            };
            (end - TimeDelta::days(days - 1), end)
        }
    };

    let request = DailyRequest {
        query: args.query.clone(),
        start,
        end,
        sort: args.sort,
        news_type: args.news_type,
        extract_content: !args.no_content,
        content_limit: args.content_limit,
        mode: MergeMode::from_name(&args.extraction_mode),
        daily_limit: args.daily_limit,
        save_intermediate: !args.no_intermediate,
    };
    info!(query = %request.query, %start, %end, "Starting daily collection");

    let report = DailyCollector::new(pipeline, writer).collect_date_range(&request).await?;
    if report.failed_days() > 0 {
        warn!(
            failed = report.failed_days(),
            of = report.total_days,
            "Some days failed; see the stats file for details"
        );
    }
    if let Some(merged) = &report.merged {
        info!(selected = merged.selected, mode = %merged.mode, file = ?merged.file, "Merged selection written");
    }
    info!(
        urls = report.total_urls,
        contents = report.total_contents,
        status = ?report.status,
        "Daily collection done"
    );
    Ok(())
}

async fn run_merge(args: &MergeArgs, writer: &ArtifactWriter) -> Result<(), Box<dyn Error>> {
    let req = MergeRequest {
        query: &args.query,
        start: args.start_date,
        end: args.end_date,
        limit: args.content_limit,
        mode: MergeMode::from_name(&args.extraction_mode),
    };
    info!(query = %args.query, start = %req.start, end = %req.end, "Merging saved day contents");
    let summary = merge_saved_days(writer, &req).await?;
    info!(selected = summary.selected, mode = %summary.mode, file = ?summary.file, "Merged selection written");
    Ok(())
}
