//! Command-line interface definitions.
//!
//! Subcommands share the global `--config` and `--verbose` flags: `crawl`
//! runs one search over one period, `daily` runs one search per calendar day
//! over a date range, and `merge` redoes a range's quota selection from the
//! per-day files a `daily` run saved.

use crate::config::StorageConfig;
use crate::models::LinkType;
use crate::search::{NewsType, Period, SortOrder};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Command-line arguments for the crawler.
///
/// # Examples
///
/// ```sh
/// # Links and content for the past week, 30 articles spread over the results
/// naver_news_crawler crawl 반도체 --period 1w --extract-content \
///     --content-limit 30 --extraction-mode balanced
///
/// # One search per day for May, at most 50 articles per day
/// naver_news_crawler daily 반도체 --start-date 20250501 --end-date 20250531 \
///     --daily-limit 50 --content-limit 200 --extraction-mode even_distribution
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Optional path to a config.yaml file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Search once over a period, collect links and optionally their content
    Crawl(CrawlArgs),
    /// Search day by day over a date range and merge the results
    Daily(DailyArgs),
    /// Merge saved per-day content files without fetching anything
    Merge(MergeArgs),
}

/// Which result links to keep.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum UrlType {
    All,
    Naver,
    Original,
}

impl UrlType {
    pub fn filter(self) -> Option<LinkType> {
        match self {
            UrlType::All => None,
            UrlType::Naver => Some(LinkType::Primary),
            UrlType::Original => Some(LinkType::Original),
        }
    }
}

#[derive(Args, Debug)]
pub struct CrawlArgs {
    /// Search text
    pub query: String,

    /// Relative period: all, 1h, 1d, 1w, 1m, 3m, 6m, 1y
    #[arg(short, long, default_value = "1w")]
    pub period: Period,

    /// Start of a custom period (YYYYMMDD); overrides --period
    #[arg(long, value_parser = parse_date, requires = "end_date")]
    pub start_date: Option<NaiveDate>,

    /// End of a custom period (YYYYMMDD)
    #[arg(long, value_parser = parse_date, requires = "start_date")]
    pub end_date: Option<NaiveDate>,

    /// relevance, recent or oldest
    #[arg(short, long, default_value = "relevance")]
    pub sort: SortOrder,

    /// all, photo, video, print, press_release or auto
    #[arg(long = "type", default_value = "all")]
    pub news_type: NewsType,

    /// Maximum number of result pages to walk
    #[arg(long, default_value_t = 10)]
    pub pages: usize,

    /// Stop after this many links (0 = no limit)
    #[arg(long, default_value_t = 0)]
    pub max_urls: usize,

    #[arg(long, value_enum, default_value_t = UrlType::All)]
    pub url_type: UrlType,

    /// Fetch each article and extract its content
    #[arg(long)]
    pub extract_content: bool,

    /// Extract content for at most this many links (0 = all)
    #[arg(long, default_value_t = 0)]
    pub content_limit: usize,

    /// sequential or balanced
    #[arg(long, default_value = "sequential")]
    pub extraction_mode: String,

    /// Seconds between result pages (defaults to the config value)
    #[arg(long)]
    pub delay: Option<f64>,

    /// Seconds between article fetches (defaults to the config value)
    #[arg(long)]
    pub content_delay: Option<f64>,

    /// Directory for article batches and stats
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Directory for the link file
    #[arg(long)]
    pub url_output: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct DailyArgs {
    /// Search text
    pub query: String,

    /// First day (YYYYMMDD)
    #[arg(long, value_parser = parse_date, requires = "end_date")]
    pub start_date: Option<NaiveDate>,

    /// Last day (YYYYMMDD)
    #[arg(long, value_parser = parse_date, requires = "start_date")]
    pub end_date: Option<NaiveDate>,

    /// Range ending today, used when no dates are given: 1w, 1m, 3m, 6m, 1y
    #[arg(short, long, default_value = "1w")]
    pub period: Period,

    /// relevance, recent or oldest
    #[arg(short, long, default_value = "relevance")]
    pub sort: SortOrder,

    /// all, photo, video, print, press_release or auto
    #[arg(long = "type", default_value = "all")]
    pub news_type: NewsType,

    /// Links (and articles) per day (0 = no limit)
    #[arg(long, default_value_t = 0)]
    pub daily_limit: usize,

    /// Articles kept after merging all days (0 = keep all)
    #[arg(long, default_value_t = 0)]
    pub content_limit: usize,

    /// sequential, recent_first or even_distribution
    #[arg(long, default_value = "sequential")]
    pub extraction_mode: String,

    /// Do not write per-day link and content files
    #[arg(long)]
    pub no_intermediate: bool,

    /// Collect links only
    #[arg(long)]
    pub no_content: bool,

    /// Directory for merged output and stats
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct MergeArgs {
    /// Search text the days were collected for
    pub query: String,

    /// First day (YYYYMMDD)
    #[arg(long, value_parser = parse_date)]
    pub start_date: NaiveDate,

    /// Last day (YYYYMMDD)
    #[arg(long, value_parser = parse_date)]
    pub end_date: NaiveDate,

    /// Articles to keep
    #[arg(long)]
    pub content_limit: usize,

    /// sequential, recent_first or even_distribution
    #[arg(long, default_value = "even_distribution")]
    pub extraction_mode: String,

    /// Directory for the merged file
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl Command {
    /// Apply the output directory flags to the storage section.
    pub fn apply_storage_overrides(&self, storage: &mut StorageConfig) {
        match self {
            Command::Crawl(args) => {
                if let Some(dir) = &args.output {
                    storage.news_data_dir = dir.clone();
                }
                if let Some(dir) = &args.url_output {
                    storage.url_data_dir = dir.clone();
                }
            }
            Command::Daily(DailyArgs { output, .. }) | Command::Merge(MergeArgs { output, .. }) => {
                if let Some(dir) = output {
                    storage.news_data_dir = dir.clone();
                }
            }
        }
    }
}

/// Parse `YYYYMMDD` (or `YYYY-MM-DD`).
fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y%m%d")
        .or_else(|_| NaiveDate::parse_from_str(s, "%Y-%m-%d"))
        .map_err(|_| format!("`{s}` is not a date in YYYYMMDD form"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, m, d).unwrap()
    }

    #[test]
    fn test_crawl_defaults() {
        let cli = Cli::parse_from(["naver_news_crawler", "crawl", "반도체"]);
        assert!(!cli.verbose);
        let Command::Crawl(args) = cli.command else {
            panic!("expected crawl");
        };
        assert_eq!(args.query, "반도체");
        assert_eq!(args.period, Period::Week);
        assert_eq!(args.sort, SortOrder::Relevance);
        assert_eq!(args.pages, 10);
        assert_eq!(args.url_type.filter(), None);
        assert!(!args.extract_content);
        assert_eq!(args.start_date, None);
    }

    #[test]
    fn test_crawl_full_flags() {
        let cli = Cli::parse_from([
            "naver_news_crawler",
            "crawl",
            "AI",
            "--start-date",
            "20250501",
            "--end-date",
            "2025-05-31",
            "--sort",
            "recent",
            "--type",
            "photo",
            "--url-type",
            "original",
            "--extract-content",
            "--content-limit",
            "30",
            "--extraction-mode",
            "balanced",
            "--delay",
            "2.5",
            "--output",
            "/tmp/news",
            "--config",
            "crawler.yaml",
            "-v",
        ]);
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("crawler.yaml")));
        let Command::Crawl(args) = &cli.command else {
            panic!("expected crawl");
        };
        assert_eq!(args.start_date, Some(day(5, 1)));
        assert_eq!(args.end_date, Some(day(5, 31)));
        assert_eq!(args.news_type, NewsType::Photo);
        assert_eq!(args.url_type.filter(), Some(LinkType::Original));
        assert_eq!(args.content_limit, 30);
        assert_eq!(args.delay, Some(2.5));

        let mut storage = StorageConfig::default();
        cli.command.apply_storage_overrides(&mut storage);
        assert_eq!(storage.news_data_dir, PathBuf::from("/tmp/news"));
        assert_eq!(storage.url_data_dir, StorageConfig::default().url_data_dir);
    }

    #[test]
    fn test_daily_flags() {
        let cli = Cli::parse_from([
            "naver_news_crawler",
            "daily",
            "반도체",
            "--start-date",
            "20250501",
            "--end-date",
            "20250507",
            "--daily-limit",
            "50",
            "--no-intermediate",
        ]);
        let Command::Daily(args) = cli.command else {
            panic!("expected daily");
        };
        assert_eq!(args.daily_limit, 50);
        assert!(args.no_intermediate);
        assert!(!args.no_content);
        assert_eq!(args.extraction_mode, "sequential");
    }

    #[test]
    fn test_merge_flags() {
        let cli = Cli::parse_from([
            "naver_news_crawler",
            "merge",
            "반도체",
            "--start-date",
            "20250501",
            "--end-date",
            "20250507",
            "--content-limit",
            "100",
            "-o",
            "/tmp/merged",
        ]);
        let Command::Merge(args) = &cli.command else {
            panic!("expected merge");
        };
        assert_eq!(args.start_date, day(5, 1));
        assert_eq!(args.content_limit, 100);
        assert_eq!(args.extraction_mode, "even_distribution");

        let mut storage = StorageConfig::default();
        cli.command.apply_storage_overrides(&mut storage);
        assert_eq!(storage.news_data_dir, PathBuf::from("/tmp/merged"));
        assert!(Cli::try_parse_from(["naver_news_crawler", "merge", "q", "--start-date", "20250501"]).is_err());
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(Cli::try_parse_from(["naver_news_crawler", "crawl", "q", "--period", "2w"]).is_err());
        assert!(Cli::try_parse_from(["naver_news_crawler", "crawl", "q", "--start-date", "20250501"]).is_err());
        assert!(Cli::try_parse_from(["naver_news_crawler", "daily", "q", "--start-date", "May 1", "--end-date", "20250502"]).is_err());
    }
}
