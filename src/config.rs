//! Runtime configuration for the crawler.
//!
//! A [`CrawlerConfig`] is built once (from defaults or a YAML file) and handed
//! to each component's constructor. Every field has a default, so a config file
//! only needs to name the values it overrides:
//!
//! ```yaml
//! network:
//!   retries: 5
//! session:
//!   pool_size: 4
//! extraction:
//!   title:
//!     - { kind: plain, css: "h2.media_end_head_headline" }
//!   date:
//!     - { kind: attribute, css: "span.media_end_head_info_datestamp_time", attr: "data-date-time" }
//! ```

use crate::scrapers::selector::Selector;
use rand::{Rng, rng};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, instrument};

/// Errors raised while loading or validating configuration.
///
/// These are the only errors that escape a crawl run.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid CSS selector `{css}`: {reason}")]
    InvalidSelector { css: String, reason: String },

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    pub network: NetworkConfig,
    pub session: SessionConfig,
    pub crawling: CrawlingConfig,
    pub extraction: ExtractionConfig,
    pub storage: StorageConfig,
}

impl CrawlerConfig {
    /// Load configuration from `path`, or fall back to defaults when no path
    /// is given or the file does not exist.
    #[instrument(level = "info", skip_all, fields(path = ?path))]
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            info!("No config file given; using defaults");
            return Ok(Self::default());
        };
        if !path.exists() {
            info!("Config file not found; using defaults");
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_yaml_str(&text)?;
        info!("Loaded configuration");
        Ok(config)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session.pool_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "session.pool_size",
                reason: "must be at least 1".into(),
            });
        }
        if self.network.retries == 0 {
            return Err(ConfigError::InvalidValue {
                field: "network.retries",
                reason: "must be at least 1".into(),
            });
        }
        if self.network.backoff_base.is_nan() || self.network.backoff_base < 1.0 {
            return Err(ConfigError::InvalidValue {
                field: "network.backoff_base",
                reason: format!("{} is below 1.0", self.network.backoff_base),
            });
        }
        if self.extraction.max_content_length <= self.extraction.min_content_length {
            return Err(ConfigError::InvalidValue {
                field: "extraction.max_content_length",
                reason: "must exceed min_content_length".into(),
            });
        }
        if !(0.0..=1.0).contains(&self.crawling.similarity_threshold) {
            return Err(ConfigError::InvalidValue {
                field: "crawling.similarity_threshold",
                reason: "must be within 0.0..=1.0".into(),
            });
        }
        let (lo, hi) = self.session.warmup_pause_secs;
        if lo < 0.0 || hi < lo {
            return Err(ConfigError::InvalidValue {
                field: "session.warmup_pause_secs",
                reason: format!("({lo}, {hi}) is not a valid range"),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Total attempts per fetch.
    pub retries: u32,
    /// Base of the exponential backoff for non-403 failures.
    pub backoff_base: f64,
    /// Use the fixed progressive schedule after a 403 instead of the
    /// exponential one.
    pub progressive_backoff: bool,
    /// Upper bound on any single retry wait.
    pub progressive_backoff_cap_secs: u64,
    pub user_agents: Vec<String>,
    pub proxy_list: Vec<String>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            retries: 3,
            backoff_base: 2.0,
            progressive_backoff: true,
            progressive_backoff_cap_secs: 120,
            user_agents: vec![
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36".into(),
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/110.0.0.0 Safari/537.36".into(),
                "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/16.2 Safari/605.1.15".into(),
                "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/100.0.0.0 Safari/537.36".into(),
                "Mozilla/5.0 (X11; Ubuntu; Linux x86_64; rv:125.0) Gecko/20100101 Firefox/125.0".into(),
            ],
            proxy_list: Vec::new(),
        }
    }
}

impl NetworkConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Pick a user agent at random; `None` only when the list is empty.
    pub fn random_user_agent(&self) -> Option<&str> {
        if self.user_agents.is_empty() {
            return None;
        }
        let idx = rng().random_range(0..self.user_agents.len());
        Some(self.user_agents[idx].as_str())
    }

    pub fn random_proxy(&self) -> Option<&str> {
        if self.proxy_list.is_empty() {
            return None;
        }
        let idx = rng().random_range(0..self.proxy_list.len());
        Some(self.proxy_list[idx].as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub pool_size: usize,
    /// Pages each new session visits to pick up baseline cookies.
    pub warmup_urls: Vec<String>,
    /// Random pause range (seconds) between warm-up visits.
    pub warmup_pause_secs: (f64, f64),
    /// Upper bound on how long `acquire` waits for a cool-down to end.
    pub max_pool_wait_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            pool_size: 3,
            warmup_urls: vec![
                "https://www.naver.com".into(),
                "https://search.naver.com".into(),
            ],
            warmup_pause_secs: (0.5, 1.5),
            max_pool_wait_secs: 30 * 60,
        }
    }
}

impl SessionConfig {
    pub fn max_pool_wait(&self) -> Duration {
        Duration::from_secs(self.max_pool_wait_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlingConfig {
    /// Base delay (seconds) between search-result pages and between days.
    pub delay_between_requests: f64,
    /// Base delay (seconds) between article fetches.
    pub content_delay: f64,
    /// Stop paginating after this many failed or empty pages in a row.
    pub max_consecutive_empty_pages: usize,
    /// How many ancestors of a result link are searched for its title.
    pub title_ancestor_depth: usize,
    /// A text node must be longer than this to count as a title.
    pub min_title_chars: usize,
    /// Text containing any of these labels is never taken as a title.
    pub boilerplate_labels: Vec<String>,
    pub similarity_threshold: f64,
    pub day_delay_jitter_secs: f64,
}

impl Default for CrawlingConfig {
    fn default() -> Self {
        Self {
            delay_between_requests: 1.0,
            content_delay: 1.5,
            max_consecutive_empty_pages: 3,
            title_ancestor_depth: 5,
            min_title_chars: 20,
            boilerplate_labels: vec!["네이버뉴스".into()],
            similarity_threshold: 0.8,
            day_delay_jitter_secs: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    pub title: Vec<Selector>,
    pub press: Vec<Selector>,
    pub date: Vec<Selector>,
    pub body: Vec<Selector>,
    pub reporter: Vec<Selector>,
    /// Sub-elements removed from the body before its text is read.
    pub boilerplate_selectors: Vec<String>,
    pub min_content_length: usize,
    pub max_content_length: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        let plain = |css: &str| Selector::Plain(css.to_string());
        let attr = |css: &str, name: &str| Selector::WithAttribute(css.to_string(), name.to_string());
        Self {
            title: vec![
                plain("h2.media_end_head_headline"),
                plain("div.media_end_head_title .media_end_head_headline"),
                plain("#ct > div.media_end_head.go_trans > div.media_end_head_title > h2"),
                plain(".article_header h3"),
                plain(".content h3.tit_view"),
            ],
            press: vec![
                attr("a.media_end_head_top_logo img", "alt"),
                attr("div.press_logo img", "alt"),
                attr(".article_header .logo img", "alt"),
                attr(".press_logo_wrap img", "alt"),
            ],
            date: vec![
                attr("span.media_end_head_info_datestamp_time", "data-date-time"),
                attr("div.media_end_head_info_datestamp_time", "data-date-time"),
                attr("span.media_end_head_info_datestamp_time", "data-modify-date-time"),
                plain("div.article_info em"),
                plain(".article_header .date"),
                plain(".article_info span.time"),
            ],
            body: vec![
                plain("div#newsct_article"),
                plain("div#articleBodyContents"),
                plain("div.article_body_contents"),
                plain("div#articeBody"),
                plain("div.news_content"),
                plain("div.article_view_contents"),
                plain("#articleBody"),
            ],
            reporter: vec![
                plain(".media_end_head_journalist_name"),
                plain(".byline"),
                plain(".journalist"),
                plain(".article_footer .name"),
                plain(".reporter"),
            ],
            boilerplate_selectors: vec![
                ".ad_wrap".into(),
                ".link_news_relation".into(),
                "script".into(),
                "style".into(),
            ],
            min_content_length: 50,
            max_content_length: 20_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub news_data_dir: PathBuf,
    pub url_data_dir: PathBuf,
    /// Per-day intermediate artifacts.
    pub temp_dir: PathBuf,
    pub max_news_per_file: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            news_data_dir: PathBuf::from("data/news_data"),
            url_data_dir: PathBuf::from("data/url_data"),
            temp_dir: PathBuf::from("data/temp_daily"),
            max_news_per_file: 20,
        }
    }
}
