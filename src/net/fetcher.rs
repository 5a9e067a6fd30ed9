//! Block-aware page fetching.
//!
//! [`Fetcher::fetch`] runs a bounded retry loop over pooled sessions:
//!
//! - **403**: the session is reported (and parked by the pool), then the loop
//!   waits `min(30 + attempt * 20, cap)` seconds before trying again on
//!   whichever session the pool hands out next.
//! - **other HTTP errors / network errors**: wait `backoff_base ^ attempt`
//!   seconds and retry.
//!
//! Exhausting the attempts is an ordinary return value: callers treat the
//! URL as unreachable for now and carry on.

use crate::config::NetworkConfig;
use crate::net::clock::Clock;
use crate::net::session_pool::SessionPool;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, instrument, warn};

/// Why a fetch gave up.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchFailure {
    #[error("blocked by the server (HTTP 403)")]
    Blocked,

    #[error("HTTP error {0}")]
    HttpError(u16),

    #[error("network error: {0}")]
    NetworkError(String),
}

pub type FetchResult = Result<String, FetchFailure>;

/// Anything that can turn a URL into page text.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch(&self, url: &str) -> FetchResult;
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchSettings {
    pub retries: u32,
    pub backoff_base: f64,
    pub progressive_backoff: bool,
    pub progressive_cap: Duration,
}

impl From<&NetworkConfig> for FetchSettings {
    fn from(network: &NetworkConfig) -> Self {
        Self {
            retries: network.retries,
            backoff_base: network.backoff_base,
            progressive_backoff: network.progressive_backoff,
            progressive_cap: Duration::from_secs(network.progressive_backoff_cap_secs),
        }
    }
}

impl FetchSettings {
    /// Wait before retrying after a non-403 failure on `attempt` (0-based),
    /// never longer than `progressive_cap`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        Duration::try_from_secs_f64(self.backoff_base.powi(exponent))
            .unwrap_or(Duration::MAX)
            .min(self.progressive_cap)
    }

    /// Wait before retrying after a 403 on `attempt` (0-based).
    pub fn block_backoff(&self, attempt: u32) -> Duration {
        if !self.progressive_backoff {
            return self.backoff(attempt);
        }
        let secs = 30 + u64::from(attempt) * 20;
        Duration::from_secs(secs).min(self.progressive_cap)
    }
}

/// From this many 403s within a single fetch on, every further 403 rebuilds
/// the session that received it.
const REFRESH_AFTER_BLOCKS: u32 = 2;

#[derive(Debug)]
pub struct Fetcher {
    pool: Arc<SessionPool>,
    clock: Arc<dyn Clock>,
    settings: FetchSettings,
}

impl Fetcher {
    pub fn new(pool: Arc<SessionPool>, clock: Arc<dyn Clock>, settings: FetchSettings) -> Self {
        Self {
            pool,
            clock,
            settings,
        }
    }

    #[cfg(test)]
    pub fn pool(&self) -> &SessionPool {
        &self.pool
    }

    #[instrument(level = "info", skip(self))]
    pub async fn fetch(&self, url: &str) -> FetchResult {
        let t0 = Instant::now();
        let attempts = self.settings.retries.max(1);
        let mut failure = FetchFailure::NetworkError("no attempt made".into());
        let mut blocks = 0;

        for attempt in 0..attempts {
            let remaining = attempt + 1 < attempts;
            let lease = self.pool.acquire().await;

            let delay = match lease.get(url).await {
                Ok(resp) if resp.is_success() => {
                    self.pool.report(&lease, resp.status);
                    debug!(
                        attempt,
                        session = lease.id(),
                        elapsed_ms = t0.elapsed().as_millis() as u64,
                        "Fetched page"
                    );
                    return Ok(resp.body);
                }
                Ok(resp) if resp.status == 403 => {
                    self.pool.report(&lease, resp.status);
                    blocks += 1;
                    failure = FetchFailure::Blocked;
                    warn!(attempt, session = lease.id(), "403 Forbidden; request was blocked");
                    if remaining && blocks >= REFRESH_AFTER_BLOCKS {
                        if let Err(e) = self.pool.refresh(lease.id()).await {
                            warn!(session = lease.id(), error = %e, "Session refresh failed");
                        }
                    }
                    self.settings.block_backoff(attempt)
                }
                Ok(resp) => {
                    self.pool.report(&lease, resp.status);
                    failure = FetchFailure::HttpError(resp.status);
                    warn!(attempt, max = attempts, status = resp.status, "HTTP error");
                    self.settings.backoff(attempt)
                }
                Err(e) => {
                    failure = FetchFailure::NetworkError(e.to_string());
                    warn!(attempt, max = attempts, error = %e, "Request failed");
                    self.settings.backoff(attempt)
                }
            };

            if remaining {
                debug!(attempt, ?delay, "Backing off before retry");
                self.clock.sleep(delay).await;
            }
        }

        error!(
            attempts,
            elapsed_ms = t0.elapsed().as_millis() as u64,
            error = %failure,
            "Fetch exhausted retries"
        );
        Err(failure)
    }
}

#[async_trait]
impl PageSource for Fetcher {
    async fn fetch(&self, url: &str) -> FetchResult {
        Fetcher::fetch(self, url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use crate::testing::{ManualClock, Reply, ScriptedSessions};

    const URL: &str = "https://n.news.naver.com/mnews/article/001/0000000001";

    fn settings(retries: u32) -> FetchSettings {
        FetchSettings {
            retries,
            backoff_base: 2.0,
            progressive_backoff: true,
            progressive_cap: Duration::from_secs(120),
        }
    }

    async fn fetcher(
        sessions: &Arc<ScriptedSessions>,
        clock: &Arc<ManualClock>,
        pool_size: usize,
        retries: u32,
    ) -> Fetcher {
        let config = SessionConfig {
            pool_size,
            warmup_urls: Vec::new(),
            ..SessionConfig::default()
        };
        let pool = SessionPool::build(config, sessions.clone(), clock.clone())
            .await
            .unwrap();
        Fetcher::new(Arc::new(pool), clock.clone(), settings(retries))
    }

    #[test]
    fn test_block_backoff_schedule() {
        let s = settings(5);
        assert_eq!(s.block_backoff(0), Duration::from_secs(30));
        assert_eq!(s.block_backoff(1), Duration::from_secs(50));
        assert_eq!(s.block_backoff(4), Duration::from_secs(110));
        assert_eq!(s.block_backoff(9), Duration::from_secs(120));

        let flat = FetchSettings {
            progressive_backoff: false,
            ..settings(5)
        };
        assert_eq!(flat.block_backoff(2), Duration::from_secs(4));
    }

    #[test]
    fn test_exponential_backoff() {
        let s = settings(5);
        assert_eq!(s.backoff(0), Duration::from_secs(1));
        assert_eq!(s.backoff(1), Duration::from_secs(2));
        assert_eq!(s.backoff(3), Duration::from_secs(8));
        assert_eq!(s.backoff(65), Duration::from_secs(120));

        let huge = FetchSettings {
            backoff_base: 1e10,
            ..settings(3)
        };
        assert_eq!(huge.backoff(1), Duration::from_secs(120));
        assert_eq!(huge.backoff(400), Duration::from_secs(120));
    }

    #[tokio::test]
    async fn test_huge_backoff_base_is_capped_not_fatal() {
        let config = crate::config::CrawlerConfig::from_yaml_str("network:\n  retries: 3\n  backoff_base: 1e10\n").unwrap();
        let clock = ManualClock::new();
        let sessions = ScriptedSessions::new();
        sessions.respond(URL, 503, "");
        let pool = SessionPool::build(
            SessionConfig {
                pool_size: 1,
                warmup_urls: Vec::new(),
                ..SessionConfig::default()
            },
            sessions.clone(),
            clock.clone(),
        )
        .await
        .unwrap();
        let fetcher = Fetcher::new(Arc::new(pool), clock.clone(), FetchSettings::from(&config.network));

        assert_eq!(fetcher.fetch(URL).await, Err(FetchFailure::HttpError(503)));
        assert_eq!(
            clock.sleeps(),
            vec![Duration::from_secs(1), Duration::from_secs(120)]
        );
    }

    #[tokio::test]
    async fn test_two_blocks_then_success() {
        let clock = ManualClock::new();
        let sessions = ScriptedSessions::new();
        sessions.enqueue(URL, Reply::status(403, ""));
        sessions.enqueue(URL, Reply::status(403, ""));
        sessions.enqueue(URL, Reply::status(200, "<html>article</html>"));
        let fetcher = fetcher(&sessions, &clock, 3, 3).await;

        let body = fetcher.fetch(URL).await.unwrap();
        assert_eq!(body, "<html>article</html>");
        assert_eq!(
            clock.sleeps(),
            vec![Duration::from_secs(30), Duration::from_secs(50)]
        );
        assert_eq!(sessions.hits(URL), 3);

        let status = fetcher.pool().status();
        assert_eq!(status.blocked, 2);
        // each attempt went out on a different session
        assert!(status.sessions.iter().all(|s| s.request_count == 1));
    }

    #[tokio::test]
    async fn test_exhausted_blocks_return_blocked() {
        let clock = ManualClock::new();
        let sessions = ScriptedSessions::new();
        sessions.respond(URL, 403, "");
        let fetcher = fetcher(&sessions, &clock, 3, 3).await;

        assert_eq!(fetcher.fetch(URL).await, Err(FetchFailure::Blocked));
        // no sleep after the final attempt
        assert_eq!(clock.sleeps().len(), 2);
    }

    #[tokio::test]
    async fn test_server_error_uses_exponential_backoff() {
        let clock = ManualClock::new();
        let sessions = ScriptedSessions::new();
        sessions.respond(URL, 503, "");
        let fetcher = fetcher(&sessions, &clock, 1, 3).await;

        assert_eq!(fetcher.fetch(URL).await, Err(FetchFailure::HttpError(503)));
        assert_eq!(
            clock.sleeps(),
            vec![Duration::from_secs(1), Duration::from_secs(2)]
        );
        assert_eq!(fetcher.pool().status().blocked, 0);
    }

    #[tokio::test]
    async fn test_network_error_then_success() {
        let clock = ManualClock::new();
        let sessions = ScriptedSessions::new();
        sessions.enqueue(URL, Reply::NetworkError);
        sessions.enqueue(URL, Reply::status(200, "ok"));
        let fetcher = fetcher(&sessions, &clock, 1, 3).await;

        assert_eq!(fetcher.fetch(URL).await.as_deref(), Ok("ok"));
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(1)]);
    }

    #[tokio::test]
    async fn test_network_errors_exhaust() {
        let clock = ManualClock::new();
        let sessions = ScriptedSessions::new();
        sessions.fail(URL);
        let fetcher = fetcher(&sessions, &clock, 2, 2).await;

        assert!(matches!(
            fetcher.fetch(URL).await,
            Err(FetchFailure::NetworkError(_))
        ));
        assert_eq!(sessions.hits(URL), 2);
    }

    #[tokio::test]
    async fn test_repeated_blocks_refresh_session() {
        let clock = ManualClock::new();
        let sessions = ScriptedSessions::new();
        sessions.respond(URL, 403, "");
        let fetcher = fetcher(&sessions, &clock, 3, 3).await;

        let _ = fetcher.fetch(URL).await;
        // three at build time, one refresh after the second block
        assert_eq!(sessions.created(), 4);
    }

    #[tokio::test]
    async fn test_every_block_after_the_second_refreshes() {
        let clock = ManualClock::new();
        let sessions = ScriptedSessions::new();
        sessions.respond(URL, 403, "");
        let fetcher = fetcher(&sessions, &clock, 3, 4).await;

        assert_eq!(fetcher.fetch(URL).await, Err(FetchFailure::Blocked));
        // blocks two and three refresh; the last attempt has nothing left to retry
        assert_eq!(sessions.created(), 5);
    }
}
