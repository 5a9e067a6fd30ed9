//! Time source and sleeping.
//!
//! All waiting in the crawler (backoff, pagination delays, cool-down waits)
//! goes through a [`Clock`] so it can be observed and skipped in tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::{Rng, rng};
use std::fmt;
use std::time::Duration;

#[async_trait]
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> DateTime<Utc>;

    async fn sleep(&self, duration: Duration);
}

/// Wall-clock time and real timers.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// `base_secs` plus a uniform random `0..=jitter_secs`.
pub fn jittered(base_secs: f64, jitter_secs: f64) -> Duration {
    let jitter = if jitter_secs > 0.0 {
        rng().random_range(0.0..=jitter_secs)
    } else {
        0.0
    };
    Duration::from_secs_f64((base_secs + jitter).max(0.0))
}

/// Uniform random duration within `lo..=hi` seconds.
pub fn between(lo: f64, hi: f64) -> Duration {
    jittered(lo, hi - lo)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jittered_stays_in_range() {
        for _ in 0..100 {
            let d = jittered(1.0, 0.5);
            assert!(d >= Duration::from_secs(1));
            assert!(d <= Duration::from_millis(1500));
        }
    }

    #[test]
    fn test_zero_jitter_is_exact() {
        assert_eq!(jittered(2.0, 0.0), Duration::from_secs(2));
        assert_eq!(between(3.0, 3.0), Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_system_clock_sleeps() {
        let clock = SystemClock;
        let before = clock.now();
        clock.sleep(Duration::from_millis(5)).await;
        assert!(clock.now() >= before);
    }
}
