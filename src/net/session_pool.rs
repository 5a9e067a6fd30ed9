//! Pool of HTTP sessions with block-aware cool-downs.
//!
//! Each session carries its own cookies. When a session receives a 403 it is
//! parked for `min(errors * 5, 30)` minutes; `acquire` hands out the
//! least-recently-used session that is not parked. All bookkeeping happens
//! under one mutex, and the lock is never held across an await.

use crate::config::SessionConfig;
use crate::net::clock::{Clock, between};
use crate::net::transport::{HttpResponse, HttpSession, SessionFactory, TransportError};
use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{info, instrument, warn};

const BLOCK_MINUTES_PER_ERROR: i64 = 5;
const MAX_BLOCK_MINUTES: i64 = 30;

/// Cool-down after the `error_count`-th 403.
pub fn cooldown_for(error_count: u32) -> TimeDelta {
    TimeDelta::minutes((i64::from(error_count) * BLOCK_MINUTES_PER_ERROR).min(MAX_BLOCK_MINUTES))
}

#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("session pool needs at least one session")]
    Empty,

    #[error("failed to create session {id}: {source}")]
    Create {
        id: usize,
        #[source]
        source: TransportError,
    },

    #[error("no session with id {0}")]
    UnknownSession(usize),
}

struct SessionInfo {
    id: usize,
    session: Arc<dyn HttpSession>,
    created_at: DateTime<Utc>,
    last_used: DateTime<Utc>,
    request_count: u64,
    error_count: u32,
    last_error: Option<u16>,
    blocked_until: Option<DateTime<Utc>>,
}

impl SessionInfo {
    fn new(id: usize, session: Arc<dyn HttpSession>, now: DateTime<Utc>) -> Self {
        Self {
            id,
            session,
            created_at: now,
            last_used: now,
            request_count: 0,
            error_count: 0,
            last_error: None,
            blocked_until: None,
        }
    }

    /// Clears an elapsed cool-down as a side effect.
    fn is_available(&mut self, now: DateTime<Utc>) -> bool {
        match self.blocked_until {
            None => true,
            Some(until) if now >= until => {
                self.blocked_until = None;
                self.error_count = 0;
                info!(session = self.id, "Session cool-down elapsed");
                true
            }
            Some(_) => false,
        }
    }

    /// Ordering used for rotation: oldest use first, then fewest requests.
    fn lru_key(&self) -> (DateTime<Utc>, u64, usize) {
        (self.last_used, self.request_count, self.id)
    }

    fn mark_used(&mut self, now: DateTime<Utc>) {
        self.last_used = now;
        self.request_count += 1;
    }

    fn mark_blocked(&mut self, now: DateTime<Utc>) -> TimeDelta {
        self.error_count += 1;
        self.last_error = Some(403);
        let cooldown = cooldown_for(self.error_count);
        self.blocked_until = Some(now + cooldown);
        cooldown
    }

    fn lease(&self) -> SessionLease {
        SessionLease {
            id: self.id,
            session: Arc::clone(&self.session),
        }
    }
}

/// Temporary right to issue requests through one pooled session.
#[derive(Clone)]
pub struct SessionLease {
    id: usize,
    session: Arc<dyn HttpSession>,
}

impl fmt::Debug for SessionLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionLease").field("id", &self.id).finish()
    }
}

impl SessionLease {
    pub fn id(&self) -> usize {
        self.id
    }

    pub async fn get(&self, url: &str) -> Result<HttpResponse, TransportError> {
        self.session.get(url).await
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    pub id: usize,
    pub created_at: DateTime<Utc>,
    pub last_used: DateTime<Utc>,
    pub request_count: u64,
    pub error_count: u32,
    pub last_error: Option<u16>,
    pub blocked_until: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolStatus {
    pub pool_size: usize,
    pub available: usize,
    pub blocked: usize,
    pub sessions: Vec<SessionStatus>,
}

pub struct SessionPool {
    sessions: Mutex<Vec<SessionInfo>>,
    factory: Arc<dyn SessionFactory>,
    clock: Arc<dyn Clock>,
    config: SessionConfig,
}

impl fmt::Debug for SessionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionPool")
            .field("pool_size", &self.config.pool_size)
            .finish()
    }
}

impl SessionPool {
    /// Create `config.pool_size` sessions, warming each one up before it is
    /// pooled. A failed warm-up is logged and the session is pooled anyway.
    #[instrument(level = "info", skip_all, fields(pool_size = config.pool_size))]
    pub async fn build(
        config: SessionConfig,
        factory: Arc<dyn SessionFactory>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, PoolError> {
        if config.pool_size == 0 {
            return Err(PoolError::Empty);
        }
        let pool = Self {
            sessions: Mutex::new(Vec::with_capacity(config.pool_size)),
            factory,
            clock,
            config,
        };
        for id in 0..pool.config.pool_size {
            let info = pool.open_session(id).await?;
            pool.lock().push(info);
        }
        info!("Session pool ready");
        Ok(pool)
    }

    async fn open_session(&self, id: usize) -> Result<SessionInfo, PoolError> {
        let session = self
            .factory
            .create(id)
            .map_err(|source| PoolError::Create { id, source })?;
        self.warm_up(id, session.as_ref()).await;
        Ok(SessionInfo::new(id, session, self.clock.now()))
    }

    async fn warm_up(&self, id: usize, session: &dyn HttpSession) {
        let (lo, hi) = self.config.warmup_pause_secs;
        for (i, url) in self.config.warmup_urls.iter().enumerate() {
            if i > 0 {
                self.clock.sleep(between(lo, hi)).await;
            }
            match session.get(url).await {
                Ok(resp) if resp.is_success() => {}
                Ok(resp) => {
                    warn!(session = id, %url, status = resp.status, "Warm-up visit rejected; session may be degraded");
                    return;
                }
                Err(e) => {
                    warn!(session = id, %url, error = %e, "Warm-up visit failed; session may be degraded");
                    return;
                }
            }
        }
        info!(session = id, "Session warmed up");
    }

    fn lock(&self) -> MutexGuard<'_, Vec<SessionInfo>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Least-recently-used available session, if any.
    fn try_acquire(&self) -> Option<SessionLease> {
        let now = self.clock.now();
        let mut sessions = self.lock();
        let chosen = sessions
            .iter_mut()
            .filter_map(|s| s.is_available(now).then_some(s))
            .min_by_key(|s| s.lru_key())?;
        chosen.mark_used(now);
        Some(chosen.lease())
    }

    fn time_until_first_release(&self) -> Duration {
        let now = self.clock.now();
        self.lock()
            .iter()
            .filter_map(|s| s.blocked_until)
            .min()
            .and_then(|until| (until - now).to_std().ok())
            .unwrap_or_default()
    }

    fn force_least_recent(&self) -> SessionLease {
        let now = self.clock.now();
        let mut sessions = self.lock();
        // build() guarantees at least one session
        let chosen = (0..sessions.len())
            .min_by_key(|&i| sessions[i].lru_key())
            .unwrap_or_default();
        sessions[chosen].mark_used(now);
        sessions[chosen].lease()
    }

    /// Hand out the least-recently-used available session.
    ///
    /// When every session is cooling down, waits (bounded by
    /// `max_pool_wait_secs`) for the soonest release and tries once more,
    /// then falls back to the least-recently-used session regardless of its
    /// state.
    pub async fn acquire(&self) -> SessionLease {
        if let Some(lease) = self.try_acquire() {
            return lease;
        }

        let wait = self.time_until_first_release().min(self.config.max_pool_wait());
        warn!(wait = ?wait, "No session available; waiting for a cool-down to end");
        if !wait.is_zero() {
            self.clock.sleep(wait).await;
        }

        if let Some(lease) = self.try_acquire() {
            return lease;
        }
        warn!("Still no session available; forcing the least recently used one");
        self.force_least_recent()
    }

    /// Record the status a leased session received. A 403 parks the session.
    pub fn report(&self, lease: &SessionLease, status: u16) {
        let now = self.clock.now();
        let mut sessions = self.lock();
        let Some(info) = sessions.iter_mut().find(|s| s.id == lease.id) else {
            return;
        };
        info.last_used = now;
        if status == 403 {
            let cooldown = info.mark_blocked(now);
            warn!(
                session = info.id,
                errors = info.error_count,
                minutes = cooldown.num_minutes(),
                "Session blocked; cooling down"
            );
        }
    }

    /// Replace a session's client (fresh cookies, warm-up visit) while keeping
    /// its identity and health counters.
    #[instrument(level = "info", skip(self))]
    pub async fn refresh(&self, id: usize) -> Result<(), PoolError> {
        if !self.lock().iter().any(|s| s.id == id) {
            return Err(PoolError::UnknownSession(id));
        }
        let fresh = self.open_session(id).await?;
        let mut sessions = self.lock();
        let slot = sessions
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or(PoolError::UnknownSession(id))?;
        slot.session = fresh.session;
        slot.created_at = fresh.created_at;
        info!(session = id, "Session refreshed");
        Ok(())
    }

    pub fn status(&self) -> PoolStatus {
        let now = self.clock.now();
        let mut sessions = self.lock();
        let mut available = 0;
        let statuses = sessions
            .iter_mut()
            .map(|s| {
                if s.is_available(now) {
                    available += 1;
                }
                SessionStatus {
                    id: s.id,
                    created_at: s.created_at,
                    last_used: s.last_used,
                    request_count: s.request_count,
                    error_count: s.error_count,
                    last_error: s.last_error,
                    blocked_until: s.blocked_until,
                }
            })
            .collect::<Vec<_>>();
        PoolStatus {
            pool_size: statuses.len(),
            available,
            blocked: statuses.len() - available,
            sessions: statuses,
        }
    }
}
