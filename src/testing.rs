//! Test doubles: a hand-driven clock and scripted HTTP sessions.

use crate::net::clock::Clock;
use crate::net::fetcher::{FetchFailure, FetchResult, PageSource};
use crate::net::transport::{HttpResponse, HttpSession, SessionFactory, TransportError};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A clock that only moves when told to. `sleep` returns immediately after
/// advancing time and recording the requested duration.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
    sleeps: Mutex<Vec<Duration>>,
}

impl ManualClock {
    pub fn new() -> Arc<Self> {
        Self::starting_at(Utc.with_ymd_and_hms(2025, 5, 20, 9, 0, 0).unwrap())
    }

    pub fn starting_at(now: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self {
            now: Mutex::new(now),
            sleeps: Mutex::new(Vec::new()),
        })
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += chrono::TimeDelta::from_std(by).unwrap();
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }

    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
        self.advance(duration);
    }
}

/// One scripted answer to a GET.
#[derive(Debug, Clone)]
pub enum Reply {
    Status(u16, String),
    NetworkError,
}

impl Reply {
    pub fn status(status: u16, body: &str) -> Self {
        Reply::Status(status, body.to_string())
    }
}

#[derive(Default)]
struct Script {
    queued: HashMap<String, VecDeque<Reply>>,
    fixed: HashMap<String, Reply>,
    hits: HashMap<String, usize>,
    created: usize,
}

impl Script {
    fn answer(&mut self, url: &str) -> Reply {
        *self.hits.entry(url.to_string()).or_default() += 1;
        if let Some(reply) = self.queued.get_mut(url).and_then(VecDeque::pop_front) {
            return reply;
        }
        self.fixed
            .get(url)
            .cloned()
            .unwrap_or_else(|| Reply::status(200, ""))
    }
}

/// A [`SessionFactory`] whose sessions answer from a shared script.
///
/// Queued replies for a url are consumed first, then its fixed reply, then
/// `200` with an empty body.
#[derive(Default)]
pub struct ScriptedSessions {
    script: Arc<Mutex<Script>>,
}

impl ScriptedSessions {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, url: &str, status: u16, body: &str) {
        self.script
            .lock()
            .unwrap()
            .fixed
            .insert(url.to_string(), Reply::status(status, body));
    }

    pub fn fail(&self, url: &str) {
        self.script
            .lock()
            .unwrap()
            .fixed
            .insert(url.to_string(), Reply::NetworkError);
    }

    pub fn enqueue(&self, url: &str, reply: Reply) {
        self.script
            .lock()
            .unwrap()
            .queued
            .entry(url.to_string())
            .or_default()
            .push_back(reply);
    }

    pub fn hits(&self, url: &str) -> usize {
        self.script
            .lock()
            .unwrap()
            .hits
            .get(url)
            .copied()
            .unwrap_or_default()
    }

    pub fn created(&self) -> usize {
        self.script.lock().unwrap().created
    }
}

struct ScriptedSession {
    script: Arc<Mutex<Script>>,
}

#[async_trait]
impl HttpSession for ScriptedSession {
    async fn get(&self, url: &str) -> Result<HttpResponse, TransportError> {
        let reply = self.script.lock().unwrap().answer(url);
        match reply {
            Reply::Status(status, body) => Ok(HttpResponse { status, body }),
            Reply::NetworkError => Err(TransportError::Connect(format!("scripted failure for {url}"))),
        }
    }
}

impl SessionFactory for ScriptedSessions {
    fn create(&self, _id: usize) -> Result<Arc<dyn HttpSession>, TransportError> {
        self.script.lock().unwrap().created += 1;
        Ok(Arc::new(ScriptedSession {
            script: Arc::clone(&self.script),
        }))
    }
}

/// A [`PageSource`] backed by a url → page map. Unknown urls fail with a 404.
#[derive(Debug, Default)]
pub struct StaticPages {
    pages: Mutex<HashMap<String, FetchResult>>,
    requested: Mutex<Vec<String>>,
}

impl StaticPages {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn page(&self, url: &str, html: &str) {
        self.pages
            .lock()
            .unwrap()
            .insert(url.to_string(), Ok(html.to_string()));
    }

    pub fn failing(&self, url: &str, failure: FetchFailure) {
        self.pages
            .lock()
            .unwrap()
            .insert(url.to_string(), Err(failure));
    }

    pub fn requested(&self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }
}

#[async_trait]
impl PageSource for StaticPages {
    async fn fetch(&self, url: &str) -> FetchResult {
        self.requested.lock().unwrap().push(url.to_string());
        self.pages
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .unwrap_or(Err(FetchFailure::HttpError(404)))
    }
}
