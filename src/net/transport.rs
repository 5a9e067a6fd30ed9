//! HTTP sessions.
//!
//! A session is a stateful client (cookie jar + browser-like headers). The
//! pool creates sessions through a [`SessionFactory`], which lets tests swap
//! in scripted sessions.

use crate::config::NetworkConfig;
use async_trait::async_trait;
use reqwest::header::{
    ACCEPT, ACCEPT_LANGUAGE, CACHE_CONTROL, HeaderMap, HeaderName, HeaderValue, REFERER,
    UPGRADE_INSECURE_REQUESTS, USER_AGENT,
};
use std::sync::Arc;
use tracing::{debug, info};

/// Status and body of one HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Failure of a single HTTP call before a status was received.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("could not build HTTP client: {0}")]
    Build(String),
}

#[async_trait]
pub trait HttpSession: Send + Sync {
    async fn get(&self, url: &str) -> Result<HttpResponse, TransportError>;
}

pub trait SessionFactory: Send + Sync {
    /// Create a fresh session (empty cookie jar) for pool slot `id`.
    fn create(&self, id: usize) -> Result<Arc<dyn HttpSession>, TransportError>;
}

/// A `reqwest` client with its own cookie store.
#[derive(Debug, Clone)]
pub struct ReqwestSession {
    client: reqwest::Client,
}

#[async_trait]
impl HttpSession for ReqwestSession {
    async fn get(&self, url: &str) -> Result<HttpResponse, TransportError> {
        let response = self.client.get(url).send().await.map_err(map_reqwest_error)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(map_reqwest_error)?;
        debug!(%url, status, bytes = body.len(), "GET completed");
        Ok(HttpResponse { status, body })
    }
}

/// Builds [`ReqwestSession`]s from the network settings: random user agent,
/// optional proxy, per-request timeout.
#[derive(Debug, Clone)]
pub struct ReqwestSessionFactory {
    network: NetworkConfig,
}

impl ReqwestSessionFactory {
    pub fn new(network: NetworkConfig) -> Self {
        Self { network }
    }

    fn headers(&self) -> Result<HeaderMap, TransportError> {
        let mut headers = HeaderMap::new();
        if let Some(ua) = self.network.random_user_agent() {
            let value = HeaderValue::from_str(ua).map_err(|e| TransportError::Build(e.to_string()))?;
            headers.insert(USER_AGENT, value);
        }
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
            ),
        );
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_static("ko-KR,ko;q=0.9,en-US;q=0.8,en;q=0.7"),
        );
        headers.insert(UPGRADE_INSECURE_REQUESTS, HeaderValue::from_static("1"));
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("max-age=0"));
        headers.insert(
            REFERER,
            HeaderValue::from_static("https://search.naver.com/search.naver"),
        );
        for (name, value) in [
            ("sec-fetch-dest", "document"),
            ("sec-fetch-mode", "navigate"),
            ("sec-fetch-site", "same-origin"),
            ("sec-fetch-user", "?1"),
        ] {
            headers.insert(HeaderName::from_static(name), HeaderValue::from_static(value));
        }
        Ok(headers)
    }
}

impl SessionFactory for ReqwestSessionFactory {
    fn create(&self, id: usize) -> Result<Arc<dyn HttpSession>, TransportError> {
        let mut builder = reqwest::Client::builder()
            .cookie_store(true)
            .default_headers(self.headers()?)
            .timeout(self.network.timeout());

        if let Some(proxy) = self.network.random_proxy() {
            let proxy = reqwest::Proxy::all(proxy).map_err(|e| TransportError::Build(e.to_string()))?;
            builder = builder.proxy(proxy);
            info!(session = id, "Session routed through configured proxy");
        }

        let client = builder.build().map_err(|e| TransportError::Build(e.to_string()))?;
        Ok(Arc::new(ReqwestSession { client }))
    }
}

fn map_reqwest_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout(err.to_string())
    } else if err.is_connect() {
        TransportError::Connect(err.to_string())
    } else {
        TransportError::Request(err.to_string())
    }
}
