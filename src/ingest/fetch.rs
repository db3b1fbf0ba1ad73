// src/ingest/fetch.rs
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use metrics::counter;
use tokio::sync::Semaphore;

use crate::ingest::config::IngestConfig;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Timeout, refused connection, DNS failure and the like.
    #[error("transport error: {0}")]
    Transport(String),
    #[error("http status {0}")]
    Status(u16),
    #[error("reading body failed: {0}")]
    Body(String),
}

impl FetchError {
    pub fn is_transport(&self) -> bool {
        matches!(self, FetchError::Transport(_))
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() || e.is_connect() || e.is_request() {
            FetchError::Transport(e.to_string())
        } else if let Some(status) = e.status() {
            FetchError::Status(status.as_u16())
        } else {
            FetchError::Body(e.to_string())
        }
    }
}

/// Anything that can turn a URL into a text body.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn get_text(&self, url: &str) -> Result<String, FetchError>;
}

/// reqwest-backed fetcher. Every request shares the client timeout and a
/// process-wide permit pool sized by `max_concurrent_requests`.
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    permits: Arc<Semaphore>,
}

impl HttpFetcher {
    pub fn from_config(cfg: &IngestConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(cfg.request_timeout())
            .user_agent(cfg.user_agent.clone())
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()?;
        Ok(Self {
            client,
            permits: Arc::new(Semaphore::new(cfg.max_concurrent_requests.max(1))),
        })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn get_text(&self, url: &str) -> Result<String, FetchError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let resp = match self
            .client
            .get(url)
            .header(
                reqwest::header::ACCEPT,
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            )
            .header(reqwest::header::ACCEPT_LANGUAGE, "en-US,en;q=0.5")
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(target: "ingest", error = %e, %url, "http request failed");
                counter!("ingest_http_errors_total").increment(1);
                return Err(e.into());
            }
        };

        let status = resp.status();
        if !status.is_success() {
            counter!("ingest_http_errors_total").increment(1);
            return Err(FetchError::Status(status.as_u16()));
        }
        resp.text().await.map_err(|e| FetchError::Body(e.to_string()))
    }
}

/// Serves canned bodies by URL; unknown URLs fail as transport errors.
/// Used by tests and by offline runs against saved pages.
#[derive(Debug, Default, Clone)]
pub struct FixtureFetcher {
    pages: HashMap<String, Result<String, u16>>,
}

impl FixtureFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: impl Into<String>, body: impl Into<String>) -> Self {
        self.pages.insert(url.into(), Ok(body.into()));
        self
    }

    pub fn with_status(mut self, url: impl Into<String>, status: u16) -> Self {
        self.pages.insert(url.into(), Err(status));
        self
    }
}

#[async_trait]
impl PageFetcher for FixtureFetcher {
    async fn get_text(&self, url: &str) -> Result<String, FetchError> {
        match self.pages.get(url) {
            Some(Ok(body)) => Ok(body.clone()),
            Some(Err(status)) => Err(FetchError::Status(*status)),
            None => Err(FetchError::Transport(format!("connection refused: {url}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fixture_fetcher_distinguishes_status_from_transport() {
        let f = FixtureFetcher::new()
            .with_page("https://a.test/", "hello")
            .with_status("https://b.test/", 503);

        assert_eq!(f.get_text("https://a.test/").await.unwrap(), "hello");
        let e = f.get_text("https://b.test/").await.unwrap_err();
        assert!(!e.is_transport());
        let e = f.get_text("https://c.test/").await.unwrap_err();
        assert!(e.is_transport());
    }
}
