use anyhow::Result;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use crate::error::SourceError;
use crate::models::settings::HttpSettings;
use crate::utils::retry::RetryPolicy;

const BROWSER_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// HTTP client for market pages and the Yahoo chart API.
/// Both timeouts are always set; there is no overall request deadline.
pub fn build_scrape_client(settings: &HttpSettings) -> Result<reqwest::Client> {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_UA));
    headers.insert(ACCEPT, HeaderValue::from_static("text/html,application/json;q=0.9,*/*;q=0.8"));
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-IN,en;q=0.9"));

    let client = reqwest::Client::builder()
        .default_headers(headers)
        .connect_timeout(Duration::from_secs(settings.connect_timeout_secs))
        .read_timeout(Duration::from_secs(settings.read_timeout_secs))
        .gzip(true)
        .build()?;
    Ok(client)
}

pub fn build_ai_client(connect_timeout_secs: u64, timeout_secs: u64) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(connect_timeout_secs))
        .read_timeout(Duration::from_secs(timeout_secs))
        .build()?;
    Ok(client)
}

// ====== Per-invocation session ======

/// One HTTP session owned by a single adapter invocation.
///
/// Opened at the start of `collect` and dropped on every exit path,
/// including when the owning task is cancelled mid-flight.
pub struct ScrapeSession {
    label: &'static str,
    client: reqwest::Client,
    opened_at: Instant,
    requests: AtomicU32,
}

impl ScrapeSession {
    pub fn open(label: &'static str, settings: &HttpSettings) -> Result<Self, SourceError> {
        let client = build_scrape_client(settings).map_err(|e| SourceError::parse(format!("http client setup: {}", e)))?;
        log::debug!("[{}] session opened", label);
        Ok(Self {
            label,
            client,
            opened_at: Instant::now(),
            requests: AtomicU32::new(0),
        })
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    /// GET a URL and return the body text, mapping 429 to `RateLimited`.
    pub async fn get_text(&self, url: &str) -> Result<String, SourceError> {
        self.requests.fetch_add(1, Ordering::Relaxed);
        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        if status.as_u16() == 429 {
            return Err(SourceError::RateLimited { url: url.to_string() });
        }
        if !status.is_success() {
            return Err(SourceError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(resp.text().await?)
    }

    /// `get_text` wrapped in the shared rate-limit backoff.
    pub async fn get_text_retrying(&self, retry: &RetryPolicy, url: &str) -> Result<String, SourceError> {
        retry.run_async(self.label, || self.get_text(url)).await
    }

    pub async fn get_json(&self, url: &str) -> Result<serde_json::Value, SourceError> {
        let text = self.get_text(url).await?;
        serde_json::from_str(&text).map_err(|e| SourceError::parse(format!("invalid JSON from {}: {}", url, e)))
    }
}

impl Drop for ScrapeSession {
    fn drop(&mut self) {
        log::debug!(
            "[{}] session closed after {} request(s) in {:.1}s",
            self.label,
            self.requests.load(Ordering::Relaxed),
            self.opened_at.elapsed().as_secs_f64()
        );
    }
}
