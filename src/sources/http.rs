//! HTTP plumbing shared by all site adapters.
//!
//! Requests go through a [`Transport`] so adapters can be exercised against
//! canned responses. [`Fetcher`] layers politeness delay, bounded retry with
//! exponential backoff and cancellation on top of it.

use crate::config::ScrapingConfig;
use crate::error::SourceError;
use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, SET_COOKIE};
use serde::de::DeserializeOwned;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// An outbound GET request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
}

impl FetchRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
        }
    }

    /// Adds a header, replacing any earlier value with the same name.
    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        self.headers.push((name.to_string(), value.into()));
        self
    }

    /// Returns the value of a header, if set.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// A fully read response.
#[derive(Debug, Clone, Default)]
pub struct FetchResponse {
    pub status: u16,
    pub content_type: Option<String>,
    /// Raw `Set-Cookie` header values, in received order.
    pub set_cookies: Vec<String>,
    pub body: String,
}

impl FetchResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Performs a single HTTP GET.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, request: &FetchRequest) -> Result<FetchResponse, SourceError>;
}

/// Production transport backed by `reqwest`.
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Builds the HTTP client from scraping settings.
    pub fn new(config: &ScrapingConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn get(&self, request: &FetchRequest) -> Result<FetchResponse, SourceError> {
        let network = |source| SourceError::Network {
            url: request.url.clone(),
            source,
        };

        let mut builder = self.client.get(&request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send().await.map_err(network)?;
        let status = response.status().as_u16();
        let headers = response.headers();
        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let set_cookies = headers
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .map(str::to_string)
            .collect();
        let body = response.text().await.map_err(network)?;

        Ok(FetchResponse {
            status,
            content_type,
            set_cookies,
            body,
        })
    }
}

/// Retrying, cancellable front end to a [`Transport`].
///
/// Clones share one politeness limiter, so request starts are spaced by
/// `delay_between_requests_sec` across every concurrent task.
#[derive(Clone)]
pub struct Fetcher {
    transport: Arc<dyn Transport>,
    config: ScrapingConfig,
    /// Earliest instant the next request may start.
    next_slot: Arc<Mutex<Option<Instant>>>,
}

impl Fetcher {
    pub fn new(transport: Arc<dyn Transport>, config: ScrapingConfig) -> Self {
        Self {
            transport,
            config,
            next_slot: Arc::new(Mutex::new(None)),
        }
    }

    /// Creates a fetcher using the real network.
    pub fn from_config(config: &ScrapingConfig) -> Result<Self, reqwest::Error> {
        let transport = ReqwestTransport::new(config)?;
        Ok(Self::new(Arc::new(transport), config.clone()))
    }

    /// Fetches a URL, retrying transient failures.
    ///
    /// Non-2xx responses become [`SourceError::HttpStatus`]. The cancellation
    /// token is checked around every request and every backoff sleep.
    pub async fn get(
        &self,
        request: &FetchRequest,
        cancel: &CancellationToken,
    ) -> Result<FetchResponse, SourceError> {
        let max_attempts = self.config.retries.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            self.rate_limit(cancel).await?;

            debug!(url = %request.url, attempt, "GET");
            let result = tokio::select! {
                _ = cancel.cancelled() => return Err(SourceError::Cancelled),
                result = self.transport.get(request) => result,
            };

            let err = match result {
                Ok(response) if response.is_success() => return Ok(response),
                Ok(response) => SourceError::HttpStatus {
                    url: request.url.clone(),
                    status: response.status,
                },
                Err(err) => err,
            };

            if !err.is_transient() || attempt >= max_attempts {
                return Err(err);
            }

            let delay = self.backoff(attempt);
            warn!(
                url = %request.url,
                error = %err,
                "request failed, retrying in {:?} (attempt {}/{})",
                delay,
                attempt + 1,
                max_attempts
            );
            tokio::select! {
                _ = cancel.cancelled() => return Err(SourceError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Fetches a URL and decodes its body as JSON.
    ///
    /// Returns the decoded value together with the response, so callers can
    /// look at headers such as `Set-Cookie`.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        request: &FetchRequest,
        cancel: &CancellationToken,
    ) -> Result<(T, FetchResponse), SourceError> {
        let response = self.get(request, cancel).await?;
        if let Some(content_type) = &response.content_type
            && !content_type.to_ascii_lowercase().contains("json")
        {
            return Err(SourceError::remote_api(
                &request.url,
                format!("expected a JSON response, got {}", content_type),
            ));
        }
        let value = serde_json::from_str(&response.body).map_err(|e| {
            SourceError::remote_api(&request.url, format!("invalid JSON payload: {}", e))
        })?;
        Ok((value, response))
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
        Duration::from_millis(self.config.retry_backoff_ms.saturating_mul(factor))
    }

    /// Reserves the next request slot and waits for it.
    async fn rate_limit(&self, cancel: &CancellationToken) -> Result<(), SourceError> {
        if cancel.is_cancelled() {
            return Err(SourceError::Cancelled);
        }

        let delay_sec = self.config.delay_between_requests_sec;
        if delay_sec <= 0.0 {
            return Ok(());
        }

        let start = self.reserve_slot(Duration::from_secs_f64(delay_sec));
        tokio::select! {
            _ = cancel.cancelled() => Err(SourceError::Cancelled),
            _ = tokio::time::sleep_until(start) => Ok(()),
        }
    }

    /// Returns the start instant for a new request and pushes the next slot
    /// `delay` past it.
    fn reserve_slot(&self, delay: Duration) -> Instant {
        let mut next_slot = self.next_slot.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        let start = next_slot.map_or(now, |slot| slot.max(now));
        *next_slot = Some(start + delay);
        start
    }
}
