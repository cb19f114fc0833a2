//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the harvester, including:
//! - Building HTTP clients with the configured header profile
//! - GET requests with a fixed per-request timeout
//! - Classifying responses into success, rate limiting, permanent errors
//!   and transport failures

use crate::config::{Config, HttpConfig};
use crate::{ConfigError, HarvestError};
use async_trait::async_trait;
use rand::seq::SliceRandom;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, REFERER};
use reqwest::{Client, StatusCode};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Result of a fetch operation
#[derive(Debug, Clone)]
pub enum FetchResult {
    /// HTTP 200 with the page body
    Success {
        /// Page body content
        body: String,
    },

    /// HTTP 429
    RateLimited,

    /// Any other status; not worth retrying for detail pages
    HttpError {
        /// The HTTP status code
        status_code: u16,
    },

    /// Connection failure, timeout, or body read failure
    NetworkError {
        /// Error description
        error: String,
    },
}

/// Coarse outcome class used by the retry state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchClass {
    Success,
    RateLimited,
    HttpError,
    Transport,
}

impl FetchResult {
    pub fn class(&self) -> FetchClass {
        match self {
            Self::Success { .. } => FetchClass::Success,
            Self::RateLimited => FetchClass::RateLimited,
            Self::HttpError { .. } => FetchClass::HttpError,
            Self::NetworkError { .. } => FetchClass::Transport,
        }
    }
}

impl fmt::Display for FetchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success { .. } => write!(f, "HTTP 200"),
            Self::RateLimited => write!(f, "HTTP 429 (rate limited)"),
            Self::HttpError { status_code } => write!(f, "HTTP {}", status_code),
            Self::NetworkError { error } => write!(f, "transport error: {}", error),
        }
    }
}

/// Anything that can fetch a page
///
/// The pipeline only talks to this trait, so tests can script responses.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> FetchResult;
}

/// `PageFetcher` backed by a reqwest client
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Builds a fetcher presenting the given user agent
    pub fn with_user_agent(
        config: &HttpConfig,
        user_agent: &str,
        timeout: Duration,
    ) -> Result<Self, HarvestError> {
        Ok(Self::new(build_http_client(config, user_agent, timeout)?))
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> FetchResult {
        fetch_url(&self.client, url).await
    }
}

/// Hands out the fetchers used by one run
///
/// Discovery shares a single fetcher across all search pages; each worker gets
/// its own.
pub trait FetcherFactory: Send + Sync {
    fn discovery_fetcher(&self) -> Result<Arc<dyn PageFetcher>, HarvestError>;

    fn worker_fetcher(&self, worker_id: usize) -> Result<Arc<dyn PageFetcher>, HarvestError>;
}

/// Builds reqwest-backed fetchers, rotating user agents
///
/// The discovery client presents a randomly chosen agent; worker `i` presents
/// agent `i mod len`.
#[derive(Debug, Clone)]
pub struct HttpFetcherFactory {
    http: HttpConfig,
    timeout: Duration,
}

impl HttpFetcherFactory {
    pub fn new(http: HttpConfig, timeout: Duration) -> Self {
        Self { http, timeout }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.http.clone(),
            Duration::from_secs(config.scraper.request_timeout),
        )
    }

    /// User agent presented by the given worker
    pub fn worker_user_agent(&self, worker_id: usize) -> &str {
        let agents = &self.http.user_agents;
        if agents.is_empty() {
            return "";
        }
        &agents[worker_id % agents.len()]
    }

    fn random_user_agent(&self) -> &str {
        self.http
            .user_agents
            .choose(&mut rand::thread_rng())
            .map(String::as_str)
            .unwrap_or_default()
    }
}

impl FetcherFactory for HttpFetcherFactory {
    fn discovery_fetcher(&self) -> Result<Arc<dyn PageFetcher>, HarvestError> {
        let user_agent = self.random_user_agent();
        tracing::debug!("Discovery client user agent: {}", user_agent);
        Ok(Arc::new(HttpFetcher::with_user_agent(
            &self.http,
            user_agent,
            self.timeout,
        )?))
    }

    fn worker_fetcher(&self, worker_id: usize) -> Result<Arc<dyn PageFetcher>, HarvestError> {
        Ok(Arc::new(HttpFetcher::with_user_agent(
            &self.http,
            self.worker_user_agent(worker_id),
            self.timeout,
        )?))
    }
}

fn header_value(field: &str, value: &str) -> Result<HeaderValue, HarvestError> {
    HeaderValue::from_str(value).map_err(|_| {
        HarvestError::Config(ConfigError::Validation(format!(
            "{} is not a valid header value: '{}'",
            field, value
        )))
    })
}

/// Builds an HTTP client with the configured header profile
///
/// # Arguments
///
/// * `config` - Accept, Accept-Language and Referer values
/// * `user_agent` - The User-Agent this client presents
/// * `timeout` - Whole-request timeout
///
/// # Example
///
/// ```no_run
/// use lot_harvester::config::HttpConfig;
/// use lot_harvester::crawler::build_http_client;
/// use std::time::Duration;
///
/// let config = HttpConfig::default();
/// let client = build_http_client(&config, &config.user_agents[0], Duration::from_secs(30)).unwrap();
/// ```
pub fn build_http_client(
    config: &HttpConfig,
    user_agent: &str,
    timeout: Duration,
) -> Result<Client, HarvestError> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, header_value("accept", &config.accept)?);
    headers.insert(
        ACCEPT_LANGUAGE,
        header_value("accept_language", &config.accept_language)?,
    );
    headers.insert(REFERER, header_value("referer", &config.referer)?);

    let client = Client::builder()
        .user_agent(user_agent)
        .default_headers(headers)
        .timeout(timeout)
        .gzip(true)
        .brotli(true)
        .build()?;

    Ok(client)
}

/// Fetches a URL once and classifies the outcome
///
/// | Condition | Result |
/// |-----------|--------|
/// | HTTP 200 | `Success` |
/// | HTTP 429 | `RateLimited` |
/// | Any other status | `HttpError` |
/// | Timeout / connection / body read failure | `NetworkError` |
///
/// No retrying happens here; see the retry state machine.
pub async fn fetch_url(client: &Client, url: &str) -> FetchResult {
    match client.get(url).send().await {
        Ok(response) => {
            let status = response.status();

            if status == StatusCode::TOO_MANY_REQUESTS {
                return FetchResult::RateLimited;
            }

            if status != StatusCode::OK {
                return FetchResult::HttpError {
                    status_code: status.as_u16(),
                };
            }

            match response.text().await {
                Ok(body) => FetchResult::Success { body },
                Err(e) => FetchResult::NetworkError {
                    error: e.to_string(),
                },
            }
        }
        Err(e) => {
            let error = if e.is_timeout() {
                "Request timeout".to_string()
            } else if e.is_connect() {
                "Connection refused".to_string()
            } else {
                e.to_string()
            };
            FetchResult::NetworkError { error }
        }
    }
}
