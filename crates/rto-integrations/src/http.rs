//! HTTP utilities shared by the connectors.
//!
//! `HttpClient` wraps reqwest with base-URL joining, static authentication,
//! an optional governor rate limiter and retries with exponential backoff.

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter as GovernorRateLimiter,
};
use rand::Rng;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::{IntegrationError, IntegrationResult};

type RateLimiterType = GovernorRateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Longest wait honoured from a `Retry-After` header.
const MAX_RETRY_AFTER_SECS: u64 = 60;

/// Static authentication applied to every request.
#[derive(Clone, Default)]
pub enum HttpAuth {
    #[default]
    None,
    Bearer(String),
    Basic {
        username: String,
        password: String,
    },
    /// A custom header such as `x-api-key`.
    Header {
        name: String,
        value: String,
    },
}

impl std::fmt::Debug for HttpAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HttpAuth::None => f.write_str("None"),
            HttpAuth::Bearer(_) => f.write_str("Bearer([REDACTED])"),
            HttpAuth::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"[REDACTED]")
                .finish(),
            HttpAuth::Header { name, .. } => f
                .debug_struct("Header")
                .field("name", name)
                .field("value", &"[REDACTED]")
                .finish(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Connector name used in logs.
    pub name: String,
    pub base_url: String,
    pub auth: HttpAuth,
    pub timeout_secs: u64,
    pub max_retries: u32,
    /// First backoff delay; doubles on every retry.
    pub initial_backoff: Duration,
    pub headers: HashMap<String, String>,
}

impl HttpClientConfig {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            auth: HttpAuth::None,
            timeout_secs: 30,
            max_retries: 3,
            initial_backoff: Duration::from_millis(200),
            headers: HashMap::new(),
        }
    }

    pub fn with_auth(mut self, auth: HttpAuth) -> Self {
        self.auth = auth;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

/// Rate limiter configuration.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Maximum requests per period.
    pub max_requests: u32,
    pub period: Duration,
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 60,
            period: Duration::from_secs(60),
            burst_size: 5,
        }
    }
}

/// HTTP client with retry and rate limiting support.
pub struct HttpClient {
    client: Client,
    config: HttpClientConfig,
    rate_limiter: Option<Arc<RateLimiterType>>,
}

impl HttpClient {
    pub fn new(config: HttpClientConfig) -> IntegrationResult<Self> {
        Self::with_rate_limit(config, None)
    }

    pub fn with_rate_limit(
        config: HttpClientConfig,
        rate_limit: Option<RateLimitConfig>,
    ) -> IntegrationResult<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        for (key, value) in &config.headers {
            if let (Ok(name), Ok(val)) = (
                reqwest::header::HeaderName::try_from(key.as_str()),
                reqwest::header::HeaderValue::try_from(value.as_str()),
            ) {
                headers.insert(name, val);
            }
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .pool_idle_timeout(Duration::from_secs(90))
            .default_headers(headers)
            .build()
            .map_err(|e| IntegrationError::NotConfigured(e.to_string()))?;

        let rate_limiter = match rate_limit {
            Some(rl) => {
                let per_request = rl.period / rl.max_requests.max(1);
                let quota = Quota::with_period(per_request)
                    .ok_or_else(|| {
                        IntegrationError::NotConfigured("Invalid rate limit period".to_string())
                    })?
                    .allow_burst(NonZeroU32::new(rl.burst_size).unwrap_or(NonZeroU32::MIN));
                Some(Arc::new(GovernorRateLimiter::direct(quota)))
            }
            None => None,
        };

        Ok(Self {
            client,
            config,
            rate_limiter,
        })
    }

    /// Joins `path` onto the base URL. Absolute URLs pass through unchanged.
    pub fn build_url(&self, path: &str) -> String {
        if path.starts_with("https://") || path.starts_with("http://") {
            return path.to_string();
        }
        let base = self.config.base_url.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        format!("{}/{}", base, path)
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    /// A request builder for `path` without authentication applied.
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client.request(method, self.build_url(path))
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> IntegrationResult<T> {
        let response = self.send(self.request(Method::GET, path)).await?;
        parse_json_response(response).await
    }

    pub async fn post_json<T: Serialize + ?Sized, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &T,
    ) -> IntegrationResult<R> {
        let response = self
            .send(self.request(Method::POST, path).json(body))
            .await?;
        parse_json_response(response).await
    }

    /// Sends a request and deserializes the JSON body.
    pub async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> IntegrationResult<T> {
        let response = self.send(request).await?;
        parse_json_response(response).await
    }

    /// Sends a request with authentication, rate limiting and retries.
    ///
    /// Server errors, network failures and 429 responses are retried with
    /// exponential backoff; a 429 waits for its `Retry-After` instead. Other
    /// client errors fail immediately.
    pub async fn send(&self, request: RequestBuilder) -> IntegrationResult<Response> {
        if let Some(limiter) = &self.rate_limiter {
            limiter.until_ready().await;
        }

        let request = self.add_auth(request);
        let mut last_error = None;
        let mut delay = self.config.initial_backoff;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                debug!(connector = %self.config.name, attempt, ?delay, "Retrying request");
                sleep(delay).await;
                delay = std::cmp::min(delay * 2 + jitter(), Duration::from_secs(30));
            }

            let request_clone = request.try_clone().ok_or_else(|| {
                IntegrationError::RequestFailed("Request body cannot be retried".to_string())
            })?;

            let response = match request_clone.send().await {
                Ok(response) => response,
                Err(e) => {
                    let err = IntegrationError::from(e);
                    warn!(connector = %self.config.name, error = %err, "Request failed");
                    last_error = Some(err);
                    continue;
                }
            };

            let status = response.status();

            if status == StatusCode::TOO_MANY_REQUESTS {
                let retry_after = retry_after_secs(&response);
                warn!(
                    connector = %self.config.name,
                    retry_after,
                    "Rate limited by upstream"
                );
                if attempt < self.config.max_retries {
                    sleep(Duration::from_secs(retry_after.min(MAX_RETRY_AFTER_SECS))).await;
                    last_error = Some(IntegrationError::RateLimited(retry_after));
                    continue;
                }
                return Err(IntegrationError::RateLimited(retry_after));
            }

            if status.is_server_error() {
                warn!(connector = %self.config.name, status = %status, "Server error");
                last_error = Some(IntegrationError::RequestFailed(format!(
                    "Server error: {}",
                    status
                )));
                continue;
            }

            if status.is_client_error() {
                return Err(client_error(response).await);
            }

            return Ok(response);
        }

        Err(last_error
            .unwrap_or_else(|| IntegrationError::RequestFailed("No attempts made".to_string())))
    }

    fn add_auth(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.auth {
            HttpAuth::None => request,
            HttpAuth::Bearer(token) => request.bearer_auth(token),
            HttpAuth::Basic { username, password } => request.basic_auth(username, Some(password)),
            HttpAuth::Header { name, value } => request.header(name.as_str(), value.as_str()),
        }
    }
}

fn retry_after_secs(response: &Response) -> u64 {
    response
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(MAX_RETRY_AFTER_SECS)
}

async fn client_error(response: Response) -> IntegrationError {
    let status = response.status();
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            IntegrationError::Authentication(format!("Upstream returned {}", status))
        }
        StatusCode::NOT_FOUND => IntegrationError::NotFound("Resource not found".to_string()),
        _ => {
            let body = response.text().await.unwrap_or_default();
            IntegrationError::RequestFailed(format!(
                "Client error {}: {}",
                status,
                body.chars().take(500).collect::<String>()
            ))
        }
    }
}

async fn parse_json_response<T: DeserializeOwned>(response: Response) -> IntegrationResult<T> {
    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| IntegrationError::InvalidResponse(e.to_string()))?;

    serde_json::from_str(&text).map_err(|e| {
        IntegrationError::InvalidResponse(format!(
            "Failed to parse response (status {}): {} - Body: {}",
            status,
            e,
            text.chars().take(500).collect::<String>()
        ))
    })
}

fn jitter() -> Duration {
    Duration::from_millis(rand::thread_rng().gen_range(0..100))
}
