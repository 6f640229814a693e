use bytes::Bytes;
use reqwest::{header::CONTENT_TYPE, Client, ClientBuilder};
use std::{sync::Arc, time::Duration};
use tokio::sync::Semaphore;

use crate::upstream::UpstreamError;

/// Pooling and timeout settings for the shared upstream HTTP client.
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Total deadline for one request, including reading the body.
    pub request_timeout: Duration,
    /// Idle keep-alive connections retained per upstream host.
    pub pool_max_idle_per_host: usize,
    pub pool_idle_timeout: Duration,
    pub connect_timeout: Duration,
    /// Maximum number of requests in flight through this client.
    pub concurrent_limit: usize,
    /// How long a request may wait for a free concurrency slot.
    pub permit_timeout: Duration,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            pool_max_idle_per_host: 200,
            pool_idle_timeout: Duration::from_secs(90),
            connect_timeout: Duration::from_secs(5),
            concurrent_limit: 10_000,
            permit_timeout: Duration::from_secs(1),
        }
    }
}

/// Pooled HTTP client shared by every HTTP upstream of a running configuration.
///
/// Cloning is cheap: the connection pool and the concurrency limit are shared.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    concurrent_limit: Arc<Semaphore>,
    permit_timeout: Duration,
}

impl HttpClient {
    /// Creates a new HTTP client with default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying reqwest client fails to build.
    pub fn new() -> Result<Self, UpstreamError> {
        Self::with_config(&HttpClientConfig::default())
    }

    /// Creates a new HTTP client with the provided configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying reqwest client fails to build.
    pub fn with_config(config: &HttpClientConfig) -> Result<Self, UpstreamError> {
        let client = ClientBuilder::new()
            .pool_idle_timeout(config.pool_idle_timeout)
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .use_rustls_tls()
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(concat!("jsonrpc-gateway/", env!("CARGO_PKG_VERSION")))
            .tcp_keepalive(Duration::from_secs(30))
            .tcp_nodelay(true)
            .build()
            .map_err(|e| {
                tracing::error!(error = %e, "failed to build http client");
                UpstreamError::ConnectionFailed(format!("HTTP client build failed: {e}"))
            })?;

        Ok(Self {
            client,
            concurrent_limit: Arc::new(Semaphore::new(config.concurrent_limit.max(1))),
            permit_timeout: config.permit_timeout,
        })
    }

    /// Sanitizes network errors to prevent information disclosure.
    fn sanitize_network_error(error: &reqwest::Error) -> String {
        if error.is_connect() {
            "connection refused or unreachable".to_string()
        } else if error.is_request() {
            "request failed".to_string()
        } else if error.is_body() || error.is_decode() {
            "response body error".to_string()
        } else if error.is_redirect() {
            "unexpected redirect".to_string()
        } else {
            "network error".to_string()
        }
    }

    fn map_error(url: &str, error: &reqwest::Error) -> UpstreamError {
        if error.is_timeout() {
            tracing::debug!(url = url, "http request timed out");
            return UpstreamError::Timeout;
        }
        let sanitized = Self::sanitize_network_error(error);
        tracing::debug!(url = url, error = %sanitized, "http request failed");
        UpstreamError::ConnectionFailed(sanitized)
    }

    /// Posts `body` as JSON to `url` and returns the raw response body.
    ///
    /// Nothing is retried here; retry decisions belong to the routing strategy.
    ///
    /// # Errors
    ///
    /// - [`UpstreamError::Timeout`] if no concurrency slot frees up or the request times out
    /// - [`UpstreamError::HttpError`] for non-success HTTP status codes, carrying the full body
    /// - [`UpstreamError::ConnectionFailed`] for other network failures
    pub async fn post_json(&self, url: &str, body: Bytes) -> Result<Bytes, UpstreamError> {
        let _permit = tokio::time::timeout(
            self.permit_timeout,
            Arc::clone(&self.concurrent_limit).acquire_owned(),
        )
        .await
        .map_err(|_| {
            tracing::warn!(
                url = url,
                available_permits = self.concurrent_limit.available_permits(),
                "http client concurrency limit reached"
            );
            UpstreamError::Timeout
        })?
        .map_err(|_| UpstreamError::ConnectionFailed("http client closed".to_string()))?;

        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| Self::map_error(url, &e))?;

        let status = response.status();
        let bytes = response.bytes().await.map_err(|e| Self::map_error(url, &e))?;

        if !status.is_success() {
            tracing::trace!(url = url, status = status.as_u16(), "http request rejected");
            return Err(UpstreamError::HttpError { status: status.as_u16(), body: bytes });
        }

        Ok(bytes)
    }

    #[cfg(test)]
    #[must_use]
    pub fn available_permits(&self) -> usize {
        self.concurrent_limit.available_permits()
    }
}
