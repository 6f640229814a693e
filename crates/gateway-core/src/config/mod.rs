//! Application configuration with layered loading.
//!
//! # Configuration Hierarchy
//!
//! Configuration is loaded in this order (later overrides earlier):
//!
//! 1. **Compiled defaults**: `Default` implementations and `set_default` calls
//! 2. **Config file**: TOML file named by the `GATEWAY_CONFIG` env var
//! 3. **Environment variables**: `GATEWAY__SECTION__FIELD` overrides a single field
//!
//! # Configuration Sections
//!
//! - [`ServerConfig`]: listener address and front-door limits
//! - [`GatewayConfig`]: upstreams, strategy and access policy
//! - [`TimingsConfig`]: every timeout, interval and pool size of the engine
//! - [`MetricsConfig`]: Prometheus endpoint switch
//! - [`LoggingConfig`]: log level and format
//!
//! # Example
//!
//! ```toml
//! [gateway]
//! upstreams = [
//!     "https://node-1.example.org",
//!     { url = "https://node-2.example.org", archival_url = "https://archive.example.org" },
//!     "wss://node-3.example.org/ws",
//! ]
//! strategy = "FALLBACK"
//! method_limitation_enabled = true
//! allowed_methods = ["eth_blockNumber", "eth_call"]
//! contract_whitelist = ["0x5aeda56215b167893e80b4fe645ba6d5bab767de"]
//! ```

use crate::upstream::{BlockRefreshConfig, HttpClientConfig, StreamConfig};
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::{path::Path, time::Duration};

/// HTTP server configuration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    pub bind_port: u16,
    /// Maximum number of requests served concurrently by the front door.
    pub max_concurrent_requests: usize,
    /// Maximum accepted request body size in bytes.
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            bind_port: 3005,
            max_concurrent_requests: 10_000,
            max_body_bytes: 1024 * 1024,
        }
    }
}

/// One configured upstream.
///
/// Accepts a bare URL, a `"primary,archival"` pair, or a table:
///
/// ```toml
/// upstreams = [
///     "http://node-1:8545",
///     "http://node-2:8545,http://archive:8545",
///     { url = "http://node-3:8545", archival_url = "http://archive:8545" },
/// ]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UpstreamEntry {
    Url(String),
    Detailed { url: String, archival_url: Option<String> },
}

/// An upstream entry resolved to its primary URL and optional archival companion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamEndpoint {
    pub url: String,
    pub archival_url: Option<String>,
}

impl UpstreamEntry {
    /// Resolves the entry, falling back to `default_archival` when the entry does not
    /// name its own archival companion.
    #[must_use]
    pub fn resolve(&self, default_archival: Option<&str>) -> UpstreamEndpoint {
        let (url, archival) = match self {
            Self::Url(spec) => match spec.split_once(',') {
                Some((url, archival)) => (url.trim(), Some(archival.trim())),
                None => (spec.trim(), None),
            },
            Self::Detailed { url, archival_url } => (url.trim(), archival_url.as_deref()),
        };

        let archival_url = archival
            .or(default_archival)
            .map(str::trim)
            .filter(|archival| !archival.is_empty() && *archival != url)
            .map(str::to_string);

        UpstreamEndpoint { url: url.to_string(), archival_url }
    }
}

impl From<&str> for UpstreamEntry {
    fn from(url: &str) -> Self {
        Self::Url(url.to_string())
    }
}

/// The gateway record: which upstreams, which strategy, which policy.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Ordered upstreams; index 0 is the primary for `NAIVE` and `FALLBACK`.
    pub upstreams: Vec<UpstreamEntry>,
    /// Archival companion applied to every HTTP upstream that has none of its own.
    pub archival_url: Option<String>,
    /// `NAIVE`, `RACE` or `FALLBACK`.
    pub strategy: String,
    pub method_limitation_enabled: bool,
    pub allowed_methods: Vec<String>,
    pub contract_whitelist: Vec<String>,
}

impl GatewayConfig {
    /// Upstream entries resolved against the global archival URL, in order.
    #[must_use]
    pub fn endpoints(&self) -> Vec<UpstreamEndpoint> {
        let default_archival = self.archival_url.as_deref();
        self.upstreams.iter().map(|entry| entry.resolve(default_archival)).collect()
    }
}

/// Timeouts, intervals and pool sizes, all in milliseconds unless noted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingsConfig {
    pub http_request_timeout_ms: u64,
    /// Idle keep-alive connections per upstream host (count).
    pub pool_max_idle_per_host: usize,
    /// In-flight HTTP requests across all upstreams of a configuration (count).
    pub http_concurrency_limit: usize,
    pub block_refresh_initial_delay_ms: u64,
    pub block_refresh_interval_ms: u64,
    pub stream_enqueue_timeout_ms: u64,
    pub stream_response_timeout_ms: u64,
    pub stream_reconnect_backoff_ms: u64,
    /// Outbound queue length of each stream upstream (count).
    pub stream_queue_capacity: usize,
    pub race_timeout_ms: u64,
    pub fallback_cooldown_ms: u64,
}

impl Default for TimingsConfig {
    fn default() -> Self {
        Self {
            http_request_timeout_ms: 10_000,
            pool_max_idle_per_host: 200,
            http_concurrency_limit: 10_000,
            block_refresh_initial_delay_ms: 5_000,
            block_refresh_interval_ms: 30_000,
            stream_enqueue_timeout_ms: 5_000,
            stream_response_timeout_ms: 5_000,
            stream_reconnect_backoff_ms: 5_000,
            stream_queue_capacity: 1024,
            race_timeout_ms: 10_000,
            fallback_cooldown_ms: 5_000,
        }
    }
}

impl TimingsConfig {
    #[must_use]
    pub fn http_client(&self) -> HttpClientConfig {
        HttpClientConfig {
            request_timeout: Duration::from_millis(self.http_request_timeout_ms),
            pool_max_idle_per_host: self.pool_max_idle_per_host,
            concurrent_limit: self.http_concurrency_limit,
            ..HttpClientConfig::default()
        }
    }

    #[must_use]
    pub fn block_refresh(&self) -> BlockRefreshConfig {
        BlockRefreshConfig {
            initial_delay: Duration::from_millis(self.block_refresh_initial_delay_ms),
            interval: Duration::from_millis(self.block_refresh_interval_ms),
        }
    }

    #[must_use]
    pub fn stream(&self) -> StreamConfig {
        StreamConfig {
            enqueue_timeout: Duration::from_millis(self.stream_enqueue_timeout_ms),
            response_timeout: Duration::from_millis(self.stream_response_timeout_ms),
            reconnect_backoff: Duration::from_millis(self.stream_reconnect_backoff_ms),
            queue_capacity: self.stream_queue_capacity,
        }
    }

    #[must_use]
    pub fn race_timeout(&self) -> Duration {
        Duration::from_millis(self.race_timeout_ms)
    }

    #[must_use]
    pub fn fallback_cooldown(&self) -> Duration {
        Duration::from_millis(self.fallback_cooldown_ms)
    }

    fn first_zero(&self) -> Option<&'static str> {
        [
            ("http_request_timeout_ms", self.http_request_timeout_ms),
            ("pool_max_idle_per_host", self.pool_max_idle_per_host as u64),
            ("http_concurrency_limit", self.http_concurrency_limit as u64),
            ("block_refresh_interval_ms", self.block_refresh_interval_ms),
            ("stream_enqueue_timeout_ms", self.stream_enqueue_timeout_ms),
            ("stream_response_timeout_ms", self.stream_response_timeout_ms),
            ("stream_reconnect_backoff_ms", self.stream_reconnect_backoff_ms),
            ("stream_queue_capacity", self.stream_queue_capacity as u64),
            ("race_timeout_ms", self.race_timeout_ms),
            ("fallback_cooldown_ms", self.fallback_cooldown_ms),
        ]
        .into_iter()
        .find_map(|(name, value)| (value == 0).then_some(name))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// `json` or `pretty`.
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), format: "pretty".to_string() }
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub gateway: GatewayConfig,
    pub timings: TimingsConfig,
    pub metrics: MetricsConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Loads configuration from a TOML file with environment variable overrides.
    ///
    /// A missing file is not an error; the defaults and environment still apply.
    /// Use `__` as a separator for nested fields (e.g.
    /// `GATEWAY__SERVER__BIND_PORT=8080`).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be parsed or deserialized.
    pub fn from_file<P: AsRef<Path>>(config_path: P) -> Result<Self, ConfigError> {
        Self::from_sources(config_path.as_ref(), Self::environment())
    }

    /// Environment overrides. The policy lists take comma-separated values, e.g.
    /// `GATEWAY__GATEWAY__ALLOWED_METHODS=eth_call,eth_chainId`. Upstreams are not
    /// split since a single entry may already be a `primary,archival` pair.
    fn environment() -> Environment {
        Environment::with_prefix("GATEWAY")
            .prefix_separator("__")
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("gateway.allowed_methods")
            .with_list_parse_key("gateway.contract_whitelist")
            .try_parsing(true)
    }

    fn from_sources(config_path: &Path, environment: Environment) -> Result<Self, ConfigError> {
        let config_builder = Config::builder()
            .set_default("server.bind_address", "0.0.0.0")?
            .set_default("server.bind_port", 3005)?
            .set_default("gateway.strategy", "")?
            .set_default("gateway.method_limitation_enabled", false)?
            .set_default("metrics.enabled", true)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            .add_source(File::with_name(&config_path.to_string_lossy()).required(false))
            .add_source(environment)
            .build()?;

        config_builder.try_deserialize()
    }

    /// Loads configuration from `config/config.toml`, or from the path in
    /// `GATEWAY_CONFIG` when set.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the configuration cannot be loaded or parsed.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_file(Self::config_path())
    }

    /// Path the configuration is read from by [`AppConfig::load`].
    #[must_use]
    pub fn config_path() -> String {
        std::env::var("GATEWAY_CONFIG").unwrap_or_else(|_| "config/config.toml".to_string())
    }

    /// Returns the parsed socket address for the HTTP server.
    ///
    /// # Errors
    ///
    /// Returns an error string if the address cannot be parsed.
    pub fn socket_addr(&self) -> Result<std::net::SocketAddr, String> {
        format!("{}:{}", self.server.bind_address, self.server.bind_port)
            .parse()
            .map_err(|_| {
                format!(
                    "Invalid socket address: {}:{}",
                    self.server.bind_address, self.server.bind_port
                )
            })
    }

    /// Validates the configuration for correctness.
    ///
    /// Strategy names and upstream counts are checked when the running
    /// configuration is built, not here.
    ///
    /// # Errors
    ///
    /// Returns a descriptive error string if validation fails.
    pub fn validate(&self) -> Result<(), String> {
        if self.gateway.upstreams.is_empty() {
            return Err("No upstream RPC endpoints configured".to_string());
        }

        if let Some(endpoint) = self.gateway.endpoints().iter().find(|e| e.url.is_empty()) {
            return Err(format!("Empty upstream URL in entry {endpoint:?}"));
        }

        if self.server.bind_port == 0 {
            return Err("Bind port must be greater than 0".to_string());
        }

        if self.server.max_concurrent_requests == 0 {
            return Err("Max concurrent requests must be greater than 0".to_string());
        }

        if self.server.max_body_bytes == 0 {
            return Err("Max body size must be greater than 0".to_string());
        }

        if let Some(name) = self.timings.first_zero() {
            return Err(format!("Timing {name} must be greater than 0"));
        }

        if !["json", "pretty"].contains(&self.logging.format.as_str()) {
            return Err("Logging format must be 'json' or 'pretty'".to_string());
        }

        Ok(())
    }
}
