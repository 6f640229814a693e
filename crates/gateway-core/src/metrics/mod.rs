//! Metrics sink for the gateway.
//!
//! Every hot-path record goes straight to the global `metrics` recorder, which is a
//! Prometheus exporter installed once per process. A handful of plain atomic
//! totals are kept alongside so the health endpoint and tests can read a summary
//! without scraping the text exposition.
//!
//! Upstream labels are the configured URLs. They are interned on first use, which
//! bounds the leak to the number of distinct upstreams ever configured.

use crate::{policy::PolicyError, upstream::UpstreamError};
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use serde::Serialize;
use std::{
    borrow::Cow,
    sync::{
        atomic::{AtomicU64, Ordering},
        OnceLock,
    },
    time::Duration,
};

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

static UPSTREAM_NAME_POOL: OnceLock<dashmap::DashMap<String, &'static str>> = OnceLock::new();

#[inline]
fn upstream_to_static(upstream: &str) -> Cow<'static, str> {
    let pool = UPSTREAM_NAME_POOL.get_or_init(dashmap::DashMap::new);

    if let Some(interned) = pool.get(upstream) {
        return Cow::Borrowed(*interned);
    }

    let owned = upstream.to_string();
    let leaked: &'static str = Box::leak(owned.clone().into_boxed_str());
    pool.insert(owned, leaked);
    Cow::Borrowed(leaked)
}

#[inline]
fn method_to_static(method: &str) -> Cow<'static, str> {
    match method {
        "" => Cow::Borrowed("unknown"),
        "eth_blockNumber" => Cow::Borrowed("eth_blockNumber"),
        "eth_chainId" => Cow::Borrowed("eth_chainId"),
        "eth_call" => Cow::Borrowed("eth_call"),
        "eth_getBalance" => Cow::Borrowed("eth_getBalance"),
        "eth_estimateGas" => Cow::Borrowed("eth_estimateGas"),
        "eth_gasPrice" => Cow::Borrowed("eth_gasPrice"),
        "eth_getTransactionCount" => Cow::Borrowed("eth_getTransactionCount"),
        "eth_getTransactionReceipt" => Cow::Borrowed("eth_getTransactionReceipt"),
        "eth_sendRawTransaction" => Cow::Borrowed("eth_sendRawTransaction"),
        "net_version" => Cow::Borrowed("net_version"),
        _ => Cow::Owned(method.to_string()),
    }
}

fn init_prometheus_recorder() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => handle,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "failed to install global prometheus recorder, using a detached one"
                );
                PrometheusBuilder::new().build_recorder().handle()
            }
        })
        .clone()
}

/// Point-in-time totals since the collector was created.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct MetricsSummary {
    pub total_requests: u64,
    pub failed_requests: u64,
    pub policy_denials: u64,
    pub failovers: u64,
    pub upstream_errors: u64,
}

/// Records gateway metrics to Prometheus and keeps a small in-process summary.
pub struct MetricsCollector {
    prometheus_handle: PrometheusHandle,
    total_requests: AtomicU64,
    failed_requests: AtomicU64,
    policy_denials: AtomicU64,
    failovers: AtomicU64,
    upstream_errors: AtomicU64,
}

impl std::fmt::Debug for MetricsCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsCollector").field("summary", &self.summary()).finish()
    }
}

impl MetricsCollector {
    #[must_use]
    pub fn new() -> Self {
        Self {
            prometheus_handle: init_prometheus_recorder(),
            total_requests: AtomicU64::new(0),
            failed_requests: AtomicU64::new(0),
            policy_denials: AtomicU64::new(0),
            failovers: AtomicU64::new(0),
            upstream_errors: AtomicU64::new(0),
        }
    }

    /// Records one inbound call and how long the gateway took to answer it.
    pub fn record_request(&self, method: &str, success: bool, latency: Duration) {
        let method = method_to_static(method);

        let outcome = if success { "success" } else { "error" };

        counter!("gateway_requests_total", "method" => method.clone(), "outcome" => outcome)
            .increment(1);
        histogram!("gateway_request_duration_seconds", "method" => method)
            .record(latency.as_secs_f64());

        self.total_requests.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.failed_requests.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_policy_denial(&self, method: &str, error: &PolicyError) {
        self.policy_denials.fetch_add(1, Ordering::Relaxed);
        counter!(
            "gateway_policy_denials_total",
            "method" => method_to_static(method),
            "reason" => error.as_label()
        )
        .increment(1);
    }

    /// Records the fallback strategy moving its cursor away from a failed upstream.
    pub fn record_failover(&self, from: &str, to: &str) {
        self.failovers.fetch_add(1, Ordering::Relaxed);
        counter!(
            "gateway_upstream_failovers_total",
            "from" => upstream_to_static(from),
            "to" => upstream_to_static(to)
        )
        .increment(1);
    }

    pub fn record_upstream_error(&self, upstream: &str, error: &UpstreamError) {
        self.upstream_errors.fetch_add(1, Ordering::Relaxed);
        counter!(
            "gateway_upstream_errors_total",
            "upstream" => upstream_to_static(upstream),
            "error_type" => error.as_label()
        )
        .increment(1);
    }

    #[allow(clippy::cast_precision_loss)]
    pub fn record_block_height(&self, upstream: &str, height: u64) {
        gauge!("gateway_upstream_block_height", "upstream" => upstream_to_static(upstream))
            .set(height as f64);
    }

    pub fn record_stream_connection(&self, upstream: &str, connected: bool) {
        gauge!("gateway_stream_connected", "upstream" => upstream_to_static(upstream))
            .set(if connected { 1.0 } else { 0.0 });
        if connected {
            counter!("gateway_stream_connects_total", "upstream" => upstream_to_static(upstream))
                .increment(1);
        }
    }

    #[must_use]
    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            failed_requests: self.failed_requests.load(Ordering::Relaxed),
            policy_denials: self.policy_denials.load(Ordering::Relaxed),
            failovers: self.failovers.load(Ordering::Relaxed),
            upstream_errors: self.upstream_errors.load(Ordering::Relaxed),
        }
    }

    /// Renders the Prometheus text exposition.
    #[must_use]
    pub fn get_prometheus_metrics(&self) -> String {
        self.prometheus_handle.render()
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}
