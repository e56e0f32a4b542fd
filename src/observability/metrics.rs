//! Prometheus metrics for the gateway.
//!
//! Provides metrics for:
//! - HTTP request latency and counts
//! - Credential resolution and quota decisions
//! - Usage recording throughput and drops
//! - Billing cycle lifecycle and webhook reconciliation
//!
//! Every `record_*` function is a no-op without the `prometheus` feature.

#[cfg(feature = "prometheus")]
use std::sync::OnceLock;

#[cfg(feature = "prometheus")]
use metrics::{counter, histogram};
#[cfg(feature = "prometheus")]
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::config::MetricsConfig;

/// Global Prometheus handle for the metrics endpoint.
#[cfg(feature = "prometheus")]
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Latency buckets in seconds.
#[cfg(feature = "prometheus")]
const DURATION_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Initialize the metrics system with the given configuration.
#[cfg(feature = "prometheus")]
pub fn init_metrics(config: &MetricsConfig) -> Result<(), MetricsError> {
    if !config.enabled {
        return Ok(());
    }

    let builder = PrometheusBuilder::new()
        .set_buckets_for_metric(
            metrics_exporter_prometheus::Matcher::Suffix("_duration_seconds".to_string()),
            DURATION_BUCKETS,
        )
        .map_err(|e| MetricsError::Setup(e.to_string()))?;

    let handle = builder.install_recorder().map_err(MetricsError::Install)?;

    PROMETHEUS_HANDLE
        .set(handle)
        .map_err(|_| MetricsError::Setup("Metrics already initialized".to_string()))?;

    Ok(())
}

/// Initialize the metrics system (no-op without prometheus feature).
#[cfg(not(feature = "prometheus"))]
pub fn init_metrics(_config: &MetricsConfig) -> Result<(), MetricsError> {
    Ok(())
}

/// Get the Prometheus handle for rendering metrics.
#[cfg(feature = "prometheus")]
pub fn get_prometheus_handle() -> Option<&'static PrometheusHandle> {
    PROMETHEUS_HANDLE.get()
}

// ─────────────────────────────────────────────────────────────────────────────
// Metric Recording Functions
// ─────────────────────────────────────────────────────────────────────────────

/// Record an HTTP request.
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    #[cfg(feature = "prometheus")]
    {
        let status_class = format!("{}xx", status / 100);

        counter!("http_requests_total", "method" => method.to_string(), "path" => path.to_string(), "status" => status.to_string(), "status_class" => status_class.clone())
            .increment(1);

        histogram!("http_request_duration_seconds", "method" => method.to_string(), "path" => path.to_string(), "status_class" => status_class)
            .record(duration_secs);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = (method, path, status, duration_secs);
    }
}

/// Record a credential resolution attempt (`method` is "jwt" or "api_key").
pub fn record_auth_attempt(method: &str, success: bool) {
    #[cfg(feature = "prometheus")]
    {
        counter!(
            "auth_attempts_total",
            "method" => method.to_string(),
            "result" => if success { "success" } else { "failure" }
        )
        .increment(1);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = (method, success);
    }
}

/// Record a quota decision: "allowed", "limited" or "store_error".
pub fn record_quota_check(result: &str) {
    #[cfg(feature = "prometheus")]
    {
        counter!("quota_checks_total", "result" => result.to_string()).increment(1);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = result;
    }
}

/// Record usage events dropped because the queue was full or a write failed.
pub fn record_usage_dropped(reason: &str, count: u64) {
    #[cfg(feature = "prometheus")]
    {
        counter!("usage_events_dropped_total", "reason" => reason.to_string()).increment(count);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = (reason, count);
    }
}

/// Record a usage batch write.
pub fn record_usage_flush(count: usize, success: bool, duration_secs: f64) {
    #[cfg(feature = "prometheus")]
    {
        let result = if success { "success" } else { "error" };
        counter!("usage_events_written_total", "result" => result).increment(count as u64);
        histogram!("usage_flush_duration_seconds", "result" => result).record(duration_secs);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = (count, success, duration_secs);
    }
}

/// Record the outcome of one tenant in a billing job.
///
/// `job` is "generate", "autopay" or "overdue"; `outcome` is e.g.
/// "created", "skipped", "paid", "marked_overdue" or "error".
pub fn record_billing_job(job: &str, outcome: &str) {
    #[cfg(feature = "prometheus")]
    {
        counter!("billing_job_items_total", "job" => job.to_string(), "outcome" => outcome.to_string())
            .increment(1);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = (job, outcome);
    }
}

/// Record a payment webhook by provider and reconciliation outcome.
pub fn record_webhook(provider: &str, outcome: &str) {
    #[cfg(feature = "prometheus")]
    {
        counter!("payment_webhooks_total", "provider" => provider.to_string(), "outcome" => outcome.to_string())
            .increment(1);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = (provider, outcome);
    }
}

/// Metrics initialization errors.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[cfg(feature = "prometheus")]
    #[error("Failed to install Prometheus recorder: {0}")]
    Install(#[from] metrics_exporter_prometheus::BuildError),

    #[error("Metrics setup error: {0}")]
    Setup(String),
}
