//! Health, readiness and metrics endpoints.

use std::{future::Future, time::Instant};

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;

use crate::AppState;
#[cfg(feature = "prometheus")]
use crate::observability::metrics::get_prometheus_handle;

/// Detailed health status response.
#[derive(Debug, Serialize)]
pub struct HealthStatus {
    /// "healthy", "degraded" or "unhealthy"
    pub status: &'static str,
    pub version: &'static str,
    pub subsystems: SubsystemStatus,
}

#[derive(Debug, Default, Serialize)]
pub struct SubsystemStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<ComponentStatus>,
    /// Counter store backing quota checks.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache: Option<ComponentStatus>,
}

/// Status of a single component.
#[derive(Debug, Serialize)]
pub struct ComponentStatus {
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub latency_ms: u64,
}

async fn probe<E: std::fmt::Display>(
    check: impl Future<Output = Result<(), E>>,
    failure: &str,
) -> ComponentStatus {
    let start = Instant::now();
    let result = check.await;
    let latency_ms = start.elapsed().as_millis() as u64;
    match result {
        Ok(()) => ComponentStatus {
            healthy: true,
            message: None,
            latency_ms,
        },
        Err(e) => {
            tracing::warn!(error = %e, "{failure}");
            ComponentStatus {
                healthy: false,
                message: Some(failure.to_string()),
                latency_ms,
            }
        }
    }
}

/// Full health check with subsystem status.
///
/// A failing database makes the service unhealthy (503). A failing cache only
/// degrades it: quota checks fail open, so requests are still served.
#[tracing::instrument(name = "health.check", skip(state))]
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let mut subsystems = SubsystemStatus::default();

    if let Some(db) = &state.db {
        subsystems.database = Some(probe(db.health_check(), "Database connection failed").await);
    }
    if let Some(cache) = &state.cache {
        subsystems.cache = Some(probe(cache.ping(), "Cache connection failed").await);
    }

    let db_ok = subsystems.database.as_ref().is_none_or(|s| s.healthy);
    let cache_ok = subsystems.cache.as_ref().is_none_or(|s| s.healthy);
    let (status, status_code) = match (db_ok, cache_ok) {
        (false, _) => ("unhealthy", StatusCode::SERVICE_UNAVAILABLE),
        (true, false) => ("degraded", StatusCode::OK),
        (true, true) => ("healthy", StatusCode::OK),
    };

    (
        status_code,
        Json(HealthStatus {
            status,
            version: env!("CARGO_PKG_VERSION"),
            subsystems,
        }),
    )
}

/// Liveness probe. Succeeds while the process can answer at all.
#[tracing::instrument(name = "health.liveness")]
pub async fn liveness() -> impl IntoResponse {
    StatusCode::OK
}

/// Readiness probe. Not ready while the database is unreachable.
#[tracing::instrument(name = "health.readiness", skip(state))]
pub async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    if let Some(db) = &state.db
        && db.health_check().await.is_err()
    {
        return StatusCode::SERVICE_UNAVAILABLE;
    }
    StatusCode::OK
}

/// Prometheus metrics in text exposition format.
#[tracing::instrument(name = "health.metrics")]
pub async fn metrics() -> impl IntoResponse {
    #[cfg(feature = "prometheus")]
    {
        match get_prometheus_handle() {
            Some(handle) => (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                handle.render(),
            ),
            None => (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            ),
        }
    }
    #[cfg(not(feature = "prometheus"))]
    (
        StatusCode::SERVICE_UNAVAILABLE,
        [("content-type", "text/plain")],
        "Prometheus metrics not enabled".to_string(),
    )
}
