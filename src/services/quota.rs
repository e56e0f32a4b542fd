//! Per-tenant fixed-window request quotas.
//!
//! Windows are aligned to the wall clock: window `n` covers
//! `[n * window_secs, (n + 1) * window_secs)` in Unix seconds. Each admitted
//! request increments the counter `ratelimit:{org}:{n}` in the shared store;
//! the counter's TTL is set by the increment that creates it, so stale
//! windows expire on their own.
//!
//! A request is rejected when the post-increment count exceeds the limit,
//! so at most `limit` requests are admitted per window per tenant. Two
//! adjacent windows can together admit up to `2 * limit` requests within one
//! window's width.
//!
//! When the store is unavailable the limiter admits the request.

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};

use crate::{
    auth::TenantContext,
    cache::{Cache, CacheKeys},
    config::LimitsConfig,
    observability::metrics,
};

/// The outcome of one quota check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaDecision {
    pub allowed: bool,
    pub limit: u32,
    /// Requests left in the window after this one.
    pub remaining: u32,
    /// Unix seconds at which the current window ends.
    pub reset_at: i64,
    /// Seconds until `reset_at`, at least 1.
    pub retry_after_secs: u64,
    pub window_secs: u64,
}

impl QuotaDecision {
    /// Human-readable window width for error details.
    pub fn window_label(&self) -> String {
        match self.window_secs {
            60 => "1 minute".to_string(),
            s if s % 60 == 0 => format!("{} minutes", s / 60),
            s => format!("{s} seconds"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaOutcome {
    Checked(QuotaDecision),
    /// No decision could be made (no store configured, or the store failed).
    /// The request is admitted without rate-limit headers.
    Unchecked,
}

pub struct QuotaLimiter {
    cache: Option<Arc<dyn Cache>>,
    limits: LimitsConfig,
}

impl QuotaLimiter {
    pub fn new(cache: Option<Arc<dyn Cache>>, limits: LimitsConfig) -> Self {
        Self { cache, limits }
    }

    /// Limit for the tenant: its own override, else its plan's, else global.
    pub fn limit_for(&self, ctx: &TenantContext) -> u32 {
        self.limits.limit_for(ctx.plan, ctx.rate_limit_override)
    }

    pub async fn check(&self, ctx: &TenantContext) -> QuotaOutcome {
        self.check_at(ctx, Utc::now()).await
    }

    /// Count one request for the tenant at `now` and decide.
    pub async fn check_at(&self, ctx: &TenantContext, now: DateTime<Utc>) -> QuotaOutcome {
        let Some(cache) = &self.cache else {
            return QuotaOutcome::Unchecked;
        };

        let window_secs = self.limits.window_secs.max(1);
        let window_secs_i = i64::try_from(window_secs).unwrap_or(i64::MAX);
        let now_secs = now.timestamp();
        let window = now_secs.div_euclid(window_secs_i);
        let reset_at = (window + 1).saturating_mul(window_secs_i);

        let key = CacheKeys::quota(ctx.organization_id, window);
        let count = match cache.incr(&key, Duration::from_secs(window_secs)).await {
            Ok(count) => count,
            Err(e) => {
                metrics::record_quota_check("store_error");
                tracing::warn!(
                    error = %e,
                    org_id = %ctx.organization_id,
                    "Quota store unavailable, admitting request"
                );
                return QuotaOutcome::Unchecked;
            }
        };

        let limit = self.limit_for(ctx);
        let allowed = count <= i64::from(limit);
        let remaining = u32::try_from((i64::from(limit) - count).max(0)).unwrap_or(0);
        let retry_after_secs = u64::try_from((reset_at - now_secs).max(1)).unwrap_or(1);

        if allowed {
            metrics::record_quota_check("allowed");
        } else {
            metrics::record_quota_check("limited");
            tracing::debug!(
                org_id = %ctx.organization_id,
                limit,
                count,
                "Quota exceeded"
            );
        }

        QuotaOutcome::Checked(QuotaDecision {
            allowed,
            limit,
            remaining,
            reset_at,
            retry_after_secs,
            window_secs,
        })
    }
}
