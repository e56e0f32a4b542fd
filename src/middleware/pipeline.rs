//! The programmatic request pipeline: identity → quota → handler → usage.
//!
//! Each stage hands the next an explicit [`TenantContext`]; the handler
//! receives the same context as a request extension.
//!
//! Read-only lookups such as message status use [`api_key_auth_middleware`]
//! instead: identity only, so polling neither spends quota nor is metered.

use axum::{
    extract::{OriginalUri, Request, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde_json::json;

use crate::{
    AppState,
    api_types::ErrorResponse,
    auth::TenantContext,
    models::UsageEvent,
    services::{QuotaDecision, QuotaOutcome},
    usage_buffer::UsageBuffer,
};

pub const RATE_LIMIT_LIMIT_HEADER: &str = "x-ratelimit-limit";
pub const RATE_LIMIT_REMAINING_HEADER: &str = "x-ratelimit-remaining";
pub const RATE_LIMIT_RESET_HEADER: &str = "x-ratelimit-reset";

/// A rejected quota check, rendered as 429 with retry metadata.
#[derive(Debug)]
pub struct QuotaExceeded(pub QuotaDecision);

impl IntoResponse for QuotaExceeded {
    fn into_response(self) -> Response {
        let decision = self.0;
        let body = ErrorResponse::new("RATE_LIMIT_EXCEEDED", "Rate limit exceeded for your plan")
            .with_details(json!({
                "limit": decision.limit,
                "window": decision.window_label(),
                "retry_after": decision.retry_after_secs,
            }));
        let mut response = body.into_response_with(StatusCode::TOO_MANY_REQUESTS);
        insert_quota_headers(response.headers_mut(), &decision);
        if let Ok(v) = HeaderValue::try_from(decision.retry_after_secs.to_string()) {
            response.headers_mut().insert("retry-after", v);
        }
        response
    }
}

/// Set `X-RateLimit-*` from a decision. Reset is in epoch seconds.
pub fn insert_quota_headers(headers: &mut HeaderMap, decision: &QuotaDecision) {
    for (name, value) in [
        (RATE_LIMIT_LIMIT_HEADER, decision.limit.to_string()),
        (RATE_LIMIT_REMAINING_HEADER, decision.remaining.to_string()),
        (RATE_LIMIT_RESET_HEADER, decision.reset_at.to_string()),
    ] {
        if let Ok(v) = HeaderValue::try_from(value) {
            headers.insert(name, v);
        }
    }
}

/// Middleware for programmatic routes.
pub async fn api_key_pipeline(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    // Identity: fail closed.
    let ctx = match state.identity.resolve_api_key(req.headers()).await {
        Ok(ctx) => ctx,
        Err(e) => return e.into_response(),
    };

    // Quota: fail open.
    let decision = match state.quota.check(&ctx).await {
        QuotaOutcome::Checked(decision) if !decision.allowed => {
            return QuotaExceeded(decision).into_response();
        }
        QuotaOutcome::Checked(decision) => Some(decision),
        QuotaOutcome::Unchecked => None,
    };

    let method = req.method().to_string();
    let endpoint = req
        .extensions()
        .get::<OriginalUri>()
        .map(|uri| uri.path().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());
    req.extensions_mut().insert(ctx.clone());

    let mut response = next.run(req).await;

    if let Some(decision) = &decision {
        insert_quota_headers(response.headers_mut(), decision);
    }
    if let Some(buffer) = &state.usage_buffer {
        record_usage(buffer, &ctx, method, endpoint, response.status());
    }
    response
}

/// Identity-only middleware for programmatic routes that are not metered.
pub async fn api_key_auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    match state.identity.resolve_api_key(req.headers()).await {
        Ok(ctx) => {
            req.extensions_mut().insert(ctx);
            next.run(req).await
        }
        Err(e) => e.into_response(),
    }
}

/// Queue one usage event. Never waits; a full queue drops the event.
fn record_usage(
    buffer: &UsageBuffer,
    ctx: &TenantContext,
    method: String,
    endpoint: String,
    status: StatusCode,
) {
    buffer.push(UsageEvent {
        organization_id: ctx.organization_id,
        api_key_id: ctx.api_key_id(),
        endpoint,
        method,
        status_code: status.as_u16(),
        occurred_at: Utc::now(),
    });
}
