use axum::{
    Extension, Json,
    extract::{Query, State, rejection::JsonRejection},
    response::IntoResponse,
};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ApiError, services};
use crate::{
    AppState,
    api_types::ApiResponse,
    auth::TenantContext,
    models::{BillingStatus, Plan, UserRole},
    payments::Provider,
};

#[derive(Debug, Default, Deserialize)]
pub struct UsageQuery {
    /// `YYYY-MM-DD`, inclusive.
    pub start_date: Option<String>,
    /// `YYYY-MM-DD`, inclusive.
    pub end_date: Option<String>,
}

/// Midnight UTC of a `YYYY-MM-DD` date. Unparseable input yields `None` so
/// the caller falls back to the default window.
fn parse_day(s: Option<&str>) -> Option<DateTime<Utc>> {
    let date = NaiveDate::parse_from_str(s?, "%Y-%m-%d").ok()?;
    Some(date.and_hms_opt(0, 0, 0)?.and_utc())
}

/// Per-endpoint usage. Defaults to the last 30 days.
#[tracing::instrument(name = "billing.usage", skip_all, fields(org_id = %ctx.organization_id))]
pub async fn usage(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Query(query): Query<UsageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let start = parse_day(query.start_date.as_deref());
    // The end day is included, so the range stops at the following midnight.
    // A day with no following midnight falls back to the default.
    let end = parse_day(query.end_date.as_deref())
        .and_then(|d| d.checked_add_signed(Duration::days(1)));
    let report = services(&state)?
        .billing
        .usage_report(ctx.organization_id, start, end, Utc::now())
        .await?;
    Ok(ApiResponse::ok(report))
}

#[tracing::instrument(name = "billing.history", skip_all, fields(org_id = %ctx.organization_id))]
pub async fn history(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
) -> Result<impl IntoResponse, ApiError> {
    let history = services(&state)?
        .billing
        .history(ctx.organization_id)
        .await?;
    Ok(ApiResponse::ok(history))
}

/// Month-to-date usage priced on the current plan.
#[tracing::instrument(name = "billing.calculate", skip_all, fields(org_id = %ctx.organization_id))]
pub async fn calculate(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
) -> Result<impl IntoResponse, ApiError> {
    let bill = services(&state)?
        .billing
        .calculate_current(ctx.organization_id, Utc::now())
        .await?;
    Ok(ApiResponse::ok(bill))
}

#[derive(Debug, Deserialize)]
pub struct UpgradePlan {
    pub plan: String,
}

#[derive(Debug, Serialize)]
pub struct PlanChanged {
    pub organization_id: Uuid,
    pub plan: Plan,
}

/// Change the tenant's plan. Owners only.
#[tracing::instrument(name = "billing.upgrade", skip_all, fields(org_id = %ctx.organization_id))]
pub async fn upgrade_plan(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    payload: Result<Json<UpgradePlan>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(input) = payload?;
    if ctx.role() != Some(UserRole::Owner) {
        return Err(ApiError::Forbidden(
            "Only organization owner can upgrade plan".to_string(),
        ));
    }
    let plan: Plan = input.plan.parse().map_err(|_| {
        ApiError::bad_request("INVALID_PLAN", "Plan must be one of: free, starter, pro")
    })?;

    let org = services(&state)?
        .billing
        .change_plan(ctx.organization_id, plan)
        .await?;
    Ok(ApiResponse::ok(PlanChanged {
        organization_id: org.id,
        plan: org.plan,
    })
    .with_message("Plan upgraded successfully"))
}

#[derive(Debug, Deserialize)]
pub struct InitiatePayment {
    pub billing_cycle_id: String,
    #[serde(default)]
    pub provider: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PaymentInitiated {
    pub payment_url: String,
    pub amount: Decimal,
    pub billing_cycle_id: Uuid,
    pub status: BillingStatus,
    pub provider: Provider,
    pub reference: String,
}

/// Start a hosted checkout for one of the tenant's unpaid cycles.
#[tracing::instrument(name = "billing.initiate_payment", skip_all, fields(org_id = %ctx.organization_id))]
pub async fn initiate_payment(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    payload: Result<Json<InitiatePayment>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(input) = payload?;
    let cycle_id = Uuid::parse_str(&input.billing_cycle_id)
        .map_err(|_| ApiError::bad_request("INVALID_CYCLE_ID", "Invalid billing cycle ID"))?;
    let provider = match input.provider.as_deref() {
        None | Some("") => Provider::default(),
        Some(name) => name.parse().map_err(|_| {
            ApiError::bad_request(
                "INVALID_PROVIDER",
                "Provider must be either 'stripe' or 'paystack'",
            )
        })?,
    };

    let checkout = state.checkout.as_ref().ok_or(ApiError::DatabaseRequired)?;
    let (cycle, session) = checkout.initiate(&ctx, cycle_id, provider).await?;

    Ok(ApiResponse::ok(PaymentInitiated {
        payment_url: session.payment_url,
        amount: cycle.total_amount,
        billing_cycle_id: cycle.id,
        status: cycle.status,
        provider: session.provider,
        reference: session.reference,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_day() {
        let day = parse_day(Some("2025-02-10")).unwrap();
        assert_eq!(day.to_rfc3339(), "2025-02-10T00:00:00+00:00");
        assert!(parse_day(Some("10/02/2025")).is_none());
        assert!(parse_day(None).is_none());
    }
}
