use axum::{
    Extension, Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use axum_valid::{Valid, ValidRejection};
use uuid::Uuid;

use super::{ApiError, services};
use crate::{AppState, api_types::ApiResponse, auth::TenantContext, models::CreateApiKey};

/// Create an API key. The raw key is only ever returned here.
#[tracing::instrument(name = "keys.create", skip_all, fields(org_id = %ctx.organization_id))]
pub async fn create_key(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    payload: Result<Valid<Json<CreateApiKey>>, ValidRejection<JsonRejection>>,
) -> Result<impl IntoResponse, ApiError> {
    let Valid(Json(input)) = payload?;
    let created = services(&state)?.api_keys.create(&ctx, input).await?;
    Ok((
        StatusCode::CREATED,
        ApiResponse::ok(created).with_message(
            "API key created successfully. Store this key securely. It won't be shown again.",
        ),
    ))
}

#[tracing::instrument(name = "keys.list", skip_all, fields(org_id = %ctx.organization_id))]
pub async fn list_keys(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
) -> Result<impl IntoResponse, ApiError> {
    let keys = services(&state)?.api_keys.list(&ctx).await?;
    Ok(ApiResponse::ok(keys))
}

#[tracing::instrument(name = "keys.revoke", skip_all, fields(org_id = %ctx.organization_id))]
pub async fn revoke_key(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = Uuid::parse_str(&id)
        .map_err(|_| ApiError::bad_request("INVALID_KEY_ID", "Invalid API key ID format"))?;
    services(&state)?.api_keys.revoke(&ctx, id).await?;
    Ok(ApiResponse::message("API key revoked successfully"))
}
