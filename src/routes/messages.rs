//! Demonstration endpoints behind the API-key pipeline. Nothing is actually
//! sent; the handlers exist so the pipeline has something to meter.

use axum::{
    Extension, Json,
    extract::{Path, rejection::JsonRejection},
    response::IntoResponse,
};
use axum_valid::{Valid, ValidRejection};
use chrono::{Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use super::ApiError;
use crate::{api_types::ApiResponse, auth::TenantContext};

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SendMessage {
    #[validate(length(min = 1, message = "This field cannot be empty"))]
    #[serde(default)]
    pub to: String,
    #[validate(length(min = 1, message = "This field cannot be empty"))]
    #[serde(default)]
    pub message: String,
    #[validate(custom(function = "validate_message_type"))]
    #[serde(default, rename = "type")]
    pub kind: String,
}

fn validate_message_type(kind: &str) -> Result<(), ValidationError> {
    match kind {
        "sms" | "email" => Ok(()),
        _ => Err(ValidationError::new("message_type")
            .with_message("Must be either 'sms' or 'email'".into())),
    }
}

#[derive(Debug, Serialize)]
pub struct QueuedMessage {
    pub message_id: String,
    pub to: String,
    pub status: &'static str,
    #[serde(rename = "type")]
    pub kind: String,
    pub organization_id: Uuid,
    pub created_at: chrono::DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct MessageStatus {
    pub message_id: String,
    pub status: &'static str,
    pub sent_at: chrono::DateTime<Utc>,
    pub delivered_at: chrono::DateTime<Utc>,
}

/// `msg_` followed by 32 hex characters.
fn new_message_id() -> String {
    let bytes: [u8; 16] = rand::thread_rng().r#gen();
    format!("msg_{}", hex::encode(bytes))
}

pub async fn send_message(
    Extension(ctx): Extension<TenantContext>,
    payload: Result<Valid<Json<SendMessage>>, ValidRejection<JsonRejection>>,
) -> Result<impl IntoResponse, ApiError> {
    let Valid(Json(input)) = payload?;
    let queued = QueuedMessage {
        message_id: new_message_id(),
        to: input.to,
        status: "queued",
        kind: input.kind,
        organization_id: ctx.organization_id,
        created_at: Utc::now(),
    };
    tracing::debug!(message_id = %queued.message_id, "Message queued");
    Ok(ApiResponse::ok(queued))
}

pub async fn get_message_status(Path(id): Path<String>) -> impl IntoResponse {
    let now = Utc::now();
    ApiResponse::ok(MessageStatus {
        message_id: id,
        status: "delivered",
        sent_at: now - Duration::minutes(5),
        delivered_at: now - Duration::minutes(3),
    })
}
