use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::api_types::ErrorResponse;

/// Failure to authenticate an inbound webhook. Nothing else about a webhook
/// is surfaced to the provider.
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("Missing webhook signature")]
    MissingSignature,

    #[error("Invalid webhook signature")]
    InvalidSignature,

    /// The provider has no secret configured, so nothing can be verified.
    #[error("Webhook provider is not configured")]
    NotConfigured,
}

impl WebhookError {
    pub fn code(&self) -> &'static str {
        match self {
            WebhookError::MissingSignature => "MISSING_SIGNATURE",
            WebhookError::InvalidSignature | WebhookError::NotConfigured => "INVALID_SIGNATURE",
        }
    }
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        ErrorResponse::new(self.code(), self.to_string())
            .into_response_with(StatusCode::UNAUTHORIZED)
    }
}

/// Errors from a payment provider's API when starting a checkout.
#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Provider returned an error: {0}")]
    Api(String),

    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),

    #[error("Amount {0} cannot be expressed in minor units")]
    InvalidAmount(rust_decimal::Decimal),
}
