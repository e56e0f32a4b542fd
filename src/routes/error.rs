use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use axum_valid::ValidRejection;
use serde_json::json;

use crate::{
    api_types::ErrorResponse,
    auth::AuthError,
    db::DbError,
    payments::CheckoutError,
    services::{ApiKeyError, BillingError},
};

/// Failure of a dashboard or programmatic handler.
#[derive(Debug)]
pub enum ApiError {
    /// Body could not be parsed.
    InvalidRequest(String),
    /// A field failed validation.
    Validation {
        field: String,
        reason: String,
        message: String,
    },
    /// Request was well-formed but names something unusable.
    BadRequest {
        code: &'static str,
        message: String,
    },
    Forbidden(String),
    NotFound {
        code: &'static str,
        message: String,
    },
    Auth(AuthError),
    /// Upstream payment provider failed.
    Payment(String),
    DatabaseRequired,
    Database(DbError),
    Internal(String),
}

impl ApiError {
    pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        Self::BadRequest {
            code,
            message: message.into(),
        }
    }

    pub fn not_found(code: &'static str, message: impl Into<String>) -> Self {
        Self::NotFound {
            code,
            message: message.into(),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        ApiError::Auth(err)
    }
}

impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotConfigured => ApiError::DatabaseRequired,
            other => ApiError::Database(other),
        }
    }
}

impl From<ApiKeyError> for ApiError {
    fn from(err: ApiKeyError) -> Self {
        match err {
            ApiKeyError::NotFound => ApiError::not_found("KEY_NOT_FOUND", "API key not found"),
            ApiKeyError::PermissionDenied => ApiError::Forbidden(err.to_string()),
            ApiKeyError::Database(db) => db.into(),
        }
    }
}

impl From<BillingError> for ApiError {
    fn from(err: BillingError) -> Self {
        match err {
            BillingError::SamePlan(_) => ApiError::bad_request("SAME_PLAN", err.to_string()),
            BillingError::OrganizationNotFound(_) => {
                ApiError::not_found("ORGANIZATION_NOT_FOUND", "Organization not found")
            }
            BillingError::Database(db) => db.into(),
        }
    }
}

impl From<CheckoutError> for ApiError {
    fn from(err: CheckoutError) -> Self {
        match err {
            CheckoutError::CycleNotFound => {
                ApiError::not_found("CYCLE_NOT_FOUND", err.to_string())
            }
            CheckoutError::PermissionDenied => ApiError::Forbidden(err.to_string()),
            CheckoutError::AlreadyPaid => ApiError::bad_request("ALREADY_PAID", err.to_string()),
            CheckoutError::ProviderUnavailable(_) => {
                ApiError::bad_request("INVALID_PROVIDER", err.to_string())
            }
            CheckoutError::OrganizationNotFound => {
                ApiError::not_found("ORGANIZATION_NOT_FOUND", err.to_string())
            }
            CheckoutError::Payment(e) => {
                tracing::error!(error = %e, "Payment provider call failed");
                ApiError::Payment("Failed to initiate payment".to_string())
            }
            CheckoutError::Database(db) => db.into(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::InvalidRequest(rejection.body_text())
    }
}

impl From<ValidRejection<JsonRejection>> for ApiError {
    fn from(rejection: ValidRejection<JsonRejection>) -> Self {
        match rejection {
            ValidRejection::Inner(inner) => inner.into(),
            ValidRejection::Valid(errors) => {
                // Report the first failing field, sorted for a stable answer.
                let mut fields: Vec<_> = errors.field_errors().into_iter().collect();
                fields.sort_by(|a, b| a.0.cmp(&b.0));
                match fields.first().and_then(|(f, errs)| Some((f, errs.first()?))) {
                    Some((field, error)) => {
                        let reason = error
                            .message
                            .as_ref()
                            .map(|m| m.to_string())
                            .unwrap_or_else(|| error.code.to_string());
                        ApiError::Validation {
                            field: field.to_string(),
                            message: format!("Invalid value for '{field}'"),
                            reason,
                        }
                    }
                    None => ApiError::InvalidRequest(errors.to_string()),
                }
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Auth(err) => return err.into_response(),
            ApiError::InvalidRequest(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorResponse::new("INVALID_REQUEST", msg),
            ),
            ApiError::Validation {
                field,
                reason,
                message,
            } => (
                StatusCode::BAD_REQUEST,
                ErrorResponse::new("VALIDATION_ERROR", message)
                    .with_details(json!({ "field": field, "reason": reason })),
            ),
            ApiError::BadRequest { code, message } => {
                (StatusCode::BAD_REQUEST, ErrorResponse::new(code, message))
            }
            ApiError::Forbidden(msg) => (
                StatusCode::FORBIDDEN,
                ErrorResponse::new("PERMISSION_DENIED", msg),
            ),
            ApiError::NotFound { code, message } => {
                (StatusCode::NOT_FOUND, ErrorResponse::new(code, message))
            }
            ApiError::Payment(msg) => (
                StatusCode::BAD_GATEWAY,
                ErrorResponse::new("PAYMENT_ERROR", msg),
            ),
            ApiError::DatabaseRequired => (
                StatusCode::SERVICE_UNAVAILABLE,
                ErrorResponse::new("SERVICE_UNAVAILABLE", "Database not configured"),
            ),
            ApiError::Database(err) => {
                tracing::error!(error = %err, "Database error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::new("INTERNAL_ERROR", "An internal error occurred"),
                )
            }
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::new("INTERNAL_ERROR", "An internal error occurred"),
                )
            }
        };
        body.into_response_with(status)
    }
}
