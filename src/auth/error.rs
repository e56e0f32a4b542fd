use std::fmt;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::api_types::ErrorResponse;

/// Credential failures. Every variant except `Internal` is an
/// invalid-credential outcome and renders as 401.
#[derive(Debug)]
pub enum AuthError {
    /// No `Authorization` header on a token route
    MissingToken,

    /// `Authorization` is present but not `Bearer <token>`
    InvalidTokenFormat,

    /// Signature, format or subject checks failed
    InvalidToken,

    ExpiredToken,

    /// Token subject does not resolve to a user
    UnknownUser,

    /// No `X-API-Key` header on a key route
    MissingApiKey,

    /// Key not found or deactivated
    InvalidApiKey,

    /// The route's credential scheme is not configured
    NotConfigured(&'static str),

    Internal(String),
}

impl AuthError {
    fn parts(&self) -> (StatusCode, &'static str) {
        match self {
            AuthError::MissingToken => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            AuthError::InvalidTokenFormat => (StatusCode::UNAUTHORIZED, "INVALID_TOKEN_FORMAT"),
            AuthError::InvalidToken | AuthError::ExpiredToken | AuthError::UnknownUser => {
                (StatusCode::UNAUTHORIZED, "INVALID_TOKEN")
            }
            AuthError::MissingApiKey => (StatusCode::UNAUTHORIZED, "MISSING_API_KEY"),
            AuthError::InvalidApiKey => (StatusCode::UNAUTHORIZED, "INVALID_API_KEY"),
            AuthError::NotConfigured(_) => (StatusCode::SERVICE_UNAVAILABLE, "NOT_CONFIGURED"),
            AuthError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }

    /// Whether the caller presented a bad credential, as opposed to the
    /// gateway failing to check it.
    pub fn is_credential_failure(&self) -> bool {
        self.parts().0 == StatusCode::UNAUTHORIZED
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, code) = self.parts();
        let message = match &self {
            // Don't leak internals to the caller.
            AuthError::Internal(detail) => {
                tracing::error!(error = %detail, "Authentication failed with internal error");
                "Authentication could not be completed".to_string()
            }
            other => other.to_string(),
        };
        ErrorResponse::new(code, message).into_response_with(status)
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::MissingToken => {
                write!(f, "Authentication required. Please provide a valid token.")
            }
            AuthError::InvalidTokenFormat => {
                write!(f, "Authorization header must be in format: Bearer <token>")
            }
            AuthError::InvalidToken | AuthError::ExpiredToken | AuthError::UnknownUser => {
                write!(f, "The provided token is invalid or has expired")
            }
            AuthError::MissingApiKey => {
                write!(f, "API key is required. Please provide X-API-Key header.")
            }
            AuthError::InvalidApiKey => {
                write!(f, "The provided API key is invalid or has been deactivated")
            }
            AuthError::NotConfigured(what) => write!(f, "{what} is not configured"),
            AuthError::Internal(msg) => write!(f, "Internal authentication error: {msg}"),
        }
    }
}

impl std::error::Error for AuthError {}

#[cfg(test)]
mod tests {
    use http_body_util::BodyExt;

    use super::*;

    async fn render(err: AuthError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_credential_failures_are_401() {
        for (err, code) in [
            (AuthError::MissingToken, "UNAUTHORIZED"),
            (AuthError::InvalidTokenFormat, "INVALID_TOKEN_FORMAT"),
            (AuthError::InvalidToken, "INVALID_TOKEN"),
            (AuthError::ExpiredToken, "INVALID_TOKEN"),
            (AuthError::UnknownUser, "INVALID_TOKEN"),
            (AuthError::MissingApiKey, "MISSING_API_KEY"),
            (AuthError::InvalidApiKey, "INVALID_API_KEY"),
        ] {
            assert!(err.is_credential_failure());
            let (status, body) = render(err).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED);
            assert_eq!(body["success"], false);
            assert_eq!(body["error"]["code"], code);
        }
    }

    #[tokio::test]
    async fn test_internal_error_hides_detail() {
        let (status, body) = render(AuthError::Internal("pool timed out".into())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"]["code"], "INTERNAL_ERROR");
        assert!(!body["error"]["message"].as_str().unwrap().contains("pool"));
    }
}
