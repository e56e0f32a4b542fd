//! Turns a handler panic into the standard 500 error envelope.

use std::any::Any;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::api_types::ErrorResponse;

/// Handler for `tower_http::catch_panic::CatchPanicLayer::custom`.
pub fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("non-string panic payload");
    tracing::error!(panic = detail, "Request handler panicked");

    ErrorResponse::new("INTERNAL_ERROR", "An unexpected error occurred")
        .into_response_with(StatusCode::INTERNAL_SERVER_ERROR)
        .into_response()
}
