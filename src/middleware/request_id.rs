//! Request correlation ids.
//!
//! An incoming `X-Request-Id` is kept, otherwise a v4 UUID is generated. The
//! id is attached to the request span, echoed in the response header, and
//! written into `error.request_id` of JSON error envelopes.

use axum::{
    body::Body,
    extract::Request,
    http::{HeaderValue, header::CONTENT_TYPE},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::Instrument;
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Request extension holding the correlation id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

pub async fn request_id_middleware(mut req: Request, next: Next) -> Response {
    let request_id = req
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty() && s.len() <= 128)
        .map(|s| RequestId(s.to_string()))
        .unwrap_or_else(RequestId::generate);
    req.extensions_mut().insert(request_id.clone());

    let span = tracing::info_span!(
        "request",
        request_id = %request_id,
        method = %req.method(),
        path = %req.uri().path(),
    );

    let response = next.run(req).instrument(span).await;
    let mut response = tag_error_body(response, &request_id).await;
    if let Ok(value) = HeaderValue::try_from(request_id.0) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// Add `error.request_id` to JSON error envelopes. Other responses pass
/// through untouched.
async fn tag_error_body(response: Response, request_id: &RequestId) -> Response {
    let status = response.status();
    if !status.is_client_error() && !status.is_server_error() {
        return response;
    }
    let is_json = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/json"));
    if !is_json {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(_) => return (parts, Body::empty()).into_response(),
    };

    let tagged = serde_json::from_slice::<serde_json::Value>(&bytes)
        .ok()
        .and_then(|mut json| {
            json.get_mut("error")?.as_object_mut()?.insert(
                "request_id".to_string(),
                serde_json::Value::String(request_id.0.clone()),
            );
            serde_json::to_vec(&json).ok()
        });

    match tagged {
        Some(body) => {
            parts.headers.remove(axum::http::header::CONTENT_LENGTH);
            Response::from_parts(parts, Body::from(body))
        }
        None => Response::from_parts(parts, Body::from(bytes)),
    }
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use http_body_util::BodyExt;

    use super::*;
    use crate::api_types::ErrorResponse;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_error_envelope_gets_request_id() {
        let response = ErrorResponse::new("INVALID_API_KEY", "bad key")
            .into_response_with(StatusCode::UNAUTHORIZED);
        let tagged = tag_error_body(response, &RequestId("req-1".into())).await;
        assert_eq!(tagged.status(), StatusCode::UNAUTHORIZED);

        let json = body_json(tagged).await;
        assert_eq!(json["error"]["request_id"], "req-1");
        assert_eq!(json["error"]["code"], "INVALID_API_KEY");
    }

    #[tokio::test]
    async fn test_success_is_untouched() {
        let response =
            crate::api_types::ApiResponse::ok(serde_json::json!({"a": 1})).into_response();
        let tagged = tag_error_body(response, &RequestId("req-2".into())).await;
        let json = body_json(tagged).await;
        assert!(json.get("error").is_none());
        assert_eq!(json["data"]["a"], 1);
    }

    #[tokio::test]
    async fn test_non_json_error_is_untouched() {
        let response = (StatusCode::BAD_REQUEST, "Bad Request").into_response();
        let tagged = tag_error_body(response, &RequestId("req-3".into())).await;
        let bytes = tagged.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(bytes.as_ref(), b"Bad Request");
    }

    #[test]
    fn test_generated_ids_differ() {
        assert_ne!(RequestId::generate(), RequestId::generate());
    }
}
