//! Hardening headers applied to every response.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{HeaderMap, header::STRICT_TRANSPORT_SECURITY},
    middleware::Next,
    response::Response,
};

use crate::config::SecurityHeadersConfig;

pub async fn security_headers_middleware(
    State(config): State<Arc<SecurityHeadersConfig>>,
    req: Request,
    next: Next,
) -> Response {
    let secure = is_secure(&req);
    let mut response = next.run(req).await;
    if !config.enabled {
        return response;
    }

    let headers = response.headers_mut();
    for (name, value) in config.headers() {
        // Handlers may set their own policy.
        if !headers.contains_key(&name) {
            headers.insert(name, value);
        }
    }
    if secure && let Some(hsts) = config.hsts() {
        headers.insert(STRICT_TRANSPORT_SECURITY, hsts);
    }
    response
}

fn is_secure(req: &Request) -> bool {
    req.uri().scheme_str() == Some("https") || forwarded_https(req.headers())
}

fn forwarded_https(headers: &HeaderMap) -> bool {
    headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|proto| proto.eq_ignore_ascii_case("https"))
}

#[cfg(test)]
mod tests {
    use axum::{Router, body::Body, routing::get};
    use tower::ServiceExt;

    use super::*;

    fn app(config: SecurityHeadersConfig) -> Router {
        Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(axum::middleware::from_fn_with_state(
                Arc::new(config),
                security_headers_middleware,
            ))
    }

    fn hsts_config() -> SecurityHeadersConfig {
        SecurityHeadersConfig {
            hsts_max_age_secs: Some(600),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_hsts_only_over_https() {
        let plain = app(hsts_config())
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(plain.headers()["x-frame-options"], "DENY");
        assert!(!plain.headers().contains_key(STRICT_TRANSPORT_SECURITY));

        let forwarded = app(hsts_config())
            .oneshot(
                Request::get("/")
                    .header("x-forwarded-proto", "https")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(
            forwarded.headers()[STRICT_TRANSPORT_SECURITY],
            "max-age=600; includeSubDomains"
        );
    }

    #[tokio::test]
    async fn test_disabled_adds_nothing() {
        let config = SecurityHeadersConfig {
            enabled: false,
            ..Default::default()
        };
        let response = app(config)
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert!(!response.headers().contains_key("x-content-type-options"));
    }
}
