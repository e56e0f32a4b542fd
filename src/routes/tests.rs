//! Router tests against an in-memory SQLite database and memory cache.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
    response::Response,
    routing::get,
};
use chrono::{Duration, Utc};
use http_body_util::BodyExt;
use rust_decimal::dec;
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

use crate::{
    AppState,
    auth::jwt::sign_for_tests,
    build_app,
    cache::{Cache, CacheError, CacheResult, MemoryCache},
    config::{MemoryCacheConfig, StripeConfig, TollgateConfig},
    db::{DbPool, tests::harness},
    middleware::{RATE_LIMIT_LIMIT_HEADER, RATE_LIMIT_REMAINING_HEADER, REQUEST_ID_HEADER},
    models::{
        BillingPeriod, BillingStatus, CreateBillingCycle, CreateUser, NewApiKey, Organization,
        Plan, UsageEvent, UserRole, generate_api_key_with_prefix,
    },
    payments::signature::sign_stripe,
    usage_sink::MemorySink,
    with_http_layers,
};

const JWT_SECRET: &str = "router-test-secret";
const WHSEC: &str = "whsec_router";
const QUOTA: u32 = 3;

struct TestApp {
    app: Router,
    state: AppState,
    db: Arc<DbPool>,
}

impl TestApp {
    async fn new() -> Self {
        let cache: Arc<dyn Cache> = Arc::new(MemoryCache::new(&MemoryCacheConfig::default()));
        Self::with_cache(cache).await
    }

    async fn with_cache(cache: Arc<dyn Cache>) -> Self {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();

        let mut config = TollgateConfig::default();
        config.auth.jwt_secret = Some(JWT_SECRET.to_string());
        config.limits.requests_per_minute = QUOTA;
        // Wide window so a test never straddles a boundary.
        config.limits.window_secs = 3600;
        config.payments.stripe = Some(StripeConfig {
            secret_key: "sk_test".into(),
            webhook_secret: WHSEC.into(),
            api_base: "http://127.0.0.1:9".into(),
            timestamp_tolerance_secs: 300,
            currency: "usd".into(),
        });

        let db = Arc::new(harness::sqlite_db().await);
        let state = AppState::from_parts(
            config,
            Some(Arc::clone(&db)),
            Some(cache),
            reqwest::Client::new(),
        );
        Self {
            app: build_app(state.clone()),
            state,
            db,
        }
    }

    async fn send(&self, request: Request<Body>) -> Response {
        self.app.clone().oneshot(request).await.unwrap()
    }

    async fn user_token(&self, org: &Organization, role: UserRole) -> String {
        let tag = Uuid::new_v4().simple().to_string();
        let user = self
            .db
            .users()
            .create(CreateUser {
                organization_id: org.id,
                email: format!("{tag}@example.com"),
                name: "Test User".into(),
                role,
            })
            .await
            .unwrap();
        sign_for_tests(JWT_SECRET, user.id, Duration::hours(1))
    }

    async fn api_key(&self, org: &Organization) -> String {
        let generated = generate_api_key_with_prefix("sk_live_");
        self.db
            .api_keys()
            .create(NewApiKey {
                organization_id: org.id,
                name: "test".into(),
                key_hash: generated.hash,
                key_prefix: generated.prefix,
                key_suffix: generated.suffix,
            })
            .await
            .unwrap();
        generated.raw
    }

    /// Flush the usage buffer and return what the pipeline recorded.
    async fn recorded_usage(&self) -> Vec<UsageEvent> {
        let buffer = self.state.usage_buffer.as_ref().unwrap();
        let sink = Arc::new(MemorySink::default());
        let worker = buffer.start_worker(sink.clone(), &self.state.task_tracker);
        buffer.shutdown();
        worker.await.unwrap();
        sink.events()
    }
}

/// A cache whose every call fails, as when Redis is unreachable.
struct BrokenCache;

#[async_trait]
impl Cache for BrokenCache {
    async fn incr(&self, _key: &str, _ttl: std::time::Duration) -> CacheResult<i64> {
        Err(CacheError::Internal("connection refused".into()))
    }

    async fn ping(&self) -> CacheResult<()> {
        Err(CacheError::Internal("connection refused".into()))
    }
}

async fn body_json(response: Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn send_message(key: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/api/v1/messages/send")
        .header("content-type", "application/json");
    if let Some(key) = key {
        builder = builder.header("x-api-key", key);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn dashboard(method: &str, uri: &str, token: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", format!("Bearer {token}"))
        .header("content-type", "application/json");
    match body {
        Some(body) => builder.body(Body::from(body.to_string())).unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

fn sms() -> Value {
    json!({"to": "+2348000000000", "message": "hello", "type": "sms"})
}

#[tokio::test]
async fn test_health_reports_subsystems() {
    let t = TestApp::new().await;
    let response = t
        .send(Request::get("/health").body(Body::empty()).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["subsystems"]["database"]["healthy"], true);
    assert_eq!(json["subsystems"]["cache"]["healthy"], true);

    for path in ["/health/live", "/health/ready"] {
        let response = t.send(Request::get(path).body(Body::empty()).unwrap()).await;
        assert_eq!(response.status(), StatusCode::OK, "{path}");
    }
}

#[tokio::test]
async fn test_missing_api_key() {
    let t = TestApp::new().await;
    let response = t.send(send_message(None, sms())).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().contains_key(REQUEST_ID_HEADER));

    let json = body_json(response).await;
    assert_eq!(json["success"], false);
    assert_eq!(json["error"]["code"], "MISSING_API_KEY");
    assert!(json["error"]["request_id"].is_string());
}

#[tokio::test]
async fn test_unknown_api_key() {
    let t = TestApp::new().await;
    let response = t
        .send(send_message(Some("sk_live_doesnotexist"), sms()))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"]["code"], "INVALID_API_KEY");
}

#[tokio::test]
async fn test_quota_rejects_after_limit() {
    let t = TestApp::new().await;
    let org = harness::seed_org(&t.db, Plan::Free).await;
    let key = t.api_key(&org).await;

    for expected_remaining in (0..QUOTA).rev() {
        let response = t.send(send_message(Some(&key), sms())).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[RATE_LIMIT_LIMIT_HEADER], QUOTA.to_string());
        assert_eq!(
            response.headers()[RATE_LIMIT_REMAINING_HEADER],
            expected_remaining.to_string()
        );
        let json = body_json(response).await;
        assert!(json["data"]["message_id"].as_str().unwrap().starts_with("msg_"));
        assert_eq!(json["data"]["organization_id"], org.id.to_string());
    }

    let response = t.send(send_message(Some(&key), sms())).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key("retry-after"));
    let json = body_json(response).await;
    assert_eq!(json["error"]["code"], "RATE_LIMIT_EXCEEDED");
    assert_eq!(json["error"]["details"]["limit"], QUOTA);

    // Only admitted requests are metered.
    let buffer = t.state.usage_buffer.as_ref().unwrap();
    assert_eq!(buffer.len(), QUOTA as usize);
}

#[tokio::test]
async fn test_quota_is_per_tenant() {
    let t = TestApp::new().await;
    let busy = harness::seed_org(&t.db, Plan::Free).await;
    let quiet = harness::seed_org(&t.db, Plan::Free).await;
    let busy_key = t.api_key(&busy).await;
    let quiet_key = t.api_key(&quiet).await;

    for _ in 0..=QUOTA {
        t.send(send_message(Some(&busy_key), sms())).await;
    }
    let response = t.send(send_message(Some(&quiet_key), sms())).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_message_validation() {
    let t = TestApp::new().await;
    let org = harness::seed_org(&t.db, Plan::Pro).await;
    let key = t.api_key(&org).await;

    let response = t
        .send(send_message(
            Some(&key),
            json!({"to": "a@example.com", "message": "hi", "type": "fax"}),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["error"]["code"], "VALIDATION_ERROR");

    let response = t
        .send(
            Request::post("/api/v1/messages/send")
                .header("x-api-key", &key)
                .header("content-type", "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"]["code"], "INVALID_REQUEST");
}

#[tokio::test]
async fn test_message_status() {
    let t = TestApp::new().await;
    let org = harness::seed_org(&t.db, Plan::Pro).await;
    let key = t.api_key(&org).await;

    let response = t
        .send(
            Request::get("/api/v1/messages/msg_abc")
                .header("x-api-key", &key)
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["message_id"], "msg_abc");
    assert_eq!(json["data"]["status"], "delivered");
}

#[tokio::test]
async fn test_message_status_is_not_metered() {
    let t = TestApp::new().await;
    let org = harness::seed_org(&t.db, Plan::Free).await;
    let key = t.api_key(&org).await;

    for _ in 0..=QUOTA {
        let response = t
            .send(
                Request::get("/api/v1/messages/msg_abc")
                    .header("x-api-key", &key)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(!response.headers().contains_key(RATE_LIMIT_LIMIT_HEADER));
    }
    assert!(t.state.usage_buffer.as_ref().unwrap().is_empty());

    // Polling left the whole quota for sending.
    let response = t.send(send_message(Some(&key), sms())).await;
    assert_eq!(
        response.headers()[RATE_LIMIT_REMAINING_HEADER],
        (QUOTA - 1).to_string()
    );

    let response = t
        .send(Request::get("/api/v1/messages/msg_abc").body(Body::empty()).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"]["code"], "MISSING_API_KEY");
}

#[tokio::test]
async fn test_usage_records_response_status() {
    let t = TestApp::new().await;
    let org = harness::seed_org(&t.db, Plan::Pro).await;
    let key = t.api_key(&org).await;

    let response = t.send(send_message(Some(&key), sms())).await;
    assert_eq!(response.status(), StatusCode::OK);
    let response = t
        .send(send_message(
            Some(&key),
            json!({"to": "+2348000000000", "message": "hi", "type": "fax"}),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let events = t.recorded_usage().await;
    let statuses: Vec<u16> = events.iter().map(|e| e.status_code).collect();
    assert_eq!(statuses, vec![200, 400]);
    for event in &events {
        assert_eq!(event.organization_id, org.id);
        assert!(event.api_key_id.is_some());
        assert_eq!(event.method, "POST");
        assert_eq!(event.endpoint, "/api/v1/messages/send");
    }
}

#[tokio::test]
async fn test_unreachable_cache_admits_and_meters() {
    let t = TestApp::with_cache(Arc::new(BrokenCache)).await;
    let org = harness::seed_org(&t.db, Plan::Free).await;
    let key = t.api_key(&org).await;

    for _ in 0..=QUOTA {
        let response = t.send(send_message(Some(&key), sms())).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(!response.headers().contains_key(RATE_LIMIT_LIMIT_HEADER));
        assert!(!response.headers().contains_key(RATE_LIMIT_REMAINING_HEADER));
    }

    let events = t.recorded_usage().await;
    assert_eq!(events.len(), QUOTA as usize + 1);
    assert!(events.iter().all(|e| e.status_code == 200));
}

#[tokio::test]
async fn test_security_and_cors_headers() {
    let t = TestApp::new().await;
    let response = t
        .send(Request::get("/health").body(Body::empty()).unwrap())
        .await;
    let headers = response.headers();
    assert_eq!(headers["x-content-type-options"], "nosniff");
    assert_eq!(headers["x-frame-options"], "DENY");
    assert_eq!(headers["content-security-policy"], "default-src 'self'");
    assert_eq!(headers["referrer-policy"], "strict-origin-when-cross-origin");
    assert!(!headers.contains_key("strict-transport-security"));

    let response = t
        .send(
            Request::builder()
                .method("OPTIONS")
                .uri("/api/v1/messages/send")
                .header("origin", "https://app.example.com")
                .header("access-control-request-method", "POST")
                .header("access-control-request-headers", "x-api-key")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert_eq!(headers["access-control-allow-origin"], "*");
    let methods = headers["access-control-allow-methods"].to_str().unwrap();
    assert!(methods.contains("POST"));
    let allowed = headers["access-control-allow-headers"]
        .to_str()
        .unwrap()
        .to_ascii_lowercase();
    assert!(allowed.contains("x-api-key"));
}

#[tokio::test]
async fn test_handler_panic_renders_internal_error() {
    let t = TestApp::new().await;
    async fn explode() -> &'static str {
        panic!("handler failure")
    }
    let router = Router::new().route("/explode", get(explode));
    let app = with_http_layers(router, &t.state.config.server).with_state(t.state.clone());

    let response = app
        .oneshot(Request::get("/explode").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(response.headers().contains_key(REQUEST_ID_HEADER));
    assert_eq!(response.headers()["x-frame-options"], "DENY");
    let json = body_json(response).await;
    assert_eq!(json["success"], false);
    assert_eq!(json["error"]["code"], "INTERNAL_ERROR");
    assert_eq!(json["error"]["message"], "An unexpected error occurred");
}

#[tokio::test]
async fn test_dashboard_requires_token() {
    let t = TestApp::new().await;
    let response = t
        .send(Request::get("/api/v1/keys").body(Body::empty()).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"]["code"], "UNAUTHORIZED");

    // An API key is not a dashboard credential.
    let org = harness::seed_org(&t.db, Plan::Free).await;
    let key = t.api_key(&org).await;
    let response = t
        .send(
            Request::get("/api/v1/keys")
                .header("x-api-key", key)
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_key_lifecycle() {
    let t = TestApp::new().await;
    let org = harness::seed_org(&t.db, Plan::Starter).await;
    let owner = t.user_token(&org, UserRole::Owner).await;

    let response = t
        .send(dashboard(
            "POST",
            "/api/v1/keys",
            &owner,
            Some(json!({"name": "ci"})),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let json = body_json(response).await;
    let raw = json["data"]["key"].as_str().unwrap().to_string();
    let id = json["data"]["id"].as_str().unwrap().to_string();
    assert!(raw.starts_with("sk_live_"));
    assert_eq!(raw.len(), 8 + 64);

    // The new key works on the programmatic surface.
    let response = t.send(send_message(Some(&raw), sms())).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = t.send(dashboard("GET", "/api/v1/keys", &owner, None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    let listed = json["data"][0]["key"].as_str().unwrap();
    assert_ne!(listed, raw);
    assert!(listed.contains('*'));
    assert!(listed.ends_with(&raw[raw.len() - 4..]));

    let uri = format!("/api/v1/keys/{id}");
    let response = t.send(dashboard("DELETE", &uri, &owner, None)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = t.send(send_message(Some(&raw), sms())).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_key_permissions() {
    let t = TestApp::new().await;
    let org = harness::seed_org(&t.db, Plan::Starter).await;
    let other = harness::seed_org(&t.db, Plan::Starter).await;
    let member = t.user_token(&org, UserRole::Member).await;
    let admin = t.user_token(&org, UserRole::Admin).await;
    let other_admin = t.user_token(&other, UserRole::Admin).await;

    let response = t
        .send(dashboard(
            "POST",
            "/api/v1/keys",
            &member,
            Some(json!({"name": "nope"})),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(response).await["error"]["code"], "PERMISSION_DENIED");

    let response = t
        .send(dashboard("POST", "/api/v1/keys", &admin, Some(json!({"name": ""}))))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"]["code"], "VALIDATION_ERROR");

    let response = t
        .send(dashboard(
            "POST",
            "/api/v1/keys",
            &admin,
            Some(json!({"name": "ours"})),
        ))
        .await;
    let id = body_json(response).await["data"]["id"]
        .as_str()
        .unwrap()
        .to_string();

    let uri = format!("/api/v1/keys/{id}");
    let response = t.send(dashboard("DELETE", &uri, &other_admin, None)).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let uri = format!("/api/v1/keys/{}", Uuid::new_v4());
    let response = t.send(dashboard("DELETE", &uri, &admin, None)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["error"]["code"], "KEY_NOT_FOUND");
}

#[tokio::test]
async fn test_upgrade_plan() {
    let t = TestApp::new().await;
    let org = harness::seed_org(&t.db, Plan::Free).await;
    let owner = t.user_token(&org, UserRole::Owner).await;
    let admin = t.user_token(&org, UserRole::Admin).await;
    let upgrade = |token: &str, plan: &str| {
        dashboard(
            "POST",
            "/api/v1/billing/upgrade",
            token,
            Some(json!({ "plan": plan })),
        )
    };

    let response = t.send(upgrade(&admin, "pro")).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = t.send(upgrade(&owner, "enterprise")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"]["code"], "INVALID_PLAN");

    let response = t.send(upgrade(&owner, "free")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"]["code"], "SAME_PLAN");

    let response = t.send(upgrade(&owner, "pro")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["data"]["plan"], "pro");

    let org = t.db.organizations().get_by_id(org.id).await.unwrap().unwrap();
    assert_eq!(org.plan, Plan::Pro);
}

#[tokio::test]
async fn test_billing_reads() {
    let t = TestApp::new().await;
    let org = harness::seed_org(&t.db, Plan::Starter).await;
    let key = t.api_key(&org).await;
    let owner = t.user_token(&org, UserRole::Owner).await;
    t.db.billing_cycles()
        .create(CreateBillingCycle {
            organization_id: org.id,
            period: BillingPeriod::for_month(2025, 1).unwrap(),
            total_requests: 10,
            total_amount: dec!(29.10),
        })
        .await
        .unwrap();

    let response = t.send(send_message(Some(&key), sms())).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = t
        .send(dashboard("GET", "/api/v1/billing/history", &owner, None))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["invoices"].as_array().unwrap().len(), 1);
    let outstanding: rust_decimal::Decimal = json["data"]["summary"]["outstanding"]
        .as_str()
        .unwrap()
        .parse()
        .unwrap();
    assert_eq!(outstanding, dec!(29.10));

    let response = t
        .send(dashboard("GET", "/api/v1/billing/calculate", &owner, None))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["data"]["plan"], "starter");

    let response = t
        .send(dashboard("GET", "/api/v1/billing/usage", &owner, None))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_usage_range_at_calendar_limits() {
    let t = TestApp::new().await;
    let org = harness::seed_org(&t.db, Plan::Starter).await;
    let owner = t.user_token(&org, UserRole::Owner).await;

    // The last representable day has no following midnight.
    let response = t
        .send(dashboard(
            "GET",
            "/api/v1/billing/usage?end_date=%2B262142-12-31",
            &owner,
            None,
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_initiate_payment_rejections() {
    let t = TestApp::new().await;
    let org = harness::seed_org(&t.db, Plan::Starter).await;
    let owner = t.user_token(&org, UserRole::Owner).await;
    let initiate = |body: Value| {
        dashboard(
            "POST",
            "/api/v1/billing/initiate-payment",
            &owner,
            Some(body),
        )
    };

    let response = t
        .send(initiate(json!({"billing_cycle_id": "not-a-uuid"})))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"]["code"], "INVALID_CYCLE_ID");

    let response = t
        .send(initiate(
            json!({"billing_cycle_id": Uuid::new_v4(), "provider": "paypal"}),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"]["code"], "INVALID_PROVIDER");

    let response = t
        .send(initiate(json!({"billing_cycle_id": Uuid::new_v4()})))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["error"]["code"], "CYCLE_NOT_FOUND");
}

#[tokio::test]
async fn test_stripe_webhook_pays_cycle() {
    let t = TestApp::new().await;
    let org = harness::seed_org(&t.db, Plan::Starter).await;
    let cycle = t
        .db
        .billing_cycles()
        .create(CreateBillingCycle {
            organization_id: org.id,
            period: BillingPeriod::for_month(2025, 1).unwrap(),
            total_requests: 10,
            total_amount: dec!(29.10),
        })
        .await
        .unwrap();

    let payload = json!({
        "type": "checkout.session.completed",
        "data": {"object": {
            "id": "cs_test_1",
            "amount_total": 2910,
            "payment_status": "paid",
            "metadata": {"billing_cycle_id": cycle.id, "organization_id": org.id},
        }},
    })
    .to_string();
    let webhook = |signature: Option<String>| {
        let mut builder = Request::post("/webhooks/stripe");
        if let Some(signature) = signature {
            builder = builder.header("stripe-signature", signature);
        }
        builder.body(Body::from(payload.clone())).unwrap()
    };

    let response = t.send(webhook(None)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"]["code"], "MISSING_SIGNATURE");

    let forged = sign_stripe(payload.as_bytes(), "whsec_wrong", Utc::now().timestamp());
    let response = t.send(webhook(Some(forged))).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"]["code"], "INVALID_SIGNATURE");

    let stored = t.db.billing_cycles().get_by_id(cycle.id).await.unwrap().unwrap();
    assert_eq!(stored.status, BillingStatus::Pending);

    let signed = sign_stripe(payload.as_bytes(), WHSEC, Utc::now().timestamp());
    for _ in 0..2 {
        let response = t.send(webhook(Some(signed.clone()))).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({"status": "received"}));
    }

    let stored = t.db.billing_cycles().get_by_id(cycle.id).await.unwrap().unwrap();
    assert_eq!(stored.status, BillingStatus::Paid);
    assert!(stored.paid_at.is_some());
}

#[tokio::test]
async fn test_unconfigured_provider_webhook() {
    let t = TestApp::new().await;
    let response = t
        .send(
            Request::post("/webhooks/paystack")
                .header("x-paystack-signature", "abc")
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
