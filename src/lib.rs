//! Tollgate: multi-tenant API gateway core.
//!
//! Every programmatic request passes identity → quota → handler → usage.
//! Usage is billed monthly per tenant and reconciled against payment
//! provider webhooks.

pub mod api_types;
pub mod auth;
pub mod cache;
pub mod config;
pub mod db;
pub mod jobs;
pub mod middleware;
pub mod models;
pub mod observability;
pub mod payments;
pub mod pricing;
pub mod routes;
pub mod services;
pub mod usage_buffer;
pub mod usage_sink;

use std::{sync::Arc, time::Duration};

use axum::{
    Router,
    routing::{delete, get, post},
};
use reqwest::Client;
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tower_http::{
    catch_panic::CatchPanicLayer, limit::RequestBodyLimitLayer, trace::TraceLayer,
};

use crate::{
    auth::{IdentityResolver, JwtVerifier, LAST_USED_QUEUE_CAPACITY, LastUsedUpdater},
    payments::{CheckoutService, PaymentReconciler},
    services::{QuotaLimiter, Services},
    usage_buffer::{UsageBuffer, UsageBufferConfig},
    usage_sink::DatabaseSink,
};

/// Shared state handed to every handler and middleware.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<config::TollgateConfig>,
    pub db: Option<Arc<db::DbPool>>,
    pub cache: Option<Arc<dyn cache::Cache>>,
    pub http_client: Client,
    pub identity: Arc<IdentityResolver>,
    pub quota: Arc<QuotaLimiter>,
    /// Database-backed services. `None` without a database.
    pub services: Option<Services>,
    pub checkout: Option<CheckoutService>,
    pub reconciler: Option<Arc<PaymentReconciler>>,
    /// Bounded queue between the request path and the usage store.
    pub usage_buffer: Option<Arc<UsageBuffer>>,
    /// Tracks detached background work so shutdown can wait for it.
    pub task_tracker: TaskTracker,
    pub shutdown: CancellationToken,
}

#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("Database initialization failed: {0}")]
    Database(#[from] db::DbError),

    #[error("Cache initialization failed: {0}")]
    Cache(#[from] cache::CacheError),

    #[error("HTTP client initialization failed: {0}")]
    HttpClient(#[from] reqwest::Error),
}

impl AppState {
    /// Connect to the configured stores and assemble the state.
    pub async fn new(config: config::TollgateConfig) -> Result<Self, InitError> {
        let db = if config.database.is_none() {
            None
        } else {
            let pool = db::DbPool::from_config(&config.database).await?;
            pool.run_migrations().await?;
            Some(Arc::new(pool))
        };
        let cache = cache::from_config(&config.cache).await?;
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.server.timeout_secs))
            .build()?;

        Ok(Self::from_parts(config, db, cache, http_client))
    }

    /// Assemble the state from already-connected stores. Must be called
    /// inside a Tokio runtime: it spawns the last-used worker.
    pub fn from_parts(
        config: config::TollgateConfig,
        db: Option<Arc<db::DbPool>>,
        cache: Option<Arc<dyn cache::Cache>>,
        http_client: Client,
    ) -> Self {
        let task_tracker = TaskTracker::new();
        let shutdown = CancellationToken::new();

        let jwt = config
            .auth
            .jwt_secret
            .as_deref()
            .map(|secret| JwtVerifier::new(secret, config.auth.jwt_leeway_secs));
        let last_used = db.as_ref().map(|db| {
            LastUsedUpdater::spawn(
                Arc::clone(db),
                LAST_USED_QUEUE_CAPACITY,
                &task_tracker,
                shutdown.clone(),
            )
        });
        let identity = Arc::new(IdentityResolver::new(
            db.clone(),
            jwt,
            config.auth.api_key_prefix.clone(),
            last_used,
        ));
        let quota = Arc::new(QuotaLimiter::new(cache.clone(), config.limits.clone()));

        let services = db.as_ref().map(|db| Services::new(Arc::clone(db), &config));
        let checkout = db
            .as_ref()
            .map(|db| CheckoutService::new(Arc::clone(db), http_client.clone(), &config.payments));
        let reconciler = db
            .as_ref()
            .map(|db| Arc::new(PaymentReconciler::new(Arc::clone(db), config.payments.clone())));
        let usage_buffer = (config.usage.enabled && db.is_some())
            .then(|| Arc::new(UsageBuffer::new(UsageBufferConfig::from(&config.usage))));

        Self {
            config: Arc::new(config),
            db,
            cache,
            http_client,
            identity,
            quota,
            services,
            checkout,
            reconciler,
            usage_buffer,
            task_tracker,
            shutdown,
        }
    }

    /// Start the usage flush worker writing to the database.
    pub fn start_usage_worker(&self) -> Option<tokio::task::JoinHandle<()>> {
        let buffer = self.usage_buffer.as_ref()?;
        let db = self.db.as_ref()?;
        let sink = Arc::new(DatabaseSink::new(Arc::clone(db)));
        let handle = buffer.start_worker(sink, &self.task_tracker);
        tracing::info!("Usage buffer worker started");
        Some(handle)
    }
}

/// Build the HTTP router.
///
/// Programmatic routes (`/api/v1/messages`) authenticate with `X-API-Key`.
/// Sending runs through quota and usage recording; the status lookup only
/// authenticates. Dashboard routes authenticate with
/// a bearer token only. Webhooks carry no credential besides their signature.
pub fn build_app(state: AppState) -> Router {
    let metered = Router::new()
        .route("/messages/send", post(routes::messages::send_message))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::api_key_pipeline,
        ));

    let lookups = Router::new()
        .route("/messages/{id}", get(routes::messages::get_message_status))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::api_key_auth_middleware,
        ));

    let dashboard = Router::new()
        .route(
            "/keys",
            post(routes::keys::create_key).get(routes::keys::list_keys),
        )
        .route("/keys/{id}", delete(routes::keys::revoke_key))
        .route("/billing/usage", get(routes::billing::usage))
        .route("/billing/history", get(routes::billing::history))
        .route("/billing/calculate", get(routes::billing::calculate))
        .route("/billing/upgrade", post(routes::billing::upgrade_plan))
        .route(
            "/billing/initiate-payment",
            post(routes::billing::initiate_payment),
        )
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::jwt_auth_middleware,
        ));

    let webhooks = Router::new()
        .route("/stripe", post(routes::webhooks::stripe))
        .route("/paystack", post(routes::webhooks::paystack));

    let mut app = Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/health/live", get(routes::health::liveness))
        .route("/health/ready", get(routes::health::readiness));

    if state.config.observability.metrics.enabled {
        app = app.route("/metrics", get(routes::health::metrics));
    }

    let app = app
        .nest("/api/v1", metered.merge(lookups).merge(dashboard))
        .nest("/webhooks", webhooks);
    with_http_layers(app, &state.config.server).with_state(state)
}

/// Layers shared by every route, innermost first: panic recovery, request
/// ids, security headers, CORS, tracing and the body limit.
pub fn with_http_layers(
    router: Router<AppState>,
    server: &config::ServerConfig,
) -> Router<AppState> {
    let mut router = router
        .layer(CatchPanicLayer::custom(middleware::panic_response))
        .layer(axum::middleware::from_fn(middleware::request_id_middleware))
        .layer(axum::middleware::from_fn_with_state(
            Arc::new(server.security_headers.clone()),
            middleware::security_headers_middleware,
        ));
    if let Some(cors) = server.cors.layer() {
        router = router.layer(cors);
    }
    router
        .layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(server.body_limit_bytes))
}
