//! Payment provider callbacks.
//!
//! Only signature failures are reported to the provider. Once a payload is
//! verified it is acknowledged whatever happens next, so providers do not
//! retry events this service has already seen or cannot use.

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::{IntoResponse, Response},
};

use crate::{
    AppState,
    api_types::WebhookAck,
    payments::{Provider, WebhookError},
};

async fn receive(state: &AppState, provider: Provider, headers: &HeaderMap, body: &[u8]) -> Response {
    let Some(reconciler) = &state.reconciler else {
        tracing::warn!(%provider, "Webhook received without a database configured");
        return WebhookError::NotConfigured.into_response();
    };
    match reconciler.handle(provider, headers, body).await {
        Ok(outcome) => {
            tracing::debug!(%provider, outcome = outcome.label(), "Webhook acknowledged");
            WebhookAck::received().into_response()
        }
        Err(e) => e.into_response(),
    }
}

pub async fn stripe(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    receive(&state, Provider::Stripe, &headers, &body).await
}

pub async fn paystack(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    receive(&state, Provider::Paystack, &headers, &body).await
}
