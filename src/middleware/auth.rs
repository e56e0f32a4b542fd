use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::AppState;

/// Bearer-token authentication for dashboard routes.
///
/// Inserts the resolved [`TenantContext`](crate::auth::TenantContext) into
/// the request extensions. Dashboard traffic is not quota-checked or
/// metered.
pub async fn jwt_auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    match state.identity.resolve_bearer(req.headers()).await {
        Ok(ctx) => {
            req.extensions_mut().insert(ctx);
            next.run(req).await
        }
        Err(e) => e.into_response(),
    }
}
