//! Credential resolution.
//!
//! Two schemes, never offered together on one route:
//! - Bearer tokens (dashboard): the subject is a user; the tenant is that
//!   user's organization.
//! - `X-API-Key` (programmatic): the key names its tenant directly.
//!
//! Both produce a [`TenantContext`], which the rest of the pipeline receives
//! explicitly through request extensions.

use std::sync::Arc;

use axum::http::{HeaderMap, header::AUTHORIZATION};
use uuid::Uuid;

use super::{AuthError, JwtVerifier, LastUsedUpdater};
use crate::{
    db::{DbError, DbPool},
    models::{Organization, Plan, UserRole, hash_api_key},
    observability::metrics,
};

pub const API_KEY_HEADER: &str = "x-api-key";

/// Who is calling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    User { id: Uuid, role: UserRole },
    ApiKey { id: Uuid },
}

/// A verified caller and the tenant it acts for.
#[derive(Debug, Clone)]
pub struct TenantContext {
    pub organization_id: Uuid,
    pub plan: Plan,
    /// Tenant-level quota override from the organization row.
    pub rate_limit_override: Option<u32>,
    pub principal: Principal,
}

impl TenantContext {
    fn new(org: Organization, principal: Principal) -> Self {
        Self {
            organization_id: org.id,
            plan: org.plan,
            rate_limit_override: org.rate_limit_per_minute,
            principal,
        }
    }

    pub fn user_id(&self) -> Option<Uuid> {
        match self.principal {
            Principal::User { id, .. } => Some(id),
            Principal::ApiKey { .. } => None,
        }
    }

    pub fn role(&self) -> Option<UserRole> {
        match self.principal {
            Principal::User { role, .. } => Some(role),
            Principal::ApiKey { .. } => None,
        }
    }

    pub fn api_key_id(&self) -> Option<Uuid> {
        match self.principal {
            Principal::ApiKey { id } => Some(id),
            Principal::User { .. } => None,
        }
    }
}

/// Resolves credentials to tenants. Fails closed: any lookup error rejects.
pub struct IdentityResolver {
    db: Option<Arc<DbPool>>,
    jwt: Option<JwtVerifier>,
    key_prefix: String,
    last_used: Option<LastUsedUpdater>,
}

impl IdentityResolver {
    pub fn new(
        db: Option<Arc<DbPool>>,
        jwt: Option<JwtVerifier>,
        key_prefix: impl Into<String>,
        last_used: Option<LastUsedUpdater>,
    ) -> Self {
        Self {
            db,
            jwt,
            key_prefix: key_prefix.into(),
            last_used,
        }
    }

    /// Resolve the `Authorization: Bearer` header.
    pub async fn resolve_bearer(&self, headers: &HeaderMap) -> Result<TenantContext, AuthError> {
        let result = async {
            let token = bearer_token(headers)?;
            self.resolve_token(token).await
        }
        .await;
        metrics::record_auth_attempt("jwt", result.is_ok());
        result
    }

    /// Resolve the `X-API-Key` header.
    pub async fn resolve_api_key(&self, headers: &HeaderMap) -> Result<TenantContext, AuthError> {
        let result = async {
            let key = api_key_header(headers)?;
            self.resolve_key(key).await
        }
        .await;
        metrics::record_auth_attempt("api_key", result.is_ok());
        result
    }

    pub async fn resolve_token(&self, token: &str) -> Result<TenantContext, AuthError> {
        let jwt = self
            .jwt
            .as_ref()
            .ok_or(AuthError::NotConfigured("JWT authentication"))?;
        let db = self.db()?;

        let user_id = jwt.verify(token)?;
        let user = db
            .users()
            .get_by_id(user_id)
            .await
            .map_err(internal)?
            .ok_or(AuthError::UnknownUser)?;
        let org = db
            .organizations()
            .get_by_id(user.organization_id)
            .await
            .map_err(internal)?
            .ok_or(AuthError::UnknownUser)?;

        tracing::debug!(user_id = %user.id, org_id = %org.id, "Resolved bearer token");
        Ok(TenantContext::new(
            org,
            Principal::User {
                id: user.id,
                role: user.role,
            },
        ))
    }

    pub async fn resolve_key(&self, raw_key: &str) -> Result<TenantContext, AuthError> {
        // Keys we never issue can't be in the store.
        if !raw_key.starts_with(&self.key_prefix) {
            return Err(AuthError::InvalidApiKey);
        }
        let db = self.db()?;

        let key = db
            .api_keys()
            .get_by_hash(&hash_api_key(raw_key))
            .await
            .map_err(internal)?
            .filter(|k| k.is_active)
            .ok_or(AuthError::InvalidApiKey)?;
        let org = db
            .organizations()
            .get_by_id(key.organization_id)
            .await
            .map_err(internal)?
            .ok_or(AuthError::InvalidApiKey)?;

        if let Some(last_used) = &self.last_used {
            last_used.touch(key.id);
        }

        tracing::debug!(api_key_id = %key.id, org_id = %org.id, "Resolved API key");
        Ok(TenantContext::new(org, Principal::ApiKey { id: key.id }))
    }

    fn db(&self) -> Result<&Arc<DbPool>, AuthError> {
        self.db.as_ref().ok_or(AuthError::NotConfigured("Database"))
    }
}

fn internal(e: DbError) -> AuthError {
    AuthError::Internal(e.to_string())
}

/// Extract `<token>` from `Authorization: Bearer <token>`.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers
        .get(AUTHORIZATION)
        .ok_or(AuthError::MissingToken)?
        .to_str()
        .map_err(|_| AuthError::InvalidTokenFormat)?;

    let mut parts = value.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("Bearer"), Some(token), None) if !token.is_empty() => Ok(token),
        _ => Err(AuthError::InvalidTokenFormat),
    }
}

pub fn api_key_header(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers
        .get(API_KEY_HEADER)
        .ok_or(AuthError::MissingApiKey)?
        .to_str()
        .map_err(|_| AuthError::InvalidApiKey)?
        .trim();
    if value.is_empty() {
        return Err(AuthError::MissingApiKey);
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn headers(name: &'static str, value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(name, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_bearer_token_parsing() {
        assert_eq!(
            bearer_token(&headers("authorization", "Bearer abc")).unwrap(),
            "abc"
        );
        assert!(matches!(
            bearer_token(&HeaderMap::new()),
            Err(AuthError::MissingToken)
        ));
        for bad in ["abc", "Basic abc", "Bearer", "Bearer a b", "Bearer "] {
            assert!(
                matches!(
                    bearer_token(&headers("authorization", bad)),
                    Err(AuthError::InvalidTokenFormat)
                ),
                "{bad}"
            );
        }
    }

    #[test]
    fn test_api_key_header_is_case_insensitive() {
        assert_eq!(
            api_key_header(&headers("X-API-Key", "sk_live_x")).unwrap(),
            "sk_live_x"
        );
        assert!(matches!(
            api_key_header(&headers("x-api-key", "  ")),
            Err(AuthError::MissingApiKey)
        ));
    }

    #[cfg(feature = "database-sqlite")]
    mod resolution {
        use chrono::Duration;

        use super::*;
        use crate::{
            auth::jwt::sign_for_tests,
            db::tests::harness,
            models::{CreateUser, NewApiKey, generate_api_key},
        };

        const SECRET: &str = "resolver-secret";

        async fn setup() -> (Arc<DbPool>, IdentityResolver) {
            let db = Arc::new(harness::sqlite_db().await);
            let resolver = IdentityResolver::new(
                Some(Arc::clone(&db)),
                Some(JwtVerifier::new(SECRET, 0)),
                "sk_live_",
                None,
            );
            (db, resolver)
        }

        #[tokio::test]
        async fn test_token_resolves_users_tenant() {
            let (db, resolver) = setup().await;
            let org = harness::seed_org(&db, Plan::Pro).await;
            let user = db
                .users()
                .create(CreateUser {
                    organization_id: org.id,
                    email: "owner@example.com".into(),
                    name: "Owner".into(),
                    role: UserRole::Owner,
                })
                .await
                .unwrap();

            let token = sign_for_tests(SECRET, user.id, Duration::hours(1));
            let ctx = resolver.resolve_token(&token).await.unwrap();
            assert_eq!(ctx.organization_id, org.id);
            assert_eq!(ctx.plan, Plan::Pro);
            assert_eq!(ctx.user_id(), Some(user.id));
            assert_eq!(ctx.role(), Some(UserRole::Owner));
            assert_eq!(ctx.api_key_id(), None);
        }

        #[tokio::test]
        async fn test_token_for_unknown_user() {
            let (_db, resolver) = setup().await;
            let token = sign_for_tests(SECRET, Uuid::new_v4(), Duration::hours(1));
            assert!(matches!(
                resolver.resolve_token(&token).await,
                Err(AuthError::UnknownUser)
            ));
        }

        #[tokio::test]
        async fn test_api_key_resolution() {
            let (db, resolver) = setup().await;
            let org = harness::seed_org(&db, Plan::Starter).await;
            let generated = generate_api_key();
            let key = db
                .api_keys()
                .create(NewApiKey {
                    organization_id: org.id,
                    name: "prod".into(),
                    key_hash: generated.hash.clone(),
                    key_prefix: generated.prefix.clone(),
                    key_suffix: generated.suffix.clone(),
                })
                .await
                .unwrap();

            let ctx = resolver.resolve_key(&generated.raw).await.unwrap();
            assert_eq!(ctx.organization_id, org.id);
            assert_eq!(ctx.api_key_id(), Some(key.id));
            assert_eq!(ctx.user_id(), None);

            db.api_keys().deactivate(key.id).await.unwrap();
            assert!(matches!(
                resolver.resolve_key(&generated.raw).await,
                Err(AuthError::InvalidApiKey)
            ));
        }

        #[tokio::test]
        async fn test_unknown_and_foreign_prefix_keys() {
            let (_db, resolver) = setup().await;
            assert!(matches!(
                resolver.resolve_key(&generate_api_key().raw).await,
                Err(AuthError::InvalidApiKey)
            ));
            assert!(matches!(
                resolver.resolve_key("pk_test_123").await,
                Err(AuthError::InvalidApiKey)
            ));
        }

        #[tokio::test]
        async fn test_token_scheme_unconfigured() {
            let db = Arc::new(harness::sqlite_db().await);
            let resolver = IdentityResolver::new(Some(db), None, "sk_live_", None);
            assert!(matches!(
                resolver.resolve_token("x").await,
                Err(AuthError::NotConfigured(_))
            ));
        }
    }
}
