use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::{
    auth::TenantContext,
    db::{DbError, DbPool},
    models::{ApiKey, CreateApiKey, NewApiKey, generate_api_key_with_prefix},
};

#[derive(Debug, thiserror::Error)]
pub enum ApiKeyError {
    #[error(transparent)]
    Database(#[from] DbError),

    #[error("Only owner and admin roles can manage API keys")]
    PermissionDenied,

    #[error("API key not found")]
    NotFound,
}

/// A key as shown in listings: never the secret.
#[derive(Debug, Clone, Serialize)]
pub struct ApiKeyView {
    pub id: Uuid,
    pub name: String,
    pub key: String,
    pub is_active: bool,
    pub last_used_at: Option<chrono::DateTime<chrono::Utc>>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl From<ApiKey> for ApiKeyView {
    fn from(key: ApiKey) -> Self {
        Self {
            key: key.masked(),
            id: key.id,
            name: key.name,
            is_active: key.is_active,
            last_used_at: key.last_used_at,
            created_at: key.created_at,
        }
    }
}

/// A newly created key. `key` holds the raw secret, returned exactly once.
#[derive(Debug, Clone, Serialize)]
pub struct CreatedApiKey {
    pub id: Uuid,
    pub name: String,
    pub key: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Credential management for dashboard users.
#[derive(Clone)]
pub struct ApiKeyService {
    db: Arc<DbPool>,
    prefix: String,
}

impl ApiKeyService {
    pub fn new(db: Arc<DbPool>, prefix: impl Into<String>) -> Self {
        Self {
            db,
            prefix: prefix.into(),
        }
    }

    pub async fn create(
        &self,
        ctx: &TenantContext,
        input: CreateApiKey,
    ) -> Result<CreatedApiKey, ApiKeyError> {
        require_key_manager(ctx)?;

        let generated = generate_api_key_with_prefix(&self.prefix);
        let key = self
            .db
            .api_keys()
            .create(NewApiKey {
                organization_id: ctx.organization_id,
                name: input.name,
                key_hash: generated.hash,
                key_prefix: generated.prefix,
                key_suffix: generated.suffix,
            })
            .await?;

        tracing::info!(api_key_id = %key.id, org_id = %ctx.organization_id, "API key created");
        Ok(CreatedApiKey {
            id: key.id,
            name: key.name,
            key: generated.raw,
            created_at: key.created_at,
        })
    }

    pub async fn list(&self, ctx: &TenantContext) -> Result<Vec<ApiKeyView>, ApiKeyError> {
        let keys = self.db.api_keys().list_by_org(ctx.organization_id).await?;
        Ok(keys.into_iter().map(ApiKeyView::from).collect())
    }

    /// Deactivate a key owned by the caller's tenant.
    pub async fn revoke(&self, ctx: &TenantContext, id: Uuid) -> Result<(), ApiKeyError> {
        let key = self
            .db
            .api_keys()
            .get_by_id(id)
            .await?
            .ok_or(ApiKeyError::NotFound)?;
        if key.organization_id != ctx.organization_id {
            return Err(ApiKeyError::PermissionDenied);
        }
        require_key_manager(ctx)?;

        self.db.api_keys().deactivate(id).await?;
        tracing::info!(api_key_id = %id, org_id = %ctx.organization_id, "API key revoked");
        Ok(())
    }
}

fn require_key_manager(ctx: &TenantContext) -> Result<(), ApiKeyError> {
    match ctx.role() {
        Some(role) if role.can_manage_keys() => Ok(()),
        _ => Err(ApiKeyError::PermissionDenied),
    }
}
