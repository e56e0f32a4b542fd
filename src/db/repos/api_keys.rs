use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    db::error::DbResult,
    models::{ApiKey, NewApiKey},
};

#[async_trait]
pub trait ApiKeyRepo: Send + Sync {
    async fn create(&self, input: NewApiKey) -> DbResult<ApiKey>;
    async fn get_by_id(&self, id: Uuid) -> DbResult<Option<ApiKey>>;
    /// Look up a key by the SHA-256 of its secret, active or not.
    async fn get_by_hash(&self, key_hash: &str) -> DbResult<Option<ApiKey>>;
    /// All keys of a tenant, newest first.
    async fn list_by_org(&self, org_id: Uuid) -> DbResult<Vec<ApiKey>>;
    /// Mark a key inactive. Returns false if no such key exists.
    async fn deactivate(&self, id: Uuid) -> DbResult<bool>;
    async fn update_last_used(&self, id: Uuid) -> DbResult<()>;
}
