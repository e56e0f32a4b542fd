use async_trait::async_trait;
use uuid::Uuid;

use super::ListParams;
use crate::{
    db::error::DbResult,
    models::{CreateOrganization, Organization, Plan},
};

#[async_trait]
pub trait OrganizationRepo: Send + Sync {
    async fn create(&self, input: CreateOrganization) -> DbResult<Organization>;
    async fn get_by_id(&self, id: Uuid) -> DbResult<Option<Organization>>;
    /// One page of tenants ordered by creation time. An empty page means the
    /// listing is exhausted.
    async fn list(&self, params: ListParams) -> DbResult<Vec<Organization>>;
    /// Returns `DbError::NotFound` if the tenant does not exist.
    async fn update_plan(&self, id: Uuid, plan: Plan) -> DbResult<Organization>;
}
