use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    db::error::DbResult,
    models::{BillingCycle, BillingStatus, CreateBillingCycle},
};

#[async_trait]
pub trait BillingCycleRepo: Send + Sync {
    /// Insert a new `pending` cycle.
    ///
    /// Returns `DbError::Conflict` if the tenant already has a cycle starting
    /// at the same `period_start`.
    async fn create(&self, input: CreateBillingCycle) -> DbResult<BillingCycle>;

    async fn get_by_id(&self, id: Uuid) -> DbResult<Option<BillingCycle>>;

    async fn find_for_period(
        &self,
        org_id: Uuid,
        period_start: DateTime<Utc>,
    ) -> DbResult<Option<BillingCycle>>;

    /// Start of the most recent period any tenant has a cycle for.
    async fn latest_period_start(&self) -> DbResult<Option<DateTime<Utc>>>;

    /// All cycles of a tenant, most recent period first.
    async fn list_by_org(&self, org_id: Uuid) -> DbResult<Vec<BillingCycle>>;

    /// All cycles in `status`, oldest period first.
    async fn list_by_status(&self, status: BillingStatus) -> DbResult<Vec<BillingCycle>>;

    /// Transition `pending`/`overdue` → `paid`.
    ///
    /// Returns false when the cycle was already paid or does not exist; the
    /// row is left untouched in that case.
    async fn mark_paid(&self, id: Uuid, paid_at: DateTime<Utc>) -> DbResult<bool>;

    /// Transition `pending` → `overdue`. Returns false for any other status.
    async fn mark_overdue(&self, id: Uuid) -> DbResult<bool>;
}
