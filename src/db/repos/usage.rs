use async_trait::async_trait;
use uuid::Uuid;

use super::TimeRange;
use crate::{
    db::error::DbResult,
    models::{EndpointUsage, UsageEvent},
};

#[async_trait]
pub trait UsageRepo: Send + Sync {
    /// Insert a batch of events in one transaction.
    /// Returns the number of rows written.
    async fn insert_batch(&self, events: &[UsageEvent]) -> DbResult<usize>;

    /// Number of events for a tenant with `start <= created_at < end`.
    async fn count_for_org(&self, org_id: Uuid, range: TimeRange) -> DbResult<i64>;

    /// Per-endpoint totals for a tenant, busiest endpoint first.
    async fn summary_by_endpoint(
        &self,
        org_id: Uuid,
        range: TimeRange,
    ) -> DbResult<Vec<EndpointUsage>>;
}
