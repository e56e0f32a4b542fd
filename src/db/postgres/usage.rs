use async_trait::async_trait;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::{
    db::{
        error::DbResult,
        repos::{TimeRange, UsageRepo},
    },
    models::{EndpointUsage, UsageEvent},
};

/// Rows per multi-row INSERT. Keeps each statement well under the
/// protocol's 65535 bind parameter limit.
const MAX_ROWS_PER_INSERT: usize = 1000;

pub struct PostgresUsageRepo {
    write_pool: PgPool,
    read_pool: PgPool,
}

impl PostgresUsageRepo {
    pub fn new(write_pool: PgPool, read_pool: Option<PgPool>) -> Self {
        let read_pool = read_pool.unwrap_or_else(|| write_pool.clone());
        Self {
            write_pool,
            read_pool,
        }
    }
}

#[async_trait]
impl UsageRepo for PostgresUsageRepo {
    async fn insert_batch(&self, events: &[UsageEvent]) -> DbResult<usize> {
        if events.is_empty() {
            return Ok(0);
        }

        let mut tx = self.write_pool.begin().await?;
        let mut inserted = 0usize;

        for chunk in events.chunks(MAX_ROWS_PER_INSERT) {
            let mut builder = sqlx::QueryBuilder::<sqlx::Postgres>::new(
                "INSERT INTO usage_records (id, organization_id, api_key_id, endpoint, method, status_code, created_at) ",
            );
            builder.push_values(chunk, |mut row, event| {
                row.push_bind(Uuid::new_v4())
                    .push_bind(event.organization_id)
                    .push_bind(event.api_key_id)
                    .push_bind(&event.endpoint)
                    .push_bind(&event.method)
                    .push_bind(i32::from(event.status_code))
                    .push_bind(event.occurred_at);
            });

            let result = builder.build().execute(&mut *tx).await?;
            inserted += result.rows_affected() as usize;
        }

        tx.commit().await?;
        Ok(inserted)
    }

    async fn count_for_org(&self, org_id: Uuid, range: TimeRange) -> DbResult<i64> {
        // Billing reads from the primary so a cycle never misses recent rows.
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS total
            FROM usage_records
            WHERE organization_id = $1 AND created_at >= $2 AND created_at < $3
            "#,
        )
        .bind(org_id)
        .bind(range.start)
        .bind(range.end)
        .fetch_one(&self.write_pool)
        .await?;

        Ok(row.get("total"))
    }

    async fn summary_by_endpoint(
        &self,
        org_id: Uuid,
        range: TimeRange,
    ) -> DbResult<Vec<EndpointUsage>> {
        let rows = sqlx::query(
            r#"
            SELECT endpoint,
                   COUNT(*) AS total_requests,
                   COUNT(*) FILTER (WHERE status_code < 400) AS success_count,
                   COUNT(*) FILTER (WHERE status_code >= 400) AS error_count
            FROM usage_records
            WHERE organization_id = $1 AND created_at >= $2 AND created_at < $3
            GROUP BY endpoint
            ORDER BY total_requests DESC, endpoint ASC
            "#,
        )
        .bind(org_id)
        .bind(range.start)
        .bind(range.end)
        .fetch_all(&self.read_pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| EndpointUsage {
                endpoint: row.get("endpoint"),
                total_requests: row.get("total_requests"),
                success_count: row.get("success_count"),
                error_count: row.get("error_count"),
            })
            .collect())
    }
}
