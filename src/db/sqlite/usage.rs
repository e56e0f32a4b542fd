use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::{
    db::{
        error::DbResult,
        repos::{TimeRange, UsageRepo},
    },
    models::{EndpointUsage, UsageEvent},
};

/// SQLite caps bound parameters per statement; 7 columns per row.
const MAX_ROWS_PER_INSERT: usize = 100;

pub struct SqliteUsageRepo {
    pool: SqlitePool,
}

impl SqliteUsageRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UsageRepo for SqliteUsageRepo {
    async fn insert_batch(&self, events: &[UsageEvent]) -> DbResult<usize> {
        if events.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut inserted = 0usize;

        for chunk in events.chunks(MAX_ROWS_PER_INSERT) {
            let mut builder = sqlx::QueryBuilder::<sqlx::Sqlite>::new(
                "INSERT INTO usage_records (id, organization_id, api_key_id, endpoint, method, status_code, created_at) ",
            );
            builder.push_values(chunk, |mut row, event| {
                row.push_bind(Uuid::new_v4().to_string())
                    .push_bind(event.organization_id.to_string())
                    .push_bind(event.api_key_id.map(|id| id.to_string()))
                    .push_bind(&event.endpoint)
                    .push_bind(&event.method)
                    .push_bind(i64::from(event.status_code))
                    .push_bind(event.occurred_at);
            });

            let result = builder.build().execute(&mut *tx).await?;
            inserted += result.rows_affected() as usize;
        }

        tx.commit().await?;
        Ok(inserted)
    }

    async fn count_for_org(&self, org_id: Uuid, range: TimeRange) -> DbResult<i64> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS total
            FROM usage_records
            WHERE organization_id = ? AND created_at >= ? AND created_at < ?
            "#,
        )
        .bind(org_id.to_string())
        .bind(range.start)
        .bind(range.end)
        .fetch_one(&self.pool)
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
                   SUM(CASE WHEN status_code < 400 THEN 1 ELSE 0 END) AS success_count,
                   SUM(CASE WHEN status_code >= 400 THEN 1 ELSE 0 END) AS error_count
            FROM usage_records
            WHERE organization_id = ? AND created_at >= ? AND created_at < ?
            GROUP BY endpoint
            ORDER BY total_requests DESC, endpoint ASC
            "#,
        )
        .bind(org_id.to_string())
        .bind(range.start)
        .bind(range.end)
        .fetch_all(&self.pool)
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
