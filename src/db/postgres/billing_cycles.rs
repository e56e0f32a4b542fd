use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use super::common::parse_enum;
use crate::{
    db::{
        error::{DbError, DbResult},
        repos::BillingCycleRepo,
    },
    models::{BillingCycle, BillingStatus, CreateBillingCycle},
};

const CYCLE_COLUMNS: &str = "id, organization_id, period_start, period_end, total_requests, total_amount, status, paid_at, created_at, updated_at";

/// Cycle state transitions and the existence checks that guard them always
/// go to the primary; only tenant-facing history reads use the replica.
pub struct PostgresBillingCycleRepo {
    write_pool: PgPool,
    read_pool: PgPool,
}

impl PostgresBillingCycleRepo {
    pub fn new(write_pool: PgPool, read_pool: Option<PgPool>) -> Self {
        let read_pool = read_pool.unwrap_or_else(|| write_pool.clone());
        Self {
            write_pool,
            read_pool,
        }
    }

    fn parse_cycle(row: &sqlx::postgres::PgRow) -> DbResult<BillingCycle> {
        Ok(BillingCycle {
            id: row.get("id"),
            organization_id: row.get("organization_id"),
            period_start: row.get("period_start"),
            period_end: row.get("period_end"),
            total_requests: row.get("total_requests"),
            total_amount: row.get("total_amount"),
            status: parse_enum(row.get("status"))?,
            paid_at: row.get("paid_at"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }
}

#[async_trait]
impl BillingCycleRepo for PostgresBillingCycleRepo {
    async fn create(&self, input: CreateBillingCycle) -> DbResult<BillingCycle> {
        let query = format!(
            r#"
            INSERT INTO billing_cycles
                (id, organization_id, period_start, period_end, total_requests, total_amount, status)
            VALUES ($1, $2, $3, $4, $5, $6, 'pending')
            RETURNING {CYCLE_COLUMNS}
            "#
        );
        let row = sqlx::query(&query)
            .bind(Uuid::new_v4())
            .bind(input.organization_id)
            .bind(input.period.start)
            .bind(input.period.end)
            .bind(input.total_requests)
            .bind(input.total_amount)
            .fetch_one(&self.write_pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                    DbError::Conflict(format!(
                        "Billing cycle for organization {} and period {} already exists",
                        input.organization_id, input.period
                    ))
                }
                _ => DbError::from(e),
            })?;

        Self::parse_cycle(&row)
    }

    async fn get_by_id(&self, id: Uuid) -> DbResult<Option<BillingCycle>> {
        let query = format!("SELECT {CYCLE_COLUMNS} FROM billing_cycles WHERE id = $1");
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.write_pool)
            .await?;

        row.as_ref().map(Self::parse_cycle).transpose()
    }

    async fn find_for_period(
        &self,
        org_id: Uuid,
        period_start: DateTime<Utc>,
    ) -> DbResult<Option<BillingCycle>> {
        let query = format!(
            "SELECT {CYCLE_COLUMNS} FROM billing_cycles WHERE organization_id = $1 AND period_start = $2"
        );
        let row = sqlx::query(&query)
            .bind(org_id)
            .bind(period_start)
            .fetch_optional(&self.write_pool)
            .await?;

        row.as_ref().map(Self::parse_cycle).transpose()
    }

    async fn latest_period_start(&self) -> DbResult<Option<DateTime<Utc>>> {
        let latest: Option<DateTime<Utc>> =
            sqlx::query_scalar("SELECT MAX(period_start) FROM billing_cycles")
                .fetch_one(&self.write_pool)
                .await?;
        Ok(latest)
    }

    async fn list_by_org(&self, org_id: Uuid) -> DbResult<Vec<BillingCycle>> {
        let query = format!(
            "SELECT {CYCLE_COLUMNS} FROM billing_cycles WHERE organization_id = $1 ORDER BY period_start DESC"
        );
        let rows = sqlx::query(&query)
            .bind(org_id)
            .fetch_all(&self.read_pool)
            .await?;

        rows.iter().map(Self::parse_cycle).collect()
    }

    async fn list_by_status(&self, status: BillingStatus) -> DbResult<Vec<BillingCycle>> {
        let query = format!(
            "SELECT {CYCLE_COLUMNS} FROM billing_cycles WHERE status = $1 ORDER BY period_end ASC, id ASC"
        );
        let rows = sqlx::query(&query)
            .bind(status.as_str())
            .fetch_all(&self.write_pool)
            .await?;

        rows.iter().map(Self::parse_cycle).collect()
    }

    async fn mark_paid(&self, id: Uuid, paid_at: DateTime<Utc>) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE billing_cycles
            SET status = 'paid', paid_at = $1, updated_at = NOW()
            WHERE id = $2 AND status IN ('pending', 'overdue')
            "#,
        )
        .bind(paid_at)
        .bind(id)
        .execute(&self.write_pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn mark_overdue(&self, id: Uuid) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE billing_cycles
            SET status = 'overdue', updated_at = NOW()
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(id)
        .execute(&self.write_pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
