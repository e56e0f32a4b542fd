use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::common::{parse_decimal, parse_enum, parse_uuid};
use crate::{
    db::{
        error::{DbError, DbResult},
        repos::BillingCycleRepo,
    },
    models::{BillingCycle, BillingStatus, CreateBillingCycle},
};

const CYCLE_COLUMNS: &str = "id, organization_id, period_start, period_end, total_requests, total_amount, status, paid_at, created_at, updated_at";

pub struct SqliteBillingCycleRepo {
    pool: SqlitePool,
}

impl SqliteBillingCycleRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn parse_cycle(row: &sqlx::sqlite::SqliteRow) -> DbResult<BillingCycle> {
        Ok(BillingCycle {
            id: parse_uuid(row.get("id"))?,
            organization_id: parse_uuid(row.get("organization_id"))?,
            period_start: row.get("period_start"),
            period_end: row.get("period_end"),
            total_requests: row.get("total_requests"),
            total_amount: parse_decimal(row.get("total_amount"))?,
            status: parse_enum(row.get("status"))?,
            paid_at: row.get("paid_at"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }
}

#[async_trait]
impl BillingCycleRepo for SqliteBillingCycleRepo {
    async fn create(&self, input: CreateBillingCycle) -> DbResult<BillingCycle> {
        let id = Uuid::new_v4();
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO billing_cycles
                (id, organization_id, period_start, period_end, total_requests, total_amount, status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, 'pending', ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(input.organization_id.to_string())
        .bind(input.period.start)
        .bind(input.period.end)
        .bind(input.total_requests)
        .bind(input.total_amount.to_string())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => DbError::Conflict(
                format!(
                    "Billing cycle for organization {} and period {} already exists",
                    input.organization_id, input.period
                ),
            ),
            _ => DbError::from(e),
        })?;

        Ok(BillingCycle {
            id,
            organization_id: input.organization_id,
            period_start: input.period.start,
            period_end: input.period.end,
            total_requests: input.total_requests,
            total_amount: input.total_amount,
            status: BillingStatus::Pending,
            paid_at: None,
            created_at: now,
            updated_at: now,
        })
    }

    async fn get_by_id(&self, id: Uuid) -> DbResult<Option<BillingCycle>> {
        let query = format!("SELECT {CYCLE_COLUMNS} FROM billing_cycles WHERE id = ?");
        let row = sqlx::query(&query)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::parse_cycle).transpose()
    }

    async fn find_for_period(
        &self,
        org_id: Uuid,
        period_start: DateTime<Utc>,
    ) -> DbResult<Option<BillingCycle>> {
        let query = format!(
            "SELECT {CYCLE_COLUMNS} FROM billing_cycles WHERE organization_id = ? AND period_start = ?"
        );
        let row = sqlx::query(&query)
            .bind(org_id.to_string())
            .bind(period_start)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::parse_cycle).transpose()
    }

    async fn latest_period_start(&self) -> DbResult<Option<DateTime<Utc>>> {
        let row = sqlx::query(
            "SELECT period_start FROM billing_cycles ORDER BY period_start DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.get("period_start")))
    }

    async fn list_by_org(&self, org_id: Uuid) -> DbResult<Vec<BillingCycle>> {
        let query = format!(
            "SELECT {CYCLE_COLUMNS} FROM billing_cycles WHERE organization_id = ? ORDER BY period_start DESC"
        );
        let rows = sqlx::query(&query)
            .bind(org_id.to_string())
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::parse_cycle).collect()
    }

    async fn list_by_status(&self, status: BillingStatus) -> DbResult<Vec<BillingCycle>> {
        let query = format!(
            "SELECT {CYCLE_COLUMNS} FROM billing_cycles WHERE status = ? ORDER BY period_end ASC, id ASC"
        );
        let rows = sqlx::query(&query)
            .bind(status.as_str())
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::parse_cycle).collect()
    }

    async fn mark_paid(&self, id: Uuid, paid_at: DateTime<Utc>) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE billing_cycles
            SET status = 'paid', paid_at = ?, updated_at = ?
            WHERE id = ? AND status IN ('pending', 'overdue')
            "#,
        )
        .bind(paid_at)
        .bind(Utc::now())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn mark_overdue(&self, id: Uuid) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE billing_cycles
            SET status = 'overdue', updated_at = ?
            WHERE id = ? AND status = 'pending'
            "#,
        )
        .bind(Utc::now())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
