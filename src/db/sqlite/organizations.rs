use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::common::{parse_enum, parse_uuid};
use crate::{
    db::{
        error::{DbError, DbResult},
        repos::{ListParams, OrganizationRepo},
    },
    models::{CreateOrganization, Organization, Plan},
};

pub struct SqliteOrganizationRepo {
    pool: SqlitePool,
}

impl SqliteOrganizationRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn parse_org(row: &sqlx::sqlite::SqliteRow) -> DbResult<Organization> {
        let rate_limit: Option<i64> = row.get("rate_limit_per_minute");
        Ok(Organization {
            id: parse_uuid(row.get("id"))?,
            name: row.get("name"),
            email: row.get("email"),
            plan: parse_enum(row.get("plan"))?,
            rate_limit_per_minute: rate_limit.and_then(|v| u32::try_from(v).ok()),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }
}

#[async_trait]
impl OrganizationRepo for SqliteOrganizationRepo {
    async fn create(&self, input: CreateOrganization) -> DbResult<Organization> {
        let id = Uuid::new_v4();
        let now = chrono::Utc::now();

        sqlx::query(
            r#"
            INSERT INTO organizations (id, name, email, plan, rate_limit_per_minute, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(&input.name)
        .bind(&input.email)
        .bind(input.plan.as_str())
        .bind(input.rate_limit_per_minute.map(i64::from))
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(Organization {
            id,
            name: input.name,
            email: input.email,
            plan: input.plan,
            rate_limit_per_minute: input.rate_limit_per_minute,
            created_at: now,
            updated_at: now,
        })
    }

    async fn get_by_id(&self, id: Uuid) -> DbResult<Option<Organization>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, email, plan, rate_limit_per_minute, created_at, updated_at
            FROM organizations
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::parse_org).transpose()
    }

    async fn list(&self, params: ListParams) -> DbResult<Vec<Organization>> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, email, plan, rate_limit_per_minute, created_at, updated_at
            FROM organizations
            ORDER BY created_at ASC, id ASC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(params.limit)
        .bind(params.offset)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::parse_org).collect()
    }

    async fn update_plan(&self, id: Uuid, plan: Plan) -> DbResult<Organization> {
        let now = chrono::Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE organizations
            SET plan = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(plan.as_str())
        .bind(now)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }

        self.get_by_id(id).await?.ok_or(DbError::NotFound)
    }
}
