use async_trait::async_trait;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use super::common::parse_enum;
use crate::{
    db::{
        error::{DbError, DbResult},
        repos::{ListParams, OrganizationRepo},
    },
    models::{CreateOrganization, Organization, Plan},
};

pub struct PostgresOrganizationRepo {
    write_pool: PgPool,
    read_pool: PgPool,
}

impl PostgresOrganizationRepo {
    pub fn new(write_pool: PgPool, read_pool: Option<PgPool>) -> Self {
        let read_pool = read_pool.unwrap_or_else(|| write_pool.clone());
        Self {
            write_pool,
            read_pool,
        }
    }

    fn parse_org(row: &sqlx::postgres::PgRow) -> DbResult<Organization> {
        let rate_limit: Option<i32> = row.get("rate_limit_per_minute");
        Ok(Organization {
            id: row.get("id"),
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
impl OrganizationRepo for PostgresOrganizationRepo {
    async fn create(&self, input: CreateOrganization) -> DbResult<Organization> {
        let rate_limit = input
            .rate_limit_per_minute
            .map(i32::try_from)
            .transpose()
            .map_err(|_| DbError::Validation("rate_limit_per_minute is too large".into()))?;

        let row = sqlx::query(
            r#"
            INSERT INTO organizations (id, name, email, plan, rate_limit_per_minute)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, name, email, plan, rate_limit_per_minute, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&input.name)
        .bind(&input.email)
        .bind(input.plan.as_str())
        .bind(rate_limit)
        .fetch_one(&self.write_pool)
        .await?;

        Self::parse_org(&row)
    }

    async fn get_by_id(&self, id: Uuid) -> DbResult<Option<Organization>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, email, plan, rate_limit_per_minute, created_at, updated_at
            FROM organizations
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.read_pool)
        .await?;

        row.as_ref().map(Self::parse_org).transpose()
    }

    async fn list(&self, params: ListParams) -> DbResult<Vec<Organization>> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, email, plan, rate_limit_per_minute, created_at, updated_at
            FROM organizations
            ORDER BY created_at ASC, id ASC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(params.limit)
        .bind(params.offset)
        .fetch_all(&self.read_pool)
        .await?;

        rows.iter().map(Self::parse_org).collect()
    }

    async fn update_plan(&self, id: Uuid, plan: Plan) -> DbResult<Organization> {
        let row = sqlx::query(
            r#"
            UPDATE organizations
            SET plan = $1, updated_at = NOW()
            WHERE id = $2
            RETURNING id, name, email, plan, rate_limit_per_minute, created_at, updated_at
            "#,
        )
        .bind(plan.as_str())
        .bind(id)
        .fetch_optional(&self.write_pool)
        .await?
        .ok_or(DbError::NotFound)?;

        Self::parse_org(&row)
    }
}
