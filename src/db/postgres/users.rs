use async_trait::async_trait;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use super::common::parse_enum;
use crate::{
    db::{
        error::{DbError, DbResult},
        repos::UserRepo,
    },
    models::{CreateUser, User},
};

pub struct PostgresUserRepo {
    write_pool: PgPool,
    read_pool: PgPool,
}

impl PostgresUserRepo {
    pub fn new(write_pool: PgPool, read_pool: Option<PgPool>) -> Self {
        let read_pool = read_pool.unwrap_or_else(|| write_pool.clone());
        Self {
            write_pool,
            read_pool,
        }
    }

    fn parse_user(row: &sqlx::postgres::PgRow) -> DbResult<User> {
        Ok(User {
            id: row.get("id"),
            organization_id: row.get("organization_id"),
            email: row.get("email"),
            name: row.get("name"),
            role: parse_enum(row.get("role"))?,
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }
}

#[async_trait]
impl UserRepo for PostgresUserRepo {
    async fn create(&self, input: CreateUser) -> DbResult<User> {
        let row = sqlx::query(
            r#"
            INSERT INTO users (id, organization_id, email, name, role)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, organization_id, email, name, role, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(input.organization_id)
        .bind(&input.email)
        .bind(&input.name)
        .bind(input.role.as_str())
        .fetch_one(&self.write_pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => DbError::Conflict(
                format!("User with email '{}' already exists", input.email),
            ),
            _ => DbError::from(e),
        })?;

        Self::parse_user(&row)
    }

    async fn get_by_id(&self, id: Uuid) -> DbResult<Option<User>> {
        let row = sqlx::query(
            r#"
            SELECT id, organization_id, email, name, role, created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.read_pool)
        .await?;

        row.as_ref().map(Self::parse_user).transpose()
    }
}
