use async_trait::async_trait;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::{
    db::{
        error::{DbError, DbResult},
        repos::ApiKeyRepo,
    },
    models::{ApiKey, NewApiKey},
};

const API_KEY_COLUMNS: &str = "id, organization_id, name, key_prefix, key_suffix, is_active, last_used_at, created_at";

pub struct PostgresApiKeyRepo {
    write_pool: PgPool,
    read_pool: PgPool,
}

impl PostgresApiKeyRepo {
    pub fn new(write_pool: PgPool, read_pool: Option<PgPool>) -> Self {
        let read_pool = read_pool.unwrap_or_else(|| write_pool.clone());
        Self {
            write_pool,
            read_pool,
        }
    }

    fn parse_api_key(row: &sqlx::postgres::PgRow) -> ApiKey {
        ApiKey {
            id: row.get("id"),
            organization_id: row.get("organization_id"),
            name: row.get("name"),
            key_prefix: row.get("key_prefix"),
            key_suffix: row.get("key_suffix"),
            is_active: row.get("is_active"),
            last_used_at: row.get("last_used_at"),
            created_at: row.get("created_at"),
        }
    }
}

#[async_trait]
impl ApiKeyRepo for PostgresApiKeyRepo {
    async fn create(&self, input: NewApiKey) -> DbResult<ApiKey> {
        let query = format!(
            r#"
            INSERT INTO api_keys (id, organization_id, name, key_hash, key_prefix, key_suffix)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {API_KEY_COLUMNS}
            "#
        );
        let row = sqlx::query(&query)
            .bind(Uuid::new_v4())
            .bind(input.organization_id)
            .bind(&input.name)
            .bind(&input.key_hash)
            .bind(&input.key_prefix)
            .bind(&input.key_suffix)
            .fetch_one(&self.write_pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                    DbError::Conflict("API key hash collision".into())
                }
                _ => DbError::from(e),
            })?;

        Ok(Self::parse_api_key(&row))
    }

    async fn get_by_id(&self, id: Uuid) -> DbResult<Option<ApiKey>> {
        let query = format!("SELECT {API_KEY_COLUMNS} FROM api_keys WHERE id = $1");
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.read_pool)
            .await?;

        Ok(row.as_ref().map(Self::parse_api_key))
    }

    async fn get_by_hash(&self, key_hash: &str) -> DbResult<Option<ApiKey>> {
        // Primary pool: a revoked key must stop working immediately.
        let query = format!("SELECT {API_KEY_COLUMNS} FROM api_keys WHERE key_hash = $1");
        let row = sqlx::query(&query)
            .bind(key_hash)
            .fetch_optional(&self.write_pool)
            .await?;

        Ok(row.as_ref().map(Self::parse_api_key))
    }

    async fn list_by_org(&self, org_id: Uuid) -> DbResult<Vec<ApiKey>> {
        let query = format!(
            "SELECT {API_KEY_COLUMNS} FROM api_keys WHERE organization_id = $1 ORDER BY created_at DESC, id DESC"
        );
        let rows = sqlx::query(&query)
            .bind(org_id)
            .fetch_all(&self.read_pool)
            .await?;

        Ok(rows.iter().map(Self::parse_api_key).collect())
    }

    async fn deactivate(&self, id: Uuid) -> DbResult<bool> {
        let result = sqlx::query("UPDATE api_keys SET is_active = FALSE WHERE id = $1")
            .bind(id)
            .execute(&self.write_pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn update_last_used(&self, id: Uuid) -> DbResult<()> {
        sqlx::query("UPDATE api_keys SET last_used_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&self.write_pool)
            .await?;

        Ok(())
    }
}
