use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::common::parse_uuid;
use crate::{
    db::{
        error::{DbError, DbResult},
        repos::ApiKeyRepo,
    },
    models::{ApiKey, NewApiKey},
};

const API_KEY_COLUMNS: &str = "id, organization_id, name, key_prefix, key_suffix, is_active, last_used_at, created_at";

pub struct SqliteApiKeyRepo {
    pool: SqlitePool,
}

impl SqliteApiKeyRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn parse_api_key(row: &sqlx::sqlite::SqliteRow) -> DbResult<ApiKey> {
        Ok(ApiKey {
            id: parse_uuid(row.get("id"))?,
            organization_id: parse_uuid(row.get("organization_id"))?,
            name: row.get("name"),
            key_prefix: row.get("key_prefix"),
            key_suffix: row.get("key_suffix"),
            is_active: row.get("is_active"),
            last_used_at: row.get("last_used_at"),
            created_at: row.get("created_at"),
        })
    }
}

#[async_trait]
impl ApiKeyRepo for SqliteApiKeyRepo {
    async fn create(&self, input: NewApiKey) -> DbResult<ApiKey> {
        let id = Uuid::new_v4();
        let now = chrono::Utc::now();

        sqlx::query(
            r#"
            INSERT INTO api_keys (id, organization_id, name, key_hash, key_prefix, key_suffix, is_active, created_at)
            VALUES (?, ?, ?, ?, ?, ?, 1, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(input.organization_id.to_string())
        .bind(&input.name)
        .bind(&input.key_hash)
        .bind(&input.key_prefix)
        .bind(&input.key_suffix)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                DbError::Conflict("API key hash collision".into())
            }
            _ => DbError::from(e),
        })?;

        Ok(ApiKey {
            id,
            organization_id: input.organization_id,
            name: input.name,
            key_prefix: input.key_prefix,
            key_suffix: input.key_suffix,
            is_active: true,
            last_used_at: None,
            created_at: now,
        })
    }

    async fn get_by_id(&self, id: Uuid) -> DbResult<Option<ApiKey>> {
        let query = format!("SELECT {API_KEY_COLUMNS} FROM api_keys WHERE id = ?");
        let row = sqlx::query(&query)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::parse_api_key).transpose()
    }

    async fn get_by_hash(&self, key_hash: &str) -> DbResult<Option<ApiKey>> {
        let query = format!("SELECT {API_KEY_COLUMNS} FROM api_keys WHERE key_hash = ?");
        let row = sqlx::query(&query)
            .bind(key_hash)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::parse_api_key).transpose()
    }

    async fn list_by_org(&self, org_id: Uuid) -> DbResult<Vec<ApiKey>> {
        let query = format!(
            "SELECT {API_KEY_COLUMNS} FROM api_keys WHERE organization_id = ? ORDER BY created_at DESC, id DESC"
        );
        let rows = sqlx::query(&query)
            .bind(org_id.to_string())
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::parse_api_key).collect()
    }

    async fn deactivate(&self, id: Uuid) -> DbResult<bool> {
        let result = sqlx::query("UPDATE api_keys SET is_active = 0 WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn update_last_used(&self, id: Uuid) -> DbResult<()> {
        sqlx::query("UPDATE api_keys SET last_used_at = ? WHERE id = ?")
            .bind(chrono::Utc::now())
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
