mod error;
#[cfg(feature = "database-postgres")]
pub mod postgres;
pub mod repos;
#[cfg(feature = "database-sqlite")]
pub mod sqlite;

#[cfg(all(test, any(feature = "database-sqlite", feature = "database-postgres")))]
pub mod tests;

use std::sync::Arc;

pub use error::{DbError, DbResult};
pub use repos::*;

use crate::config::DatabaseConfig;

/// PostgreSQL pool configuration with optional read replica.
#[cfg(feature = "database-postgres")]
pub struct PgPoolPair {
    /// Primary pool for writes.
    pub write: sqlx::PgPool,
    /// Optional read replica pool. If None, reads use the write pool.
    pub read: Option<sqlx::PgPool>,
}

/// One instance of each repository, shared by every caller.
struct CachedRepos {
    organizations: Arc<dyn OrganizationRepo>,
    users: Arc<dyn UserRepo>,
    api_keys: Arc<dyn ApiKeyRepo>,
    usage: Arc<dyn UsageRepo>,
    billing_cycles: Arc<dyn BillingCycleRepo>,
}

impl CachedRepos {
    #[cfg(feature = "database-sqlite")]
    fn sqlite(pool: &sqlx::SqlitePool) -> Self {
        Self {
            organizations: Arc::new(sqlite::SqliteOrganizationRepo::new(pool.clone())),
            users: Arc::new(sqlite::SqliteUserRepo::new(pool.clone())),
            api_keys: Arc::new(sqlite::SqliteApiKeyRepo::new(pool.clone())),
            usage: Arc::new(sqlite::SqliteUsageRepo::new(pool.clone())),
            billing_cycles: Arc::new(sqlite::SqliteBillingCycleRepo::new(pool.clone())),
        }
    }

    #[cfg(feature = "database-postgres")]
    fn postgres(write_pool: &sqlx::PgPool, read_pool: &Option<sqlx::PgPool>) -> Self {
        Self {
            organizations: Arc::new(postgres::PostgresOrganizationRepo::new(
                write_pool.clone(),
                read_pool.clone(),
            )),
            users: Arc::new(postgres::PostgresUserRepo::new(
                write_pool.clone(),
                read_pool.clone(),
            )),
            api_keys: Arc::new(postgres::PostgresApiKeyRepo::new(
                write_pool.clone(),
                read_pool.clone(),
            )),
            usage: Arc::new(postgres::PostgresUsageRepo::new(
                write_pool.clone(),
                read_pool.clone(),
            )),
            billing_cycles: Arc::new(postgres::PostgresBillingCycleRepo::new(
                write_pool.clone(),
                read_pool.clone(),
            )),
        }
    }
}

enum PoolStorage {
    #[cfg(feature = "database-sqlite")]
    Sqlite(sqlx::SqlitePool),
    #[cfg(feature = "database-postgres")]
    Postgres(PgPoolPair),
    #[cfg(not(any(feature = "database-sqlite", feature = "database-postgres")))]
    _None(std::convert::Infallible),
}

/// Handle to the tenant/credential/usage/billing store.
///
/// Backed by SQLite or PostgreSQL; callers only see the repository traits.
pub struct DbPool {
    inner: PoolStorage,
    repos: CachedRepos,
}

impl DbPool {
    /// Wrap an already-connected SQLite pool.
    #[cfg(feature = "database-sqlite")]
    pub fn from_sqlite(pool: sqlx::SqlitePool) -> Self {
        let repos = CachedRepos::sqlite(&pool);
        DbPool {
            inner: PoolStorage::Sqlite(pool),
            repos,
        }
    }

    /// Wrap already-connected PostgreSQL pools.
    #[cfg(feature = "database-postgres")]
    pub fn from_postgres(write_pool: sqlx::PgPool, read_pool: Option<sqlx::PgPool>) -> Self {
        let repos = CachedRepos::postgres(&write_pool, &read_pool);
        DbPool {
            inner: PoolStorage::Postgres(PgPoolPair {
                write: write_pool,
                read: read_pool,
            }),
            repos,
        }
    }

    /// Connect using `[database]`.
    pub async fn from_config(config: &DatabaseConfig) -> DbResult<Self> {
        match config {
            DatabaseConfig::None => Err(DbError::NotConfigured),
            #[cfg(feature = "database-sqlite")]
            DatabaseConfig::Sqlite(cfg) => {
                let pool = sqlx::sqlite::SqlitePoolOptions::new()
                    .max_connections(cfg.max_connections)
                    .connect_with(
                        sqlx::sqlite::SqliteConnectOptions::new()
                            .filename(&cfg.path)
                            .create_if_missing(cfg.create_if_missing)
                            .foreign_keys(true)
                            .journal_mode(if cfg.wal_mode {
                                sqlx::sqlite::SqliteJournalMode::Wal
                            } else {
                                sqlx::sqlite::SqliteJournalMode::Delete
                            })
                            .busy_timeout(std::time::Duration::from_millis(cfg.busy_timeout_ms)),
                    )
                    .await?;

                tracing::info!(path = %cfg.path, "Connected to SQLite");
                Ok(Self::from_sqlite(pool))
            }
            #[cfg(feature = "database-postgres")]
            DatabaseConfig::Postgres(cfg) => {
                let acquire_timeout = std::time::Duration::from_secs(cfg.acquire_timeout_secs);
                let write_pool = sqlx::postgres::PgPoolOptions::new()
                    .min_connections(cfg.min_connections)
                    .max_connections(cfg.max_connections)
                    .acquire_timeout(acquire_timeout)
                    .connect(&cfg.url)
                    .await?;

                let read_pool = if let Some(read_url) = &cfg.read_url {
                    tracing::info!("Configuring read replica pool");
                    Some(
                        sqlx::postgres::PgPoolOptions::new()
                            .min_connections(cfg.min_connections)
                            .max_connections(cfg.max_connections)
                            .acquire_timeout(acquire_timeout)
                            .connect(read_url)
                            .await?,
                    )
                } else {
                    None
                };

                tracing::info!("Connected to PostgreSQL");
                Ok(Self::from_postgres(write_pool, read_pool))
            }
        }
    }

    /// Apply the embedded migrations. PostgreSQL migrates the primary only.
    pub async fn run_migrations(&self) -> DbResult<()> {
        match &self.inner {
            #[cfg(feature = "database-sqlite")]
            PoolStorage::Sqlite(pool) => {
                tracing::info!("Running SQLite migrations");
                sqlx::migrate!("./migrations_sqlx/sqlite").run(pool).await?;
                tracing::info!("SQLite migrations completed successfully");
                Ok(())
            }
            #[cfg(feature = "database-postgres")]
            PoolStorage::Postgres(pools) => {
                tracing::info!("Running PostgreSQL migrations");
                sqlx::migrate!("./migrations_sqlx/postgres")
                    .run(&pools.write)
                    .await?;
                tracing::info!("PostgreSQL migrations completed successfully");
                Ok(())
            }
            #[cfg(not(any(feature = "database-sqlite", feature = "database-postgres")))]
            PoolStorage::_None(infallible) => match *infallible {},
        }
    }

    pub fn organizations(&self) -> Arc<dyn OrganizationRepo> {
        Arc::clone(&self.repos.organizations)
    }

    pub fn users(&self) -> Arc<dyn UserRepo> {
        Arc::clone(&self.repos.users)
    }

    pub fn api_keys(&self) -> Arc<dyn ApiKeyRepo> {
        Arc::clone(&self.repos.api_keys)
    }

    pub fn usage(&self) -> Arc<dyn UsageRepo> {
        Arc::clone(&self.repos.usage)
    }

    pub fn billing_cycles(&self) -> Arc<dyn BillingCycleRepo> {
        Arc::clone(&self.repos.billing_cycles)
    }

    /// `SELECT 1` against every pool.
    pub async fn health_check(&self) -> DbResult<()> {
        match &self.inner {
            #[cfg(feature = "database-sqlite")]
            PoolStorage::Sqlite(pool) => {
                sqlx::query("SELECT 1").execute(pool).await?;
                Ok(())
            }
            #[cfg(feature = "database-postgres")]
            PoolStorage::Postgres(pools) => {
                sqlx::query("SELECT 1").execute(&pools.write).await?;
                if let Some(read) = &pools.read {
                    sqlx::query("SELECT 1").execute(read).await?;
                }
                Ok(())
            }
            #[cfg(not(any(feature = "database-sqlite", feature = "database-postgres")))]
            PoolStorage::_None(infallible) => match *infallible {},
        }
    }
}
