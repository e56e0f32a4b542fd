use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Database configuration.
///
/// The database holds tenants, users, credentials, usage records and
/// billing cycles.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
#[serde(deny_unknown_fields)]
pub enum DatabaseConfig {
    /// No database. Only the health endpoints are useful in this mode.
    #[default]
    None,

    /// SQLite database. Good for single-node deployments.
    #[cfg(feature = "database-sqlite")]
    Sqlite(SqliteConfig),

    /// PostgreSQL database. Required for multi-node deployments.
    #[cfg(feature = "database-postgres")]
    Postgres(PostgresConfig),
}

impl DatabaseConfig {
    pub fn is_none(&self) -> bool {
        matches!(self, DatabaseConfig::None)
    }

    /// Whether migrations should run when the server starts.
    pub fn run_migrations(&self) -> bool {
        match self {
            DatabaseConfig::None => false,
            #[cfg(feature = "database-sqlite")]
            DatabaseConfig::Sqlite(c) => c.run_migrations,
            #[cfg(feature = "database-postgres")]
            DatabaseConfig::Postgres(c) => c.run_migrations,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            DatabaseConfig::None => Ok(()),
            #[cfg(feature = "database-sqlite")]
            DatabaseConfig::Sqlite(c) => c.validate(),
            #[cfg(feature = "database-postgres")]
            DatabaseConfig::Postgres(c) => c.validate(),
        }
    }
}

/// SQLite configuration.
#[cfg(feature = "database-sqlite")]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SqliteConfig {
    /// Path to the SQLite database file.
    /// Use `:memory:` for an in-memory database (testing only).
    pub path: String,

    #[serde(default = "default_true")]
    pub create_if_missing: bool,

    #[serde(default = "default_true")]
    pub run_migrations: bool,

    #[serde(default = "default_true")]
    pub wal_mode: bool,

    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u64,

    #[serde(default = "default_sqlite_max_connections")]
    pub max_connections: u32,
}

#[cfg(feature = "database-sqlite")]
impl SqliteConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.path.is_empty() {
            return Err(ConfigError::Validation(
                "SQLite path cannot be empty".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(feature = "database-sqlite")]
fn default_busy_timeout() -> u64 {
    5000
}

#[cfg(feature = "database-sqlite")]
fn default_sqlite_max_connections() -> u32 {
    5
}

/// PostgreSQL configuration.
#[cfg(feature = "database-postgres")]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PostgresConfig {
    /// Connection URL for the primary (write) database.
    pub url: String,

    /// Optional read replica. Usage summaries and billing history read from
    /// here; the billing sweeps always use the primary.
    #[serde(default)]
    pub read_url: Option<String>,

    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Time to wait for a pooled connection, in seconds.
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_secs: u64,

    #[serde(default = "default_true")]
    pub run_migrations: bool,
}

#[cfg(feature = "database-postgres")]
impl PostgresConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.url.is_empty() {
            return Err(ConfigError::Validation(
                "PostgreSQL URL cannot be empty".into(),
            ));
        }
        if self.min_connections > self.max_connections {
            return Err(ConfigError::Validation(
                "min_connections cannot exceed max_connections".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(any(feature = "database-sqlite", feature = "database-postgres"))]
fn default_true() -> bool {
    true
}

#[cfg(feature = "database-postgres")]
fn default_min_connections() -> u32 {
    1
}

#[cfg(feature = "database-postgres")]
fn default_max_connections() -> u32 {
    20
}

#[cfg(feature = "database-postgres")]
fn default_acquire_timeout() -> u64 {
    10
}
