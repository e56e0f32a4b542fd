use thiserror::Error;

/// Failures from the tenant, credential, usage and billing stores.
#[derive(Debug, Error)]
pub enum DbError {
    /// The process runs without `[database]`.
    #[error("Database not configured")]
    NotConfigured,

    #[error("Record not found")]
    NotFound,

    /// A uniqueness rule rejected the write, e.g. a second billing cycle for
    /// the same tenant and month.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A value the store cannot represent.
    #[error("Invalid value: {0}")]
    Validation(String),

    #[cfg(any(feature = "database-sqlite", feature = "database-postgres"))]
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[cfg(any(feature = "database-sqlite", feature = "database-postgres"))]
    #[error("Migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A stored row that does not decode, such as a malformed UUID or amount.
    #[error("Corrupt row: {0}")]
    Internal(String),
}

pub type DbResult<T> = Result<T, DbError>;
