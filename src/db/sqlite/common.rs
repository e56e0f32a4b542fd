use std::str::FromStr;

use rust_decimal::Decimal;
use uuid::Uuid;

use crate::db::error::{DbError, DbResult};

/// Parse a UUID string from the database, returning a DbError on failure
pub fn parse_uuid(s: &str) -> DbResult<Uuid> {
    Uuid::parse_str(s).map_err(|e| DbError::Internal(format!("Invalid UUID in database: {}", e)))
}

/// Amounts are stored as decimal text so SQLite never rounds them through REAL.
pub fn parse_decimal(s: &str) -> DbResult<Decimal> {
    Decimal::from_str(s)
        .map_err(|e| DbError::Internal(format!("Invalid decimal in database: {}", e)))
}

/// Parse a text enum column (plan, role, status).
pub fn parse_enum<T: FromStr<Err = String>>(s: &str) -> DbResult<T> {
    T::from_str(s).map_err(DbError::Internal)
}
