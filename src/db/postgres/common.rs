use std::str::FromStr;

use crate::db::error::{DbError, DbResult};

/// Parse a text enum column (plan, role, status).
pub fn parse_enum<T: FromStr<Err = String>>(s: &str) -> DbResult<T> {
    T::from_str(s).map_err(DbError::Internal)
}
