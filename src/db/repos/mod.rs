mod api_keys;
mod billing_cycles;
mod organizations;
mod usage;
mod users;

pub use api_keys::*;
pub use billing_cycles::*;
use chrono::{DateTime, Utc};
pub use organizations::*;
pub use usage::*;
pub use users::*;

/// Offset pagination for list queries.
///
/// Results are ordered by `(created_at, id)` so pages are stable while
/// rows are appended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListParams {
    pub limit: i64,
    pub offset: i64,
}

impl ListParams {
    pub fn page(limit: i64, offset: i64) -> Self {
        Self {
            limit: limit.max(1),
            offset: offset.max(0),
        }
    }
}

impl Default for ListParams {
    fn default() -> Self {
        Self::page(100, 0)
    }
}

/// Half-open time range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }
}

impl From<crate::models::BillingPeriod> for TimeRange {
    fn from(period: crate::models::BillingPeriod) -> Self {
        Self::new(period.start, period.end)
    }
}
