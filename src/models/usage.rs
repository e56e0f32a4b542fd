use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One admitted programmatic request. Append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageEvent {
    pub organization_id: Uuid,
    pub api_key_id: Option<Uuid>,
    pub endpoint: String,
    pub method: String,
    pub status_code: u16,
    pub occurred_at: DateTime<Utc>,
}

/// Aggregated usage for one endpoint over a date range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointUsage {
    pub endpoint: String,
    pub total_requests: i64,
    /// Responses with status below 400.
    pub success_count: i64,
    pub error_count: i64,
}
