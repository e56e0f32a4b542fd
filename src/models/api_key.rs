use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// A programmatic credential. The secret itself is never stored; only its
/// SHA-256 hash plus enough of the key to display a masked form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub name: String,
    /// First characters of the raw key, including the `sk_live_` prefix.
    pub key_prefix: String,
    /// Last characters of the raw key.
    pub key_suffix: String,
    pub is_active: bool,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ApiKey {
    /// Masked representation for listings, e.g. `sk_live_1a2b****...****9f0e`.
    pub fn masked(&self) -> String {
        super::mask_api_key(&self.key_prefix, &self.key_suffix)
    }
}

/// Request body for creating a key.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateApiKey {
    #[validate(length(min = 1, max = 255, message = "name is required"))]
    pub name: String,
}

/// Everything the store needs to persist a freshly generated key.
#[derive(Debug, Clone)]
pub struct NewApiKey {
    pub organization_id: Uuid,
    pub name: String,
    pub key_hash: String,
    pub key_prefix: String,
    pub key_suffix: String,
}
