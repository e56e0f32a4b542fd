use uuid::Uuid;

pub struct CacheKeys;

impl CacheKeys {
    /// Quota counter: ratelimit:{org_id}:{window_index}
    ///
    /// `window_index` is `unix_seconds / window_secs`, so every node computes
    /// the same key for the same wall-clock window.
    pub fn quota(org_id: Uuid, window_index: i64) -> String {
        format!("ratelimit:{}:{}", org_id, window_index)
    }
}
