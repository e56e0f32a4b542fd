use std::time::Duration;

use async_trait::async_trait;

use super::error::CacheResult;

/// Shared counter store.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Atomically increment a counter and return the new value.
    ///
    /// The expiry is set only when the increment creates the counter (the
    /// returned value is 1), so repeated increments never extend a window.
    async fn incr(&self, key: &str, ttl: Duration) -> CacheResult<i64>;

    /// Verify the store is reachable.
    async fn ping(&self) -> CacheResult<()>;
}
