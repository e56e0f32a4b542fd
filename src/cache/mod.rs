mod error;
mod keys;
mod memory;
#[cfg(feature = "redis")]
mod redis;
mod traits;

use std::sync::Arc;

pub use error::{CacheError, CacheResult};
pub use keys::CacheKeys;
pub use memory::MemoryCache;
#[cfg(feature = "redis")]
pub use redis::RedisCache;
pub use traits::Cache;

use crate::config::CacheConfig;

/// Build the configured counter store. `None` disables quota enforcement.
pub async fn from_config(config: &CacheConfig) -> CacheResult<Option<Arc<dyn Cache>>> {
    let cache: Option<Arc<dyn Cache>> = match config {
        CacheConfig::None => None,
        CacheConfig::Memory(cfg) => Some(Arc::new(MemoryCache::new(cfg))),
        #[cfg(feature = "redis")]
        CacheConfig::Redis(cfg) => Some(Arc::new(RedisCache::from_config(cfg).await?)),
    };
    Ok(cache)
}
