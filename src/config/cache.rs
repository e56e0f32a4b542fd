use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Shared counter store configuration.
///
/// Quota counters live here. With `type = "none"` quotas are not enforced
/// and every request is admitted without rate-limit headers.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
#[serde(deny_unknown_fields)]
pub enum CacheConfig {
    /// No counter store. Quotas are disabled.
    #[default]
    None,

    /// In-process store. Counters are per node and lost on restart.
    Memory(MemoryCacheConfig),

    /// Redis. Required when more than one gateway node shares quotas.
    #[cfg(feature = "redis")]
    Redis(RedisCacheConfig),
}

impl CacheConfig {
    pub fn is_none(&self) -> bool {
        matches!(self, CacheConfig::None)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            CacheConfig::None => Ok(()),
            CacheConfig::Memory(c) => c.validate(),
            #[cfg(feature = "redis")]
            CacheConfig::Redis(c) => c.validate(),
        }
    }
}

/// In-memory store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MemoryCacheConfig {
    /// Maximum number of live counters. Expired counters are swept first
    /// once the limit is reached.
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

impl Default for MemoryCacheConfig {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
        }
    }
}

impl MemoryCacheConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_entries == 0 {
            return Err(ConfigError::Validation(
                "Memory cache max_entries must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

fn default_max_entries() -> usize {
    100_000
}

/// Redis configuration.
#[cfg(feature = "redis")]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RedisCacheConfig {
    /// Redis connection URL.
    /// Format: redis://[user:password@]host:port[/database]
    /// In cluster mode, a comma-separated list of node URLs.
    pub url: String,

    /// Prefix for every key written by the gateway.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Connection and response timeout in seconds.
    #[serde(default = "default_redis_timeout")]
    pub timeout_secs: u64,

    /// Treat `url` as a list of cluster nodes.
    #[serde(default)]
    pub cluster: bool,
}

#[cfg(feature = "redis")]
impl RedisCacheConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.url.trim().is_empty() {
            return Err(ConfigError::Validation("Redis URL cannot be empty".into()));
        }
        Ok(())
    }
}

#[cfg(feature = "redis")]
fn default_key_prefix() -> String {
    "tollgate:".to_string()
}

#[cfg(feature = "redis")]
fn default_redis_timeout() -> u64 {
    2
}
