use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

use super::{error::CacheResult, traits::Cache};
use crate::config::MemoryCacheConfig;

struct CounterEntry {
    value: i64,
    expires_at: Instant,
}

impl CounterEntry {
    fn new(ttl: Duration) -> Self {
        Self {
            value: 0,
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// In-memory counter store using DashMap for concurrent access.
///
/// # Multi-Node Deployments
///
/// **WARNING**: Each node keeps its own counters, so a tenant gets the full
/// quota on every node. Use Redis when more than one gateway shares traffic.
pub struct MemoryCache {
    counters: DashMap<String, CounterEntry>,
    max_entries: usize,
}

impl MemoryCache {
    pub fn new(config: &MemoryCacheConfig) -> Self {
        Self {
            counters: DashMap::new(),
            max_entries: config.max_entries,
        }
    }

    /// Drop expired counters once the map reaches capacity.
    ///
    /// Live counters are never evicted: losing one would silently reset a
    /// tenant's window.
    fn sweep_if_needed(&self) {
        if self.counters.len() < self.max_entries {
            return;
        }
        self.counters.retain(|_, entry| !entry.is_expired());
        if self.counters.len() >= self.max_entries {
            tracing::warn!(
                live_counters = self.counters.len(),
                max_entries = self.max_entries,
                "Memory cache is over capacity with no expired counters to drop"
            );
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.counters.len()
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn incr(&self, key: &str, ttl: Duration) -> CacheResult<i64> {
        if !self.counters.contains_key(key) {
            self.sweep_if_needed();
        }

        // The shard lock held by the entry guard makes read-modify-write atomic.
        let mut entry = self
            .counters
            .entry(key.to_string())
            .or_insert_with(|| CounterEntry::new(ttl));
        if entry.is_expired() {
            *entry = CounterEntry::new(ttl);
        }
        entry.value += 1;
        Ok(entry.value)
    }

    async fn ping(&self) -> CacheResult<()> {
        Ok(())
    }
}
