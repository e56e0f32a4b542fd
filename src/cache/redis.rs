use std::time::Duration;

use async_trait::async_trait;
use redis::{
    ConnectionInfo, IntoConnectionInfo, aio::ConnectionManager, cluster_async::ClusterConnection,
};

use super::{
    error::{CacheError, CacheResult},
    traits::Cache,
};
use crate::config::RedisCacheConfig;

/// Either a standalone or a cluster connection. Both are cheap to clone and
/// reconnect on their own.
#[derive(Clone)]
enum RedisConn {
    Standalone(ConnectionManager),
    Cluster(ClusterConnection),
}

/// Macro to execute a Redis command on either connection type.
macro_rules! redis_cmd {
    ($conn:expr, $cmd:expr) => {
        match $conn {
            RedisConn::Standalone(ref mut c) => $cmd.query_async(c).await,
            RedisConn::Cluster(ref mut c) => $cmd.query_async(c).await,
        }
    };
}

/// Macro to execute a Redis script on either connection type.
macro_rules! redis_script {
    ($conn:expr, $script:expr) => {
        match $conn {
            RedisConn::Standalone(ref mut c) => $script.invoke_async(c).await,
            RedisConn::Cluster(ref mut c) => $script.invoke_async(c).await,
        }
    };
}

/// Atomic increment that sets the expiry only on the first increment.
///
/// The `TTL < 0` branch also repairs a counter left without an expiry.
const INCR_WITH_EXPIRY_SCRIPT: &str = r#"
local key = KEYS[1]
local ttl = tonumber(ARGV[1])

local value = redis.call('INCR', key)
if value == 1 or redis.call('TTL', key) < 0 then
    redis.call('EXPIRE', key, ttl)
end
return value
"#;

pub struct RedisCache {
    conn: RedisConn,
    key_prefix: String,
    incr_script: redis::Script,
}

impl RedisCache {
    pub async fn from_config(config: &RedisCacheConfig) -> CacheResult<Self> {
        let timeout = Duration::from_secs(config.timeout_secs);

        let conn = if config.cluster {
            // Cluster mode: comma-separated node URLs,
            // e.g. "redis://host1:6379,host2:6379,host3:6379"
            let nodes: Vec<ConnectionInfo> = config
                .url
                .split(',')
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .map(|s| {
                    let node_url = if s.starts_with("redis://") || s.starts_with("rediss://") {
                        s.to_string()
                    } else {
                        format!("redis://{}", s)
                    };
                    node_url.into_connection_info()
                })
                .collect::<Result<Vec<_>, _>>()?;

            if nodes.is_empty() {
                return Err(CacheError::Internal(
                    "No cluster nodes specified in Redis URL".into(),
                ));
            }

            let client = redis::cluster::ClusterClientBuilder::new(nodes)
                .connection_timeout(timeout)
                .response_timeout(timeout)
                .build()?;
            RedisConn::Cluster(client.get_async_connection().await?)
        } else {
            let client = redis::Client::open(config.url.as_str())?;
            RedisConn::Standalone(client.get_connection_manager().await?)
        };

        tracing::info!(cluster = config.cluster, "Connected to Redis");

        Ok(Self {
            conn,
            key_prefix: config.key_prefix.clone(),
            incr_script: redis::Script::new(INCR_WITH_EXPIRY_SCRIPT),
        })
    }

    fn prefixed_key(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }
}

#[async_trait]
impl Cache for RedisCache {
    async fn incr(&self, key: &str, ttl: Duration) -> CacheResult<i64> {
        let mut conn = self.conn.clone();
        let full_key = self.prefixed_key(key);
        let ttl_secs = ttl.as_secs().max(1) as i64;

        let value: i64 = redis_script!(
            conn,
            self.incr_script.key(&full_key).arg(ttl_secs)
        )?;
        Ok(value)
    }

    async fn ping(&self) -> CacheResult<()> {
        let mut conn = self.conn.clone();
        let _: String = redis_cmd!(conn, redis::cmd("PING"))?;
        Ok(())
    }
}
