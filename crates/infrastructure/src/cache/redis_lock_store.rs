use async_trait::async_trait;
use recon_core::{config::CacheConfig, traits::LockStore, ReconError, ReconResult};
use redis::{aio::ConnectionManager, AsyncCommands, Script};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info};

const COMPARE_AND_DELETE: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
else
    return 0
end
"#;

fn cache_error(op: &str, e: redis::RedisError) -> ReconError {
    ReconError::Cache(format!("Redis {op} failed: {e}"))
}

/// 基于Redis的锁存储：`SET key value NX PX ttl` 获取，Lua脚本比较后删除
#[derive(Clone)]
pub struct RedisLockStore {
    conn: ConnectionManager,
    release_script: Script,
}

impl fmt::Debug for RedisLockStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisLockStore")
            .field("connection", &"ConnectionManager")
            .finish()
    }
}

impl RedisLockStore {
    pub async fn connect(config: &CacheConfig) -> ReconResult<Self> {
        info!("连接Redis锁存储: {}", config.redis_url);

        let client = redis::Client::open(config.redis_url.as_str())
            .map_err(|e| cache_error("client open", e))?;

        let conn = tokio::time::timeout(
            Duration::from_secs(config.connection_timeout_seconds),
            ConnectionManager::new(client),
        )
        .await
        .map_err(|_| ReconError::Cache("连接Redis超时".to_string()))?
        .map_err(|e| cache_error("connect", e))?;

        Ok(Self::from_connection(conn))
    }

    pub fn from_connection(conn: ConnectionManager) -> Self {
        Self {
            conn,
            release_script: Script::new(COMPARE_AND_DELETE),
        }
    }
}

#[async_trait]
impl LockStore for RedisLockStore {
    async fn set_if_absent(&self, key: &str, value: &str, ttl_ms: u64) -> ReconResult<bool> {
        let mut conn = self.conn.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl_ms)
            .query_async(&mut conn)
            .await
            .map_err(|e| cache_error("SET NX", e))?;

        debug!("Lock SET NX {}: {}", key, reply.is_some());
        Ok(reply.is_some())
    }

    async fn get(&self, key: &str) -> ReconResult<Option<String>> {
        let mut conn = self.conn.clone();
        conn.get(key).await.map_err(|e| cache_error("GET", e))
    }

    async fn delete(&self, key: &str) -> ReconResult<bool> {
        let mut conn = self.conn.clone();
        let removed: i64 = conn.del(key).await.map_err(|e| cache_error("DEL", e))?;
        Ok(removed > 0)
    }

    async fn delete_if_equals(&self, key: &str, expected: &str) -> ReconResult<bool> {
        let mut conn = self.conn.clone();
        let removed: i64 = self
            .release_script
            .key(key)
            .arg(expected)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| cache_error("compare-and-delete", e))?;
        Ok(removed > 0)
    }
}
