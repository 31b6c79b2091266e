//! Redis 后端
//!
//! 键直接使用调用方给出的名字（`challenge:{identity}`、`quota:{scope}:{day}:{identity}` 等），
//! 便于在 redis-cli 中排查。

use super::backend::EphemeralBackend;
use crate::config::store::RedisConfig;
use crate::error::StoreError;
use async_trait::async_trait;
use deadpool_redis::{Config, Connection, Pool, Runtime};
use redis::Script;
use tracing::info;

/// INCR 与 EXPIRE 在同一脚本中执行，不存在计数器缺少过期时间的窗口
const INCR_EXPIRE_IF_NEW: &str = r#"
local v = redis.call('INCR', KEYS[1])
if v == 1 then
    redis.call('EXPIRE', KEYS[1], ARGV[1])
end
return v
"#;

const SCAN_BATCH: usize = 256;

#[derive(Clone)]
pub struct RedisBackend {
    pool: Pool,
    incr_script: Script,
}

impl std::fmt::Debug for RedisBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisBackend")
            .field("pool_status", &self.pool.status())
            .finish()
    }
}

impl RedisBackend {
    pub async fn new(config: &RedisConfig) -> Result<Self, StoreError> {
        let mut cfg = Config::from_url(&config.url);
        cfg.pool = Some(deadpool_redis::PoolConfig::new(config.pool_size));
        let pool = cfg
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| StoreError::Config(format!("Failed to create Redis pool: {e}")))?;

        let backend = Self {
            pool,
            incr_script: Script::new(INCR_EXPIRE_IF_NEW),
        };
        backend.ping().await?;

        info!(pool_size = config.pool_size, "Redis ephemeral store initialized");
        Ok(backend)
    }

    async fn conn(&self) -> Result<Connection, StoreError> {
        self.pool
            .get()
            .await
            .map_err(|e| StoreError::Unavailable(format!("Failed to get Redis connection: {e}")))
    }
}

fn unavailable(op: &str, e: redis::RedisError) -> StoreError {
    StoreError::Unavailable(format!("Redis {op} failed: {e}"))
}

#[async_trait]
impl EphemeralBackend for RedisBackend {
    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl_secs)
            .query_async::<_, ()>(&mut *conn)
            .await
            .map_err(|e| unavailable("SET", e))
    }

    async fn set_nx_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<bool, StoreError> {
        let mut conn = self.conn().await?;
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl_secs)
            .query_async(&mut *conn)
            .await
            .map_err(|e| unavailable("SET NX", e))?;
        Ok(reply.is_some())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn().await?;
        redis::cmd("GET")
            .arg(key)
            .query_async::<_, Option<String>>(&mut *conn)
            .await
            .map_err(|e| unavailable("GET", e))
    }

    async fn take(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn().await?;
        redis::cmd("GETDEL")
            .arg(key)
            .query_async::<_, Option<String>>(&mut *conn)
            .await
            .map_err(|e| unavailable("GETDEL", e))
    }

    async fn incr_expire_if_new(&self, key: &str, ttl_secs: u64) -> Result<u64, StoreError> {
        let mut conn = self.conn().await?;
        let value: i64 = self
            .incr_script
            .key(key)
            .arg(ttl_secs)
            .invoke_async(&mut *conn)
            .await
            .map_err(|e| unavailable("INCR script", e))?;
        u64::try_from(value).map_err(|_| StoreError::Corrupt {
            key: key.to_string(),
            reason: format!("counter went negative: {value}"),
        })
    }

    async fn count_prefix(&self, prefix: &str) -> Result<u64, StoreError> {
        let mut conn = self.conn().await?;
        let pattern = format!("{prefix}*");
        let mut cursor: u64 = 0;
        let mut total: u64 = 0;
        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut *conn)
                .await
                .map_err(|e| unavailable("SCAN", e))?;
            total += keys.len() as u64;
            if next == 0 {
                return Ok(total);
            }
            cursor = next;
        }
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        redis::cmd("PING")
            .query_async::<_, String>(&mut *conn)
            .await
            .map(|_| ())
            .map_err(|e| unavailable("PING", e))
    }
}
