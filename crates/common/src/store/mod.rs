//! 临时存储
//!
//! 保存三类带 TTL 的数据：
//! - `challenge:{identity}` 登录挑战
//! - `quota:{scope}:{day}:{identity}` 每日配额计数器
//! - `plan-cache:v1` 套餐列表缓存
//!
//! 后端通过 [`StoreConfig`] 选择；每次调用都套上配置的超时。

pub mod backend;
pub mod memory;

#[cfg(feature = "backend-redis")]
pub mod redis;

use crate::config::{StoreBackendKind, StoreConfig};
use crate::deadline::with_deadline;
use crate::error::StoreError;
use std::time::Duration;

pub use backend::EphemeralBackend;
pub use memory::MemoryBackend;

#[cfg(feature = "backend-redis")]
use self::redis::RedisBackend;

#[derive(Clone, Debug)]
enum Backend {
    Memory(MemoryBackend),

    #[cfg(feature = "backend-redis")]
    Redis(RedisBackend),
}

impl Backend {
    fn as_dyn(&self) -> &dyn EphemeralBackend {
        match self {
            Self::Memory(b) => b,

            #[cfg(feature = "backend-redis")]
            Self::Redis(b) => b,
        }
    }
}

/// 临时存储句柄，克隆后共享底层连接
#[derive(Clone, Debug)]
pub struct EphemeralStore {
    backend: Backend,
    timeout: Duration,
}

impl EphemeralStore {
    pub async fn from_config(config: &StoreConfig) -> Result<Self, StoreError> {
        let backend = match config.backend {
            StoreBackendKind::Memory => Backend::Memory(MemoryBackend::new()),

            #[cfg(feature = "backend-redis")]
            StoreBackendKind::Redis => {
                let cfg = config
                    .redis
                    .as_ref()
                    .ok_or_else(|| StoreError::Config("Missing [store.redis] config".into()))?;
                let backend = with_deadline(config.timeout(), "store.connect", RedisBackend::new(cfg))
                    .await??;
                Backend::Redis(backend)
            }

            #[cfg(not(feature = "backend-redis"))]
            StoreBackendKind::Redis => {
                return Err(StoreError::Config(
                    "Redis backend not enabled. Compile with --features backend-redis".into(),
                ));
            }
        };

        Ok(Self {
            backend,
            timeout: config.timeout(),
        })
    }

    /// 内存存储，主要用于测试
    pub fn memory(timeout: Duration) -> Self {
        Self {
            backend: Backend::Memory(MemoryBackend::new()),
            timeout,
        }
    }

    pub fn backend_name(&self) -> &'static str {
        match self.backend {
            Backend::Memory(_) => "memory",

            #[cfg(feature = "backend-redis")]
            Backend::Redis(_) => "redis",
        }
    }

    pub async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), StoreError> {
        with_deadline(
            self.timeout,
            "store.set_ex",
            self.backend.as_dyn().set_ex(key, value, ttl_secs),
        )
        .await?
    }

    pub async fn set_nx_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<bool, StoreError> {
        with_deadline(
            self.timeout,
            "store.set_nx_ex",
            self.backend.as_dyn().set_nx_ex(key, value, ttl_secs),
        )
        .await?
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        with_deadline(self.timeout, "store.get", self.backend.as_dyn().get(key)).await?
    }

    pub async fn take(&self, key: &str) -> Result<Option<String>, StoreError> {
        with_deadline(self.timeout, "store.take", self.backend.as_dyn().take(key)).await?
    }

    pub async fn incr_expire_if_new(&self, key: &str, ttl_secs: u64) -> Result<u64, StoreError> {
        with_deadline(
            self.timeout,
            "store.incr",
            self.backend.as_dyn().incr_expire_if_new(key, ttl_secs),
        )
        .await?
    }

    pub async fn count_prefix(&self, prefix: &str) -> Result<u64, StoreError> {
        with_deadline(
            self.timeout,
            "store.count_prefix",
            self.backend.as_dyn().count_prefix(prefix),
        )
        .await?
    }

    pub async fn ping(&self) -> Result<(), StoreError> {
        with_deadline(self.timeout, "store.ping", self.backend.as_dyn().ping()).await?
    }
}
