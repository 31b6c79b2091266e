//! 临时存储配置
//!
//! 临时存储保存挑战、配额计数器和套餐缓存，全部带 TTL。

use serde::{Deserialize, Serialize};

/// 临时存储配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// 后端类型
    #[serde(default)]
    pub backend: StoreBackendKind,

    /// 单次存储调用的超时（毫秒）
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Redis 配置（backend = "redis" 时必需）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redis: Option<RedisConfig>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackendKind::Memory,
            timeout_ms: default_timeout_ms(),
            redis: None,
        }
    }
}

/// 后端类型
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackendKind {
    /// 进程内存，仅适用于单实例部署
    #[default]
    Memory,
    /// Redis（需要 `backend-redis` feature）
    Redis,
}

/// Redis 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// 格式：redis://[username:password@]host[:port][/database]
    pub url: String,

    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379/0".to_string(),
            pool_size: default_pool_size(),
        }
    }
}

impl StoreConfig {
    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.timeout_ms)
    }
}

fn default_timeout_ms() -> u64 {
    1000
}

fn default_pool_size() -> usize {
    16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_memory() {
        let config = StoreConfig::default();
        assert_eq!(config.backend, StoreBackendKind::Memory);
        assert_eq!(config.timeout().as_millis(), 1000);
        assert!(config.redis.is_none());
    }

    #[test]
    fn test_deserialize_redis() {
        let config: StoreConfig = toml::from_str(
            r#"
            backend = "redis"
            timeout_ms = 250

            [redis]
            url = "redis://cache:6379/2"
            "#,
        )
        .unwrap();
        assert_eq!(config.backend, StoreBackendKind::Redis);
        assert_eq!(config.timeout_ms, 250);
        let redis = config.redis.unwrap();
        assert_eq!(redis.url, "redis://cache:6379/2");
        assert_eq!(redis.pool_size, 16);
    }
}
