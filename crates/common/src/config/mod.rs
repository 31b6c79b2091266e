//! 统一配置管理
//!
//! keygate 的所有配置项在这里定义，配置文件使用 TOML 格式。
//! 各段都有默认值，最小配置只需要 `name`。

pub mod auth;
pub mod bind;
pub mod ledger;
pub mod observability;
pub mod quota;
pub mod store;
pub mod upstream;

pub use auth::{AuthConfig, SaltSource};
pub use bind::BindConfig;
pub use ledger::{LedgerBackendKind, LedgerConfig};
pub use observability::{LogConfig, ObservabilityConfig, TracingConfig};
pub use quota::{QuotaConfig, TierConfig};
pub use store::{StoreBackendKind, StoreConfig};
pub use upstream::UpstreamConfig;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// 配置加载错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file does not exist: {0}")]
    NotFound(PathBuf),

    #[error("Path is not a regular file: {0}")]
    NotAFile(PathBuf),

    #[error("Failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

/// keygate 主配置
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct KeygateConfig {
    /// 实例名称，出现在日志和 /health 中
    pub name: String,

    /// 运行环境："dev" | "prod" | "test"
    ///
    /// prod 要求启用 HTTPS。
    #[serde(default = "default_env")]
    pub env: String,

    /// PID 文件路径
    #[serde(default)]
    pub pid: Option<String>,

    /// SQLite 数据库目录，数据库文件为 `{sqlite_path}/keygate.db`
    #[serde(
        default = "default_sqlite_path",
        serialize_with = "serialize_pathbuf",
        deserialize_with = "deserialize_pathbuf"
    )]
    pub sqlite_path: PathBuf,

    #[serde(default)]
    pub bind: BindConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub ledger: LedgerConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub quota: QuotaConfig,

    #[serde(default)]
    pub upstream: UpstreamConfig,

    /// IP 突发限流，与每日配额相互独立
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

/// IP 突发限流配置
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RateLimitConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// 令牌补充速率（每秒）
    #[serde(default = "default_per_second")]
    pub per_second: u64,

    #[serde(default = "default_burst_size")]
    pub burst_size: u32,

    /// 反向代理地址
    ///
    /// 只有连接对端在此列表中时才解析 `X-Forwarded-For`；为空时一律使用连接地址，
    /// 否则匿名调用方可以伪造地址绕开每日配额。
    #[serde(default)]
    pub trusted_proxies: Vec<IpAddr>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            per_second: default_per_second(),
            burst_size: default_burst_size(),
            trusted_proxies: Vec::new(),
        }
    }
}

fn default_env() -> String {
    "dev".to_string()
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("database")
}

fn default_true() -> bool {
    true
}

fn default_per_second() -> u64 {
    2
}

fn default_burst_size() -> u32 {
    100
}

fn serialize_pathbuf<S>(path: &Path, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    path.display().to_string().serialize(serializer)
}

fn deserialize_pathbuf<'de, D>(deserializer: D) -> Result<PathBuf, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    Ok(PathBuf::from(s))
}

impl Default for KeygateConfig {
    fn default() -> Self {
        Self {
            name: "keygate-default".to_string(),
            env: default_env(),
            pid: Some("logs/keygate.pid".to_string()),
            sqlite_path: default_sqlite_path(),
            bind: BindConfig::default(),
            observability: ObservabilityConfig::default(),
            store: StoreConfig::default(),
            ledger: LedgerConfig::default(),
            auth: AuthConfig::default(),
            quota: QuotaConfig::default(),
            upstream: UpstreamConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

impl KeygateConfig {
    /// 数据库文件路径
    pub fn database_file(&self) -> PathBuf {
        self.sqlite_path.join("keygate.db")
    }

    pub fn get_pid_path(&self) -> Option<String> {
        self.pid.clone()
    }

    pub fn tracing_config(&self) -> &TracingConfig {
        &self.observability.tracing
    }

    pub fn log_config(&self) -> &LogConfig {
        &self.observability.log
    }

    pub fn is_console_logging(&self) -> bool {
        self.observability.log.output == "console"
    }

    pub fn should_rotate_logs(&self) -> bool {
        self.observability.log.output == "file" && self.observability.log.rotate
    }

    /// 过滤级别，RUST_LOG 优先
    pub fn get_filter_level(&self) -> String {
        std::env::var("RUST_LOG")
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| self.observability.filter_level.clone())
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        if !path.is_file() {
            return Err(ConfigError::NotAFile(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        Ok(Self::from_toml(&content)?)
    }

    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string(self)
    }

    /// 校验配置
    ///
    /// 以 "Warning:" 开头的条目只需记录日志；其余条目应阻止启动。
    /// 缺失的 ledger / 上游地址属于告警：对应路由在运行时返回 misconfigured。
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.name.trim().is_empty() {
            errors.push("Instance name cannot be empty".to_string());
        }

        if !["dev", "prod", "test"].contains(&self.env.as_str()) {
            errors.push(format!(
                "Invalid environment '{}', must be one of: dev, prod, test",
                self.env
            ));
        }

        let main_level = self
            .observability
            .filter_level
            .split(',')
            .next()
            .unwrap_or("")
            .trim();
        if !["trace", "debug", "info", "warn", "error"].contains(&main_level) {
            errors.push(format!(
                "Invalid filter level '{}', must start with one of: trace, debug, info, warn, error",
                self.observability.filter_level
            ));
        }

        if !["console", "file"].contains(&self.observability.log.output.as_str()) {
            errors.push(format!(
                "Invalid log output '{}' (observability.log.output), must be 'console' or 'file'",
                self.observability.log.output
            ));
        }

        if !["text", "json"].contains(&self.observability.log.format.as_str()) {
            errors.push(format!(
                "Invalid log format '{}' (observability.log.format), must be 'text' or 'json'",
                self.observability.log.format
            ));
        }

        if let Err(e) = self.observability.tracing.validate() {
            errors.push(format!("Tracing configuration error: {e}"));
        }

        if self
            .sqlite_path
            .to_str()
            .map(|s| s.trim().is_empty())
            .unwrap_or(true)
        {
            errors.push("SQLite database path cannot be empty".to_string());
        }

        if self.bind.http.is_none() && self.bind.https.is_none() {
            errors.push("At least one of bind.http or bind.https must be configured".to_string());
        }

        if self.store.backend == StoreBackendKind::Redis && self.store.redis.is_none() {
            errors.push("store.backend is 'redis' but [store.redis] is missing".to_string());
        }

        if self.ledger.is_missing_endpoint() {
            errors.push(
                "Warning: ledger.endpoint is not configured; claim and plan routes will fail"
                    .to_string(),
            );
        }

        if !self.upstream.is_configured() {
            errors.push(
                "Warning: upstream.endpoint is not configured; /v1/generate will fail".to_string(),
            );
        }

        match self.auth.salt_source() {
            None => errors.push(
                "auth.secret_salt (or secret_salt_env / secret_salt_file) must be configured"
                    .to_string(),
            ),
            Some(SaltSource::Direct(ref salt)) if salt.len() < 16 => errors.push(
                "Security warning: auth.secret_salt is too short, use at least 16 characters"
                    .to_string(),
            ),
            Some(_) => {}
        }

        if self.auth.challenge_ttl_secs == 0 {
            errors.push("auth.challenge_ttl_secs must be greater than 0".to_string());
        }

        if self.auth.admin_shared_key.is_none() {
            errors.push(
                "Warning: auth.admin_shared_key is not configured; admin routes are disabled"
                    .to_string(),
            );
        }

        for (i, tier) in self.quota.tiers.iter().enumerate() {
            if tier.code == 0 {
                errors.push(format!(
                    "quota.tiers[{i}]: tier code 0 means no entitlement and cannot carry a limit"
                ));
            }
            if self.quota.tiers[..i].iter().any(|t| t.code == tier.code) {
                errors.push(format!("quota.tiers[{i}]: duplicate tier code {}", tier.code));
            }
        }

        if self.rate_limit.enabled && (self.rate_limit.per_second == 0 || self.rate_limit.burst_size == 0)
        {
            errors.push("rate_limit.per_second and rate_limit.burst_size must be non-zero".to_string());
        }

        if self.env == "prod" {
            if self.bind.https.is_none() {
                errors.push("Production environment should enable HTTPS".to_string());
            }
            if self.observability.log.output == "console" {
                errors.push("Warning: Production environment should use file logging (observability.log.output = \"file\")".to_string());
            }
            if self.store.backend == StoreBackendKind::Memory {
                errors.push("Warning: memory store loses challenges and quota counters on restart".to_string());
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// 校验结果中是否只包含告警
pub fn only_warnings(problems: &[String]) -> bool {
    problems.iter().all(|p| p.starts_with("Warning:"))
}
