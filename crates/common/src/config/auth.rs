//! 钱包认证与凭证签发配置

use serde::{Deserialize, Serialize};

/// 服务端盐值来源
///
/// 盐值参与凭证哈希计算；更换盐值会使全部已签发凭证失效。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaltSource {
    /// 直接写在配置文件中
    Direct(String),
    /// 从环境变量读取
    Environment(String),
    /// 从文件读取（首尾空白被去掉）
    File(String),
}

/// 认证配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// 挑战消息中的域标签
    #[serde(default = "default_domain")]
    pub domain: String,

    /// 挑战消息中的网络标识（如 chain id）
    #[serde(default = "default_network")]
    pub network: String,

    /// 挑战消息中的合约地址
    #[serde(default = "default_contract")]
    pub contract: String,

    /// 挑战有效期（秒）
    #[serde(default = "default_challenge_ttl_secs")]
    pub challenge_ttl_secs: u64,

    /// 凭证前缀，便于运维识别泄漏的密钥
    #[serde(default = "default_secret_prefix")]
    pub secret_prefix: String,

    /// 盐值（不推荐用于生产）
    #[serde(default)]
    pub secret_salt: Option<String>,

    /// 盐值环境变量名
    #[serde(default)]
    pub secret_salt_env: Option<String>,

    /// 盐值文件路径，文件权限应为 600
    #[serde(default)]
    pub secret_salt_file: Option<String>,

    /// 管理接口的 HMAC 共享密钥，未配置时管理接口返回 misconfigured
    #[serde(default)]
    pub admin_shared_key: Option<String>,

    /// 管理凭证时间戳允许的偏差（秒）
    #[serde(default = "default_admin_max_skew_secs")]
    pub admin_max_skew_secs: u64,

    /// 数据库调用超时（毫秒）
    #[serde(default = "default_db_timeout_ms")]
    pub db_timeout_ms: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            domain: default_domain(),
            network: default_network(),
            contract: default_contract(),
            challenge_ttl_secs: default_challenge_ttl_secs(),
            secret_prefix: default_secret_prefix(),
            secret_salt: None,
            secret_salt_env: None,
            secret_salt_file: None,
            admin_shared_key: None,
            admin_max_skew_secs: default_admin_max_skew_secs(),
            db_timeout_ms: default_db_timeout_ms(),
        }
    }
}

impl AuthConfig {
    /// 获取盐值来源
    ///
    /// 优先级: secret_salt_file > secret_salt_env > secret_salt
    pub fn salt_source(&self) -> Option<SaltSource> {
        if let Some(path) = &self.secret_salt_file {
            return Some(SaltSource::File(path.clone()));
        }
        if let Some(var) = &self.secret_salt_env {
            return Some(SaltSource::Environment(var.clone()));
        }
        self.secret_salt.clone().map(SaltSource::Direct)
    }

    pub fn db_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.db_timeout_ms)
    }
}

fn default_domain() -> String {
    "keygate".to_string()
}

fn default_network() -> String {
    "1".to_string()
}

fn default_contract() -> String {
    "0x0000000000000000000000000000000000000000".to_string()
}

fn default_challenge_ttl_secs() -> u64 {
    300
}

fn default_secret_prefix() -> String {
    "kg_".to_string()
}

fn default_admin_max_skew_secs() -> u64 {
    300
}

fn default_db_timeout_ms() -> u64 {
    5000
}
