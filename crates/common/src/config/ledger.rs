//! ledger oracle 配置
//!
//! ledger 是只读的外部协作方：查询身份的权益快照与套餐列表。

use serde::{Deserialize, Serialize};

/// ledger 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    #[serde(default)]
    pub backend: LedgerBackendKind,

    /// HTTP 网关地址，如 `https://ledger.example.com`
    ///
    /// backend = "http" 且未配置时，签发和套餐路由返回 misconfigured。
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// 购买交易的目标合约地址
    #[serde(default)]
    pub contract: Option<String>,

    /// 购买函数签名，用于计算函数选择器
    #[serde(default = "default_purchase_signature")]
    pub purchase_signature: String,

    /// 静态权益表（backend = "static"）
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entitlements: Vec<StaticEntitlement>,

    /// 静态套餐表（backend = "static"）
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub plans: Vec<StaticPlan>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            backend: LedgerBackendKind::Http,
            endpoint: None,
            timeout_ms: default_timeout_ms(),
            contract: None,
            purchase_signature: default_purchase_signature(),
            entitlements: Vec::new(),
            plans: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LedgerBackendKind {
    #[default]
    Http,
    /// 配置文件内的固定数据，用于开发和测试
    Static,
}

/// 静态权益条目
///
/// `expires_in_secs` 相对于进程启动时刻；`expires_at` 为绝对 Unix 时间，二者取其一。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticEntitlement {
    pub address: String,
    pub tier: u8,
    #[serde(default)]
    pub expires_at: Option<i64>,
    #[serde(default)]
    pub expires_in_secs: Option<i64>,
}

/// 静态套餐条目
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticPlan {
    pub tier: u8,
    pub duration_id: u8,
    pub duration_seconds: u64,
    pub price_minor_units: u128,
}

impl LedgerConfig {
    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.timeout_ms)
    }

    /// HTTP 后端是否缺少地址
    pub fn is_missing_endpoint(&self) -> bool {
        self.backend == LedgerBackendKind::Http
            && self
                .endpoint
                .as_deref()
                .map(|e| e.trim().is_empty())
                .unwrap_or(true)
    }
}

fn default_timeout_ms() -> u64 {
    3000
}

fn default_purchase_signature() -> String {
    "purchase(uint8,uint8)".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_http_without_endpoint() {
        let config = LedgerConfig::default();
        assert_eq!(config.backend, LedgerBackendKind::Http);
        assert!(config.is_missing_endpoint());
        assert_eq!(config.purchase_signature, "purchase(uint8,uint8)");
    }

    #[test]
    fn test_static_tables() {
        let config: LedgerConfig = toml::from_str(
            r#"
            backend = "static"

            [[entitlements]]
            address = "0x00000000000000000000000000000000000000aa"
            tier = 2
            expires_in_secs = 3600

            [[plans]]
            tier = 2
            duration_id = 1
            duration_seconds = 2592000
            price_minor_units = 1000000
            "#,
        )
        .unwrap();
        assert_eq!(config.backend, LedgerBackendKind::Static);
        assert!(!config.is_missing_endpoint());
        assert_eq!(config.entitlements[0].tier, 2);
        assert_eq!(config.entitlements[0].expires_in_secs, Some(3600));
        assert_eq!(config.plans[0].price_minor_units, 1_000_000);
    }
}
