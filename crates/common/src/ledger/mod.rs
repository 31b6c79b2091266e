//! 只读 ledger oracle
//!
//! 查询身份的链上权益快照和可购买的套餐。服务从不签名或提交交易。

pub mod fixed;
pub mod http;
pub mod plan_cache;

use crate::config::{LedgerBackendKind, LedgerConfig};
use crate::error::LedgerError;
use crate::identity::WalletAddress;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use fixed::FixedLedger;
pub use http::HttpLedger;
pub use plan_cache::PlanCache;

/// 权益快照：档位代码与绝对过期时间（Unix 秒）
///
/// 档位代码由外部定义（0 = 无），原样保留，不做解释。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitlementSnapshot {
    pub tier: u8,
    pub expires_at: i64,
}

impl EntitlementSnapshot {
    /// 没有任何权益
    pub const NONE: Self = Self {
        tier: 0,
        expires_at: 0,
    };
}

/// 可购买的套餐
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub tier: u8,
    pub duration_id: u8,
    pub duration_seconds: u64,
    /// 最小货币单位的价格
    pub price_minor_units: u128,
}

/// ledger 查询接口
#[async_trait]
pub trait LedgerOracle: Send + Sync {
    async fn entitlement(&self, identity: &WalletAddress) -> Result<EntitlementSnapshot, LedgerError>;

    async fn list_plans(&self) -> Result<Vec<Plan>, LedgerError>;
}

/// 按配置选择的 ledger 实现
#[derive(Debug, Clone)]
pub enum Ledger {
    Http(HttpLedger),
    Fixed(FixedLedger),
    /// HTTP 后端缺少地址：所有调用返回 NotConfigured
    Unconfigured,
}

impl Ledger {
    pub fn from_config(config: &LedgerConfig, now_unix: i64) -> Result<Self, LedgerError> {
        match config.backend {
            LedgerBackendKind::Http => match config.endpoint.as_deref().map(str::trim) {
                Some(endpoint) if !endpoint.is_empty() => {
                    Ok(Self::Http(HttpLedger::new(endpoint, config.timeout())?))
                }
                _ => Ok(Self::Unconfigured),
            },
            LedgerBackendKind::Static => Ok(Self::Fixed(FixedLedger::from_config(config, now_unix)?)),
        }
    }

    pub fn is_configured(&self) -> bool {
        !matches!(self, Self::Unconfigured)
    }
}

#[async_trait]
impl LedgerOracle for Ledger {
    async fn entitlement(&self, identity: &WalletAddress) -> Result<EntitlementSnapshot, LedgerError> {
        match self {
            Self::Http(l) => l.entitlement(identity).await,
            Self::Fixed(l) => l.entitlement(identity).await,
            Self::Unconfigured => Err(LedgerError::NotConfigured),
        }
    }

    async fn list_plans(&self) -> Result<Vec<Plan>, LedgerError> {
        match self {
            Self::Http(l) => l.list_plans().await,
            Self::Fixed(l) => l.list_plans().await,
            Self::Unconfigured => Err(LedgerError::NotConfigured),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_http_without_endpoint_is_unconfigured() {
        let ledger = Ledger::from_config(&LedgerConfig::default(), 0).unwrap();
        assert!(!ledger.is_configured());

        let addr = WalletAddress::parse("0x00000000000000000000000000000000000000aa").unwrap();
        assert!(matches!(
            ledger.entitlement(&addr).await,
            Err(LedgerError::NotConfigured)
        ));
        assert!(matches!(
            ledger.list_plans().await,
            Err(LedgerError::NotConfigured)
        ));
    }
}
