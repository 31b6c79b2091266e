//! 每日配额配置

use serde::{Deserialize, Serialize};

/// 配额配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaConfig {
    /// 匿名请求：按「客户端地址 + 调用方标签」计数的每日上限
    #[serde(default = "default_free_daily_limit")]
    pub free_daily_limit: u64,

    /// 匿名请求：仅按客户端地址计数的每日上限，防止轮换标签绕过
    #[serde(default = "default_free_coarse_daily_limit")]
    pub free_coarse_daily_limit: u64,

    /// 未知档位代码的每日上限
    #[serde(default = "default_fallback_daily_limit")]
    pub fallback_daily_limit: u64,

    /// 档位表
    #[serde(default = "default_tiers")]
    pub tiers: Vec<TierConfig>,
}

/// 档位定义
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TierConfig {
    /// ledger 中的档位代码
    pub code: u8,
    /// 对外显示的名称
    pub name: String,
    pub daily_limit: u64,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            free_daily_limit: default_free_daily_limit(),
            free_coarse_daily_limit: default_free_coarse_daily_limit(),
            fallback_daily_limit: default_fallback_daily_limit(),
            tiers: default_tiers(),
        }
    }
}

impl QuotaConfig {
    pub fn tier(&self, code: u8) -> Option<&TierConfig> {
        self.tiers.iter().find(|t| t.code == code)
    }

    /// 档位名称，未知代码返回 "unknown"
    pub fn tier_name(&self, code: u8) -> &str {
        self.tier(code).map(|t| t.name.as_str()).unwrap_or("unknown")
    }

    /// 档位默认每日上限，未知代码使用 fallback_daily_limit
    pub fn tier_limit(&self, code: u8) -> u64 {
        self.tier(code)
            .map(|t| t.daily_limit)
            .unwrap_or(self.fallback_daily_limit)
    }
}

fn default_free_daily_limit() -> u64 {
    5
}

fn default_free_coarse_daily_limit() -> u64 {
    20
}

fn default_fallback_daily_limit() -> u64 {
    5
}

fn default_tiers() -> Vec<TierConfig> {
    vec![
        TierConfig {
            code: 1,
            name: "basic".to_string(),
            daily_limit: 100,
        },
        TierConfig {
            code: 2,
            name: "pro".to_string(),
            daily_limit: 1000,
        },
    ]
}
