//! 基础设施错误类型

use crate::deadline::DeadlineExceeded;
use thiserror::Error;

/// 临时存储错误
#[derive(Debug, Error)]
pub enum StoreError {
    /// 存储后端不可达或命令失败
    #[error("Ephemeral store unavailable: {0}")]
    Unavailable(String),

    /// 调用超时
    #[error("Ephemeral store call timed out: {0}")]
    Timeout(#[from] DeadlineExceeded),

    /// 存储中的值无法解析
    #[error("Corrupt value under key {key}: {reason}")]
    Corrupt { key: String, reason: String },

    /// 配置错误
    #[error("Ephemeral store configuration error: {0}")]
    Config(String),
}

/// ledger 查询错误
#[derive(Debug, Error)]
pub enum LedgerError {
    /// 未配置 ledger（启动时已告警，用到时硬失败）
    #[error("Ledger oracle is not configured")]
    NotConfigured,

    /// 上游不可达或返回非成功状态
    #[error("Ledger oracle unavailable: {0}")]
    Unavailable(String),

    /// 上游返回了无法解析的数据
    #[error("Ledger oracle returned malformed data: {0}")]
    Malformed(String),

    /// 调用超时
    #[error("Ledger oracle call timed out: {0}")]
    Timeout(#[from] DeadlineExceeded),
}

impl From<reqwest::Error> for LedgerError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            LedgerError::Malformed(err.to_string())
        } else {
            LedgerError::Unavailable(err.to_string())
        }
    }
}
