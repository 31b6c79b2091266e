//! 配额错误

use crate::scope::QuotaScope;
use keygate_common::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum QuotaError {
    /// 超出每日上限
    #[error("Daily quota exceeded for scope {scope}: {used}/{daily_limit}")]
    Exceeded {
        scope: QuotaScope,
        daily_limit: u64,
        used: u64,
        /// 距下一个 UTC 午夜的秒数
        resets_in: u64,
    },

    #[error("Quota store error: {0}")]
    Store(#[from] StoreError),
}

pub type QuotaResult<T> = Result<T, QuotaError>;
