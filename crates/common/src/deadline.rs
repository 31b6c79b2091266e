//! 外部调用超时
//!
//! 每一次对外部协作方（临时存储、数据库、ledger、内容生成上游）的调用
//! 都必须携带调用方给出的超时。

use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// 调用超过截止时间
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{operation} timed out after {timeout_ms}ms")]
pub struct DeadlineExceeded {
    pub operation: &'static str,
    pub timeout_ms: u64,
}

/// 在截止时间内执行 `fut`
///
/// 超时后 future 被丢弃；对数据库事务而言，这意味着事务回滚。
pub async fn with_deadline<T, F>(
    timeout: Duration,
    operation: &'static str,
    fut: F,
) -> Result<T, DeadlineExceeded>
where
    F: Future<Output = T>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(value) => Ok(value),
        Err(_) => {
            let timeout_ms = timeout.as_millis() as u64;
            warn!(operation, timeout_ms, "external call exceeded deadline");
            Err(DeadlineExceeded {
                operation,
                timeout_ms,
            })
        }
    }
}
