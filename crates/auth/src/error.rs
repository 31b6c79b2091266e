//! 认证与凭证错误

use keygate_common::metrics::AUTH_FAILURES;
use keygate_common::{DeadlineExceeded, IdentityError, LedgerError, StoreError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    /// 地址、签名格式等输入错误
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// 挑战不存在：已被消费、从未签发或已过期
    #[error("Challenge expired or already used")]
    ChallengeExpired,

    /// 签名数据格式错误或无法恢复公钥
    #[error("Invalid signature: {0}")]
    SignatureInvalid(String),

    /// 恢复出的地址与声明的地址不一致
    #[error("Signature does not match the claimed address")]
    SignatureMismatch,

    /// 有效档位为 0
    #[error("No active entitlement")]
    NoActiveEntitlement,

    /// 提交的凭证无法解析为可用记录
    #[error("Credential is unknown, revoked or expired")]
    CredentialUnusable,

    /// 管理凭证校验失败（签名错误、重放或时间窗口外）
    #[error("Admin credential rejected: {0}")]
    AdminRejected(String),

    #[error("Ephemeral store error: {0}")]
    Store(#[from] StoreError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Deadline exceeded: {0}")]
    Timeout(#[from] DeadlineExceeded),

    /// 配置错误（盐值缺失等）
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<IdentityError> for AuthError {
    fn from(err: IdentityError) -> Self {
        AuthError::InvalidInput(format!("address: {err}"))
    }
}

impl AuthError {
    /// 指标标签
    pub fn reason(&self) -> &'static str {
        match self {
            AuthError::InvalidInput(_) => "invalid_input",
            AuthError::ChallengeExpired => "challenge_expired",
            AuthError::SignatureInvalid(_) => "signature_invalid",
            AuthError::SignatureMismatch => "signature_mismatch",
            AuthError::NoActiveEntitlement => "no_active_entitlement",
            AuthError::CredentialUnusable => "credential_unusable",
            AuthError::AdminRejected(_) => "admin_rejected",
            AuthError::Store(_) => "store",
            AuthError::Ledger(_) => "ledger",
            AuthError::Database(_) => "database",
            AuthError::Timeout(_) => "timeout",
            AuthError::Config(_) => "config",
            AuthError::Internal(_) => "internal",
        }
    }

    /// 调用方被拒绝，而不是基础设施故障
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            AuthError::ChallengeExpired
                | AuthError::SignatureInvalid(_)
                | AuthError::SignatureMismatch
                | AuthError::NoActiveEntitlement
                | AuthError::CredentialUnusable
                | AuthError::AdminRejected(_)
        )
    }

    /// 认证失败按原因计入 `keygate_auth_failures_total`，其余错误原样返回
    pub fn record(self) -> Self {
        if self.is_auth_failure() {
            AUTH_FAILURES.with_label_values(&[self.reason()]).inc();
        }
        self
    }
}

pub type AuthResult<T> = Result<T, AuthError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn failures(reason: &str) -> u64 {
        AUTH_FAILURES.with_label_values(&[reason]).get()
    }

    #[test]
    fn test_record_counts_by_reason() {
        let before = failures("signature_mismatch");
        let err = AuthError::SignatureMismatch.record();
        assert!(matches!(err, AuthError::SignatureMismatch));
        assert!(failures("signature_mismatch") > before);
    }

    #[test]
    fn test_record_skips_infrastructure_errors() {
        let before = failures("internal");
        let _ = AuthError::Internal("boom".to_string()).record();
        assert_eq!(failures("internal"), before);
        assert!(!AuthError::Config("salt".to_string()).is_auth_failure());
    }
}
