//! 凭证
//!
//! 凭证只由签发器在成功认领后创建；之后只允许两种修改：
//! 校验器尽力而为地更新 `last_used_at`，以及撤销（再次认领或管理操作）。
//! 记录从不删除。"过期"不是存储状态，而是读取时按当前时间计算的结果。

pub mod issuer;
pub mod locks;
pub mod secret;
pub mod storage;
pub mod validator;

pub use issuer::{CredentialIssuer, IssuedCredential, MintRequest};
pub use locks::IdentityLocks;
pub use secret::{RawSecret, SecretHasher};
pub use storage::CredentialStore;
pub use validator::CredentialValidator;

use serde::Serialize;

/// 凭证记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Credential {
    /// 原文的 HMAC，主键
    pub secret_hash: String,
    pub identity: String,
    /// 外部档位代码，原样保存
    pub tier: u8,
    /// 覆盖档位默认值的每日上限
    pub daily_limit: Option<u64>,
    pub enabled: bool,
    /// 绝对过期时间（Unix 秒）
    pub expires_at: Option<i64>,
    /// 签发时的权益过期快照
    pub entitlement_expires_at: Option<i64>,
    pub revoked_at: Option<i64>,
    pub last_used_at: Option<i64>,
    pub label: Option<String>,
    pub created_at: i64,
}

impl Credential {
    /// 可用：启用、未撤销、未过期、权益快照未过期
    pub fn is_usable(&self, now: i64) -> bool {
        self.enabled
            && self.revoked_at.is_none()
            && self.expires_at.is_none_or(|at| at > now)
            && self.entitlement_expires_at.is_none_or(|at| at > now)
    }

    /// 哈希前缀，用于日志
    pub fn hash_prefix(&self) -> &str {
        &self.secret_hash[..self.secret_hash.len().min(12)]
    }
}
