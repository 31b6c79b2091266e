//! keygate 认证组件
//!
//! 签发路径：[`NonceManager`] → [`signature::verify`] → [`entitlement::require_active`] → [`CredentialIssuer`]
//!
//! 服务路径：[`CredentialValidator`] → 配额 → 上游
//!
//! # 安全约束
//!
//! - 挑战一次性使用，每次认领尝试（无论成败）都会消费挑战
//! - 凭证原文只在签发时返回一次，存储的是带盐 HMAC
//! - 同一身份任意时刻最多一条可用凭证

pub mod admin;
pub mod credential;
pub mod entitlement;
pub mod error;
pub mod nonce;
pub mod signature;

pub use admin::{AdminVerifier, StoreNonceStorage, revoke_payload};
pub use credential::{
    Credential, CredentialIssuer, CredentialStore, CredentialValidator, IssuedCredential,
    MintRequest, RawSecret, SecretHasher,
};
pub use error::{AuthError, AuthResult};
pub use nonce::{Challenge, ChallengeRecord, NonceManager};
