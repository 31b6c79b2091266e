//! 凭证校验
//!
//! 调用方必须区分两种情况：没有提交凭证走匿名/免费通道；
//! 提交了但无法解析的凭证直接拒绝，绝不降级为匿名访问。

use super::{Credential, CredentialStore, SecretHasher};
use crate::error::{AuthError, AuthResult};
use keygate_common::SharedClock;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct CredentialValidator {
    store: CredentialStore,
    hasher: SecretHasher,
    clock: SharedClock,
}

impl CredentialValidator {
    pub fn new(store: CredentialStore, hasher: SecretHasher, clock: SharedClock) -> Self {
        Self {
            store,
            hasher,
            clock,
        }
    }

    /// 将凭证原文解析为可用记录
    ///
    /// 命中后在后台更新 `last_used_at`，该更新失败不影响本次请求。
    pub async fn resolve(&self, raw_secret: &str) -> AuthResult<Credential> {
        let raw_secret = raw_secret.trim();
        if raw_secret.is_empty() {
            return Err(AuthError::CredentialUnusable.record());
        }

        let secret_hash = self.hasher.hash(raw_secret);
        let now = self.clock.unix();

        let Some(credential) = self.store.find_usable(&secret_hash, now).await? else {
            return Err(AuthError::CredentialUnusable.record());
        };

        let store = self.store.clone();
        tokio::spawn(async move {
            if let Err(e) = store.touch_last_used(&secret_hash, now).await {
                warn!("Failed to record credential last use: {e}");
            }
        });

        debug!(hash = credential.hash_prefix(), tier = credential.tier, "credential resolved");
        Ok(credential)
    }

    /// `None` 表示匿名；提交了凭证则必须可解析
    pub async fn resolve_presented(&self, presented: Option<&str>) -> AuthResult<Option<Credential>> {
        match presented {
            None => Ok(None),
            Some(raw) => self.resolve(raw).await.map(Some),
        }
    }
}
