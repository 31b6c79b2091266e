//! 凭证签发
//!
//! 同一身份的签发经 [`IdentityLocks`] 串行化，撤销与插入在同一事务中完成，
//! 因此并发认领时任意时刻最多一条可用凭证。签发路径不做自动重试。

use super::{Credential, CredentialStore, IdentityLocks, RawSecret, SecretHasher};
use crate::error::AuthResult;
use keygate_common::metrics::{CREDENTIALS_ISSUED, CREDENTIALS_REVOKED};
use keygate_common::{SharedClock, WalletAddress};
use tracing::info;

const MAX_LABEL_CHARS: usize = 64;

/// 签发请求
#[derive(Debug, Clone)]
pub struct MintRequest {
    pub identity: WalletAddress,
    pub tier: u8,
    pub entitlement_expires_at: Option<i64>,
    pub label: Option<String>,
    /// 覆盖档位默认上限
    pub daily_limit: Option<u64>,
    /// 绝对过期时间，默认不设
    pub expires_at: Option<i64>,
}

impl MintRequest {
    pub fn new(identity: WalletAddress, tier: u8, entitlement_expires_at: i64) -> Self {
        Self {
            identity,
            tier,
            entitlement_expires_at: Some(entitlement_expires_at),
            label: None,
            daily_limit: None,
            expires_at: None,
        }
    }

    pub fn with_label(mut self, label: Option<String>) -> Self {
        self.label = label;
        self
    }
}

/// 签发结果；`secret` 只在这里出现一次
#[derive(Debug)]
pub struct IssuedCredential {
    pub secret: RawSecret,
    pub credential: Credential,
    /// 同时被撤销的旧凭证数
    pub revoked: u64,
}

#[derive(Debug, Clone)]
pub struct CredentialIssuer {
    store: CredentialStore,
    hasher: SecretHasher,
    prefix: String,
    locks: IdentityLocks,
    clock: SharedClock,
}

fn clean_label(label: Option<String>) -> Option<String> {
    label
        .map(|l| l.trim().chars().take(MAX_LABEL_CHARS).collect::<String>())
        .filter(|l| !l.is_empty())
}

impl CredentialIssuer {
    pub fn new(
        store: CredentialStore,
        hasher: SecretHasher,
        prefix: impl Into<String>,
        clock: SharedClock,
    ) -> Self {
        Self {
            store,
            hasher,
            prefix: prefix.into(),
            locks: IdentityLocks::new(),
            clock,
        }
    }

    pub async fn mint(&self, request: MintRequest) -> AuthResult<IssuedCredential> {
        let secret = RawSecret::generate(&self.prefix);
        let secret_hash = self.hasher.hash(secret.expose());

        let _guard = self.locks.acquire(request.identity.as_str()).await;
        let now = self.clock.unix();

        let credential = Credential {
            secret_hash,
            identity: request.identity.to_string(),
            tier: request.tier,
            daily_limit: request.daily_limit,
            enabled: true,
            expires_at: request.expires_at,
            entitlement_expires_at: request.entitlement_expires_at,
            revoked_at: None,
            last_used_at: None,
            label: clean_label(request.label),
            created_at: now,
        };

        let revoked = self.store.revoke_and_insert(&credential, now).await?;

        CREDENTIALS_ISSUED
            .with_label_values(&[&credential.tier.to_string()])
            .inc();
        if revoked > 0 {
            CREDENTIALS_REVOKED
                .with_label_values(&["reissue"])
                .inc_by(revoked);
        }
        info!(
            identity = %credential.identity,
            hash = credential.hash_prefix(),
            tier = credential.tier,
            revoked,
            "credential minted"
        );

        Ok(IssuedCredential {
            secret,
            credential,
            revoked,
        })
    }

    /// 管理撤销：撤销身份名下全部凭证
    pub async fn revoke_all(&self, identity: &WalletAddress) -> AuthResult<u64> {
        let _guard = self.locks.acquire(identity.as_str()).await;
        let revoked = self
            .store
            .revoke_identity(identity.as_str(), self.clock.unix())
            .await?;
        if revoked > 0 {
            CREDENTIALS_REVOKED.with_label_values(&["admin"]).inc_by(revoked);
        }
        info!(%identity, revoked, "credentials revoked by admin");
        Ok(revoked)
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keygate_common::{Clock, SystemClock};
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::tempdir;

    async fn issuer() -> (tempfile::TempDir, CredentialIssuer) {
        let dir = tempdir().unwrap();
        let store = CredentialStore::open(dir.path(), Duration::from_secs(5))
            .await
            .unwrap();
        let hasher = SecretHasher::new(b"unit-test-salt-0123".to_vec()).unwrap();
        (
            dir,
            CredentialIssuer::new(store, hasher, "kg_", SystemClock::shared()),
        )
    }

    fn addr() -> WalletAddress {
        WalletAddress::parse("0x00000000000000000000000000000000000000aa").unwrap()
    }

    #[tokio::test]
    async fn test_mint_stores_only_hash() {
        let (_dir, issuer) = issuer().await;
        let far = SystemClock.unix() + 3600;
        let issued = issuer
            .mint(MintRequest::new(addr(), 2, far).with_label(Some("  cli  ".to_string())))
            .await
            .unwrap();

        assert!(issued.secret.expose().starts_with("kg_"));
        assert_ne!(issued.credential.secret_hash, issued.secret.expose());
        assert_eq!(issued.credential.label.as_deref(), Some("cli"));
        assert_eq!(issued.revoked, 0);

        let stored = issuer
            .store()
            .find(&issued.credential.secret_hash)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored, issued.credential);
    }

    #[tokio::test]
    async fn test_concurrent_mints_leave_one_usable() {
        let (_dir, issuer) = issuer().await;
        let issuer = Arc::new(issuer);
        let far = SystemClock.unix() + 3600;

        let mut handles = Vec::new();
        for _ in 0..10 {
            let issuer = issuer.clone();
            handles.push(tokio::spawn(async move {
                issuer.mint(MintRequest::new(addr(), 1, far)).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let usable = issuer
            .store()
            .usable_for_identity(addr().as_str(), SystemClock.unix())
            .await
            .unwrap();
        assert_eq!(usable.len(), 1);
    }

    #[tokio::test]
    async fn test_revoke_all() {
        let (_dir, issuer) = issuer().await;
        let far = SystemClock.unix() + 3600;
        issuer.mint(MintRequest::new(addr(), 2, far)).await.unwrap();

        assert_eq!(issuer.revoke_all(&addr()).await.unwrap(), 1);
        assert!(
            issuer
                .store()
                .usable_for_identity(addr().as_str(), SystemClock.unix())
                .await
                .unwrap()
                .is_empty()
        );
    }
}
