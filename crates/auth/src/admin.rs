//! 管理操作认证
//!
//! 管理请求携带 nonce-auth HMAC 凭证，载荷为 `revoke:<address>`，
//! 密钥为 `auth.admin_shared_key`。已用过的 nonce 记录在临时存储中，
//! 多实例共享同一存储时同样能拒绝重放。

use crate::error::{AuthError, AuthResult};
use async_trait::async_trait;
use keygate_common::{EphemeralStore, SharedClock, StoreError, WalletAddress};
use nonce_auth::storage::{NonceEntry, NonceStorage, StorageStats};
use nonce_auth::{CredentialVerifier, NonceCredential, NonceError};
use std::sync::Arc;
use std::time::Duration;

const NONCE_PREFIX: &str = "admin-nonce:";

/// 基于临时存储的 nonce 记录
///
/// 值为写入时刻（Unix 秒）。
#[derive(Debug, Clone)]
pub struct StoreNonceStorage {
    store: EphemeralStore,
    clock: SharedClock,
}

impl StoreNonceStorage {
    pub fn new(store: EphemeralStore, clock: SharedClock) -> Self {
        Self { store, clock }
    }

    fn key(nonce: &str, context: Option<&str>) -> String {
        format!("{NONCE_PREFIX}{}:{nonce}", context.unwrap_or("-"))
    }
}

#[async_trait]
impl NonceStorage for StoreNonceStorage {
    async fn get(&self, nonce: &str, context: Option<&str>) -> Result<Option<NonceEntry>, NonceError> {
        let key = Self::key(nonce, context);
        let Some(value) = self
            .store
            .get(&key)
            .await
            .map_err(NonceError::from_storage_error)?
        else {
            return Ok(None);
        };

        let created_at = value.parse::<i64>().map_err(|e| {
            NonceError::from_storage_error(StoreError::Corrupt {
                key,
                reason: e.to_string(),
            })
        })?;

        Ok(Some(NonceEntry {
            nonce: nonce.to_string(),
            context: context.map(str::to_string),
            created_at,
        }))
    }

    async fn set(&self, nonce: &str, context: Option<&str>, ttl: Duration) -> Result<(), NonceError> {
        let inserted = self
            .store
            .set_nx_ex(
                &Self::key(nonce, context),
                &self.clock.unix().to_string(),
                ttl.as_secs().max(1),
            )
            .await
            .map_err(NonceError::from_storage_error)?;

        if inserted {
            Ok(())
        } else {
            Err(NonceError::DuplicateNonce)
        }
    }

    async fn exists(&self, nonce: &str, context: Option<&str>) -> Result<bool, NonceError> {
        Ok(self.get(nonce, context).await?.is_some())
    }

    async fn cleanup_expired(&self, _current_time: i64) -> Result<usize, NonceError> {
        // 条目随 TTL 自动过期
        Ok(0)
    }

    async fn get_stats(&self) -> Result<StorageStats, NonceError> {
        let total = self
            .store
            .count_prefix(NONCE_PREFIX)
            .await
            .map_err(NonceError::from_storage_error)?;

        Ok(StorageStats {
            total_records: total as usize,
            backend_info: format!("ephemeral store ({})", self.store.backend_name()),
        })
    }
}

/// 管理凭证校验器
#[derive(Clone)]
pub struct AdminVerifier {
    shared_key: Arc<Vec<u8>>,
    nonce_storage: Arc<dyn NonceStorage + Send + Sync>,
    max_skew_secs: u64,
}

impl std::fmt::Debug for AdminVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminVerifier")
            .field("max_skew_secs", &self.max_skew_secs)
            .finish()
    }
}

/// 撤销操作的签名载荷
pub fn revoke_payload(identity: &WalletAddress) -> String {
    format!("revoke:{identity}")
}

impl AdminVerifier {
    pub fn new(
        shared_key: &str,
        store: EphemeralStore,
        clock: SharedClock,
        max_skew_secs: u64,
    ) -> Self {
        Self {
            shared_key: Arc::new(shared_key.as_bytes().to_vec()),
            nonce_storage: Arc::new(StoreNonceStorage::new(store, clock)),
            max_skew_secs: max_skew_secs.max(1),
        }
    }

    pub async fn verify(&self, credential: &NonceCredential, payload: &str) -> AuthResult<()> {
        let result = CredentialVerifier::new(self.nonce_storage.clone())
            .with_secret(&self.shared_key)
            .with_time_window(Duration::from_secs(self.max_skew_secs))
            .with_storage_ttl(Duration::from_secs(self.max_skew_secs * 2))
            .verify(credential, payload.as_bytes())
            .await;

        result.map_err(|e| {
            let reason = match e {
                NonceError::DuplicateNonce => "replayed nonce",
                NonceError::TimestampOutOfWindow => "timestamp out of window",
                NonceError::InvalidSignature => "invalid signature",
                _ => "verification failed",
            };
            AuthError::AdminRejected(reason.to_string()).record()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use keygate_common::{ManualClock, SystemClock};
    use nonce_auth::CredentialBuilder;

    fn verifier() -> AdminVerifier {
        AdminVerifier::new(
            "admin-secret",
            EphemeralStore::memory(Duration::from_secs(1)),
            SystemClock::shared(),
            300,
        )
    }

    fn storage_at(store: EphemeralStore, unix: i64) -> StoreNonceStorage {
        let now = Utc.timestamp_opt(unix, 0).unwrap();
        StoreNonceStorage::new(store, Arc::new(ManualClock::new(now)))
    }

    fn addr() -> WalletAddress {
        WalletAddress::parse("0x00000000000000000000000000000000000000aa").unwrap()
    }

    #[tokio::test]
    async fn test_valid_then_replayed() {
        let verifier = verifier();
        let payload = revoke_payload(&addr());
        let credential = CredentialBuilder::new(b"admin-secret")
            .sign(payload.as_bytes())
            .unwrap();

        verifier.verify(&credential, &payload).await.unwrap();
        assert!(matches!(
            verifier.verify(&credential, &payload).await,
            Err(AuthError::AdminRejected(_))
        ));
    }

    #[tokio::test]
    async fn test_wrong_key_or_payload() {
        let verifier = verifier();
        let payload = revoke_payload(&addr());

        let wrong_key = CredentialBuilder::new(b"someone-else")
            .sign(payload.as_bytes())
            .unwrap();
        assert!(verifier.verify(&wrong_key, &payload).await.is_err());

        let other = CredentialBuilder::new(b"admin-secret")
            .sign(b"revoke:0x00000000000000000000000000000000000000bb")
            .unwrap();
        assert!(verifier.verify(&other, &payload).await.is_err());
    }

    #[tokio::test]
    async fn test_storage_duplicate_and_stats() {
        let storage = storage_at(EphemeralStore::memory(Duration::from_secs(1)), 1_750_000_000);
        storage
            .set("n1", Some("ctx"), Duration::from_secs(60))
            .await
            .unwrap();
        assert!(storage.exists("n1", Some("ctx")).await.unwrap());
        let entry = storage.get("n1", Some("ctx")).await.unwrap().unwrap();
        assert_eq!(entry.created_at, 1_750_000_000);
        assert!(!storage.exists("n1", None).await.unwrap());
        assert!(matches!(
            storage.set("n1", Some("ctx"), Duration::from_secs(60)).await,
            Err(NonceError::DuplicateNonce)
        ));
        assert_eq!(storage.get_stats().await.unwrap().total_records, 1);
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_storage_error() {
        let store = EphemeralStore::memory(Duration::from_secs(1));
        store
            .set_ex("admin-nonce:-:bad", "not-a-timestamp", 60)
            .await
            .unwrap();
        let storage = storage_at(store, 1_750_000_000);

        assert!(matches!(
            storage.get("bad", None).await,
            Err(NonceError::StorageError(_))
        ));
    }
}
