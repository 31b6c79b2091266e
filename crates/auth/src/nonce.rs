//! 登录挑战
//!
//! 每个身份同一时刻只有一个待处理挑战，新请求覆盖旧挑战。
//! 挑战保存在临时存储 `challenge:{identity}`，内容为 `{nonce, issued_at}`。
//! 签名校验时由服务端按保存的内容重建消息，客户端只需提交签名。

use crate::error::{AuthError, AuthResult};
use chrono::{DateTime, Utc};
use keygate_common::config::AuthConfig;
use keygate_common::metrics::CHALLENGES_ISSUED;
use keygate_common::{EphemeralStore, SharedClock, WalletAddress};
use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use tracing::debug;

const NONCE_BYTES: usize = 16;

/// 已保存的挑战
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeRecord {
    pub nonce: String,
    pub issued_at: i64,
}

/// 发给客户端签名的挑战
#[derive(Debug, Clone)]
pub struct Challenge {
    pub message: String,
    pub expires_in: u64,
}

#[derive(Debug, Clone)]
pub struct NonceManager {
    store: EphemeralStore,
    clock: SharedClock,
    domain: String,
    network: String,
    contract: String,
    ttl_secs: u64,
}

pub fn challenge_key(identity: &WalletAddress) -> String {
    format!("challenge:{identity}")
}

impl NonceManager {
    pub fn new(store: EphemeralStore, clock: SharedClock, config: &AuthConfig) -> Self {
        Self {
            store,
            clock,
            domain: config.domain.clone(),
            network: config.network.clone(),
            contract: config.contract.clone(),
            ttl_secs: config.challenge_ttl_secs,
        }
    }

    /// 签发新挑战，覆盖该身份已有的挑战
    pub async fn issue_challenge(&self, identity: &WalletAddress) -> AuthResult<Challenge> {
        let mut bytes = [0u8; NONCE_BYTES];
        OsRng.fill_bytes(&mut bytes);

        let record = ChallengeRecord {
            nonce: hex::encode(bytes),
            issued_at: self.clock.unix(),
        };
        let value = serde_json::to_string(&record)
            .map_err(|e| AuthError::Internal(format!("Failed to encode challenge: {e}")))?;

        if let Err(e) = self
            .store
            .set_ex(&challenge_key(identity), &value, self.ttl_secs)
            .await
        {
            CHALLENGES_ISSUED.with_label_values(&["error"]).inc();
            return Err(e.into());
        }

        CHALLENGES_ISSUED.with_label_values(&["ok"]).inc();
        debug!(%identity, "challenge issued");

        Ok(Challenge {
            message: self.message(identity, &record),
            expires_in: self.ttl_secs,
        })
    }

    /// 原子地取出并删除挑战
    ///
    /// 无论后续校验成功与否，挑战都已失效。
    pub async fn consume_challenge(&self, identity: &WalletAddress) -> AuthResult<ChallengeRecord> {
        let key = challenge_key(identity);
        let raw = self
            .store
            .take(&key)
            .await?
            .ok_or_else(|| AuthError::ChallengeExpired.record())?;

        serde_json::from_str(&raw).map_err(|e| {
            AuthError::Store(keygate_common::StoreError::Corrupt {
                key,
                reason: e.to_string(),
            })
        })
    }

    /// 按保存的挑战重建待签名消息
    pub fn message(&self, identity: &WalletAddress, record: &ChallengeRecord) -> String {
        let issued_at = DateTime::<Utc>::from_timestamp(record.issued_at, 0)
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| record.issued_at.to_string());

        format!(
            "{domain} wants you to sign in with your wallet.\n\
             \n\
             Address: {identity}\n\
             Network: {network}\n\
             Contract: {contract}\n\
             Nonce: {nonce}\n\
             Issued At: {issued_at}",
            domain = self.domain,
            network = self.network,
            contract = self.contract,
            nonce = record.nonce,
        )
    }

    pub fn ttl_secs(&self) -> u64 {
        self.ttl_secs
    }
}
