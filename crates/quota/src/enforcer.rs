//! 配额执行器

use crate::error::{QuotaError, QuotaResult};
use crate::scope::{QuotaScope, free_identity};
use crate::window::{seconds_until_utc_midnight, utc_day};
use keygate_common::metrics::QUOTA_REJECTIONS;
use keygate_common::{EphemeralStore, SharedClock, StoreError};
use serde::Serialize;
use tracing::{debug, info};

/// 一次计数的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QuotaDecision {
    pub scope: QuotaScope,
    /// 递增后的计数（含本次请求）
    pub used: u64,
    pub daily_limit: u64,
    pub allowed: bool,
    pub resets_in: u64,
}

impl QuotaDecision {
    fn into_result(self) -> QuotaResult<Self> {
        if self.allowed {
            return Ok(self);
        }
        QUOTA_REJECTIONS.with_label_values(&[self.scope.as_str()]).inc();
        Err(QuotaError::Exceeded {
            scope: self.scope,
            daily_limit: self.daily_limit,
            used: self.used,
            resets_in: self.resets_in,
        })
    }
}

#[derive(Debug, Clone)]
pub struct QuotaEnforcer {
    store: EphemeralStore,
    clock: SharedClock,
}

/// 计数器键
pub fn counter_key(scope: QuotaScope, day: &str, identity: &str) -> String {
    format!("quota:{}:{day}:{identity}", scope.as_str())
}

impl QuotaEnforcer {
    pub fn new(store: EphemeralStore, clock: SharedClock) -> Self {
        Self { store, clock }
    }

    /// 递增计数并判定
    ///
    /// 计数器在创建时设置到下一个 UTC 午夜的 TTL，递增与设置 TTL 由存储原子完成。
    /// 被拒绝的请求同样计数，不退还。
    pub async fn hit(&self, scope: QuotaScope, identity: &str, limit: u64) -> QuotaResult<QuotaDecision> {
        let now = self.clock.now();
        let resets_in = seconds_until_utc_midnight(now);
        let key = counter_key(scope, &utc_day(now), identity);

        let used = self.store.incr_expire_if_new(&key, resets_in).await?;
        let allowed = used <= limit;
        if !allowed {
            info!(scope = scope.as_str(), identity, used, limit, "daily quota exceeded");
        } else {
            debug!(scope = scope.as_str(), used, limit, "quota counted");
        }

        Ok(QuotaDecision {
            scope,
            used,
            daily_limit: limit,
            allowed,
            resets_in,
        })
    }

    /// 已认证请求：按凭证哈希计数
    pub async fn check_key(&self, secret_hash: &str, limit: u64) -> QuotaResult<QuotaDecision> {
        self.hit(QuotaScope::Key, secret_hash, limit)
            .await?
            .into_result()
    }

    /// 匿名请求：先过按地址的外层上限，再过按地址 + 标签的上限
    ///
    /// 外层拒绝时不再递增内层计数。返回内层的判定。
    pub async fn check_anonymous(
        &self,
        client: &str,
        label: &str,
        free_limit: u64,
        coarse_limit: u64,
    ) -> QuotaResult<QuotaDecision> {
        self.hit(QuotaScope::FreeCoarse, client, coarse_limit)
            .await?
            .into_result()?;

        self.hit(QuotaScope::Free, &free_identity(client, label), free_limit)
            .await?
            .into_result()
    }

    /// 今日已用次数，只读
    pub async fn usage(&self, scope: QuotaScope, identity: &str) -> QuotaResult<u64> {
        let key = counter_key(scope, &utc_day(self.clock.now()), identity);
        match self.store.get(&key).await? {
            None => Ok(0),
            Some(raw) => raw.parse().map_err(|e: std::num::ParseIntError| {
                QuotaError::Store(StoreError::Corrupt {
                    key,
                    reason: e.to_string(),
                })
            }),
        }
    }

    /// 距下一个 UTC 午夜的秒数
    pub fn resets_in(&self) -> u64 {
        seconds_until_utc_midnight(self.clock.now())
    }
}
