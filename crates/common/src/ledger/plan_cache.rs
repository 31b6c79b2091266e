//! 套餐列表缓存
//!
//! 套餐列表在临时存储中缓存 60 秒（键 `plan-cache:v1`）。
//! 缓存读写失败只记日志，回退到直接查询 ledger。

use super::{LedgerOracle, Plan};
use crate::error::LedgerError;
use crate::store::EphemeralStore;
use tracing::{debug, warn};

pub const PLAN_CACHE_KEY: &str = "plan-cache:v1";
pub const PLAN_CACHE_TTL_SECS: u64 = 60;

#[derive(Debug, Clone)]
pub struct PlanCache {
    store: EphemeralStore,
}

impl PlanCache {
    pub fn new(store: EphemeralStore) -> Self {
        Self { store }
    }

    /// 返回套餐列表及是否命中缓存
    pub async fn plans<L: LedgerOracle + ?Sized>(
        &self,
        ledger: &L,
    ) -> Result<(Vec<Plan>, bool), LedgerError> {
        match self.store.get(PLAN_CACHE_KEY).await {
            Ok(Some(raw)) => match serde_json::from_str::<Vec<Plan>>(&raw) {
                Ok(plans) => {
                    debug!(count = plans.len(), "plan cache hit");
                    return Ok((plans, true));
                }
                Err(e) => warn!("Discarding unreadable plan cache entry: {e}"),
            },
            Ok(None) => {}
            Err(e) => warn!("Plan cache read failed, querying ledger: {e}"),
        }

        let plans = ledger.list_plans().await?;

        match serde_json::to_string(&plans) {
            Ok(raw) => {
                if let Err(e) = self
                    .store
                    .set_ex(PLAN_CACHE_KEY, &raw, PLAN_CACHE_TTL_SECS)
                    .await
                {
                    warn!("Plan cache write failed: {e}");
                }
            }
            Err(e) => warn!("Failed to serialize plans for cache: {e}"),
        }

        Ok((plans, false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::WalletAddress;
    use crate::ledger::EntitlementSnapshot;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct CountingLedger {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LedgerOracle for CountingLedger {
        async fn entitlement(&self, _: &WalletAddress) -> Result<EntitlementSnapshot, LedgerError> {
            Ok(EntitlementSnapshot::NONE)
        }

        async fn list_plans(&self) -> Result<Vec<Plan>, LedgerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![Plan {
                tier: 2,
                duration_id: 1,
                duration_seconds: 2_592_000,
                price_minor_units: 7,
            }])
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_hit_then_expiry() {
        let cache = PlanCache::new(EphemeralStore::memory(Duration::from_secs(1)));
        let ledger = CountingLedger::default();

        let (plans, cached) = cache.plans(&ledger).await.unwrap();
        assert_eq!(plans.len(), 1);
        assert!(!cached);

        let (_, cached) = cache.plans(&ledger).await.unwrap();
        assert!(cached);
        assert_eq!(ledger.calls.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(PLAN_CACHE_TTL_SECS)).await;
        let (_, cached) = cache.plans(&ledger).await.unwrap();
        assert!(!cached);
        assert_eq!(ledger.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_corrupt_entry_falls_through() {
        let store = EphemeralStore::memory(Duration::from_secs(1));
        store.set_ex(PLAN_CACHE_KEY, "{not json", 60).await.unwrap();
        let cache = PlanCache::new(store);
        let ledger = CountingLedger::default();

        let (plans, cached) = cache.plans(&ledger).await.unwrap();
        assert!(!cached);
        assert_eq!(plans[0].price_minor_units, 7);
    }
}
