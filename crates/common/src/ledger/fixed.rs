//! 配置文件内的固定 ledger，用于开发环境与测试

use super::{EntitlementSnapshot, LedgerOracle, Plan};
use crate::config::LedgerConfig;
use crate::error::LedgerError;
use crate::identity::WalletAddress;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct FixedLedger {
    entitlements: Arc<HashMap<WalletAddress, EntitlementSnapshot>>,
    plans: Arc<Vec<Plan>>,
}

impl FixedLedger {
    pub fn new(entitlements: HashMap<WalletAddress, EntitlementSnapshot>, plans: Vec<Plan>) -> Self {
        Self {
            entitlements: Arc::new(entitlements),
            plans: Arc::new(plans),
        }
    }

    /// `expires_in_secs` 相对 `now_unix` 换算为绝对时间
    pub fn from_config(config: &LedgerConfig, now_unix: i64) -> Result<Self, LedgerError> {
        let mut entitlements = HashMap::new();
        for entry in &config.entitlements {
            let address = WalletAddress::parse(&entry.address).map_err(|e| {
                LedgerError::Malformed(format!("static entitlement {}: {e}", entry.address))
            })?;
            let expires_at = match (entry.expires_at, entry.expires_in_secs) {
                (Some(at), _) => at,
                (None, Some(secs)) => now_unix + secs,
                (None, None) => 0,
            };
            entitlements.insert(
                address,
                EntitlementSnapshot {
                    tier: entry.tier,
                    expires_at,
                },
            );
        }

        let plans = config
            .plans
            .iter()
            .map(|p| Plan {
                tier: p.tier,
                duration_id: p.duration_id,
                duration_seconds: p.duration_seconds,
                price_minor_units: p.price_minor_units,
            })
            .collect();

        Ok(Self::new(entitlements, plans))
    }
}

#[async_trait]
impl LedgerOracle for FixedLedger {
    async fn entitlement(&self, identity: &WalletAddress) -> Result<EntitlementSnapshot, LedgerError> {
        Ok(self
            .entitlements
            .get(identity)
            .copied()
            .unwrap_or(EntitlementSnapshot::NONE))
    }

    async fn list_plans(&self) -> Result<Vec<Plan>, LedgerError> {
        Ok(self.plans.as_ref().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ledger::{LedgerBackendKind, StaticEntitlement};

    #[tokio::test]
    async fn test_relative_expiry_and_unknown_identity() {
        let config = LedgerConfig {
            backend: LedgerBackendKind::Static,
            entitlements: vec![StaticEntitlement {
                address: "0x00000000000000000000000000000000000000AA".to_string(),
                tier: 2,
                expires_at: None,
                expires_in_secs: Some(3600),
            }],
            ..Default::default()
        };
        let ledger = FixedLedger::from_config(&config, 1_000).unwrap();

        let known = WalletAddress::parse("0x00000000000000000000000000000000000000aa").unwrap();
        let snapshot = ledger.entitlement(&known).await.unwrap();
        assert_eq!(snapshot.tier, 2);
        assert_eq!(snapshot.expires_at, 4_600);

        let unknown = WalletAddress::parse("0x00000000000000000000000000000000000000bb").unwrap();
        assert_eq!(
            ledger.entitlement(&unknown).await.unwrap(),
            EntitlementSnapshot::NONE
        );
    }

    #[test]
    fn test_bad_address_rejected() {
        let config = LedgerConfig {
            backend: LedgerBackendKind::Static,
            entitlements: vec![StaticEntitlement {
                address: "not-an-address".to_string(),
                tier: 1,
                expires_at: Some(1),
                expires_in_secs: None,
            }],
            ..Default::default()
        };
        assert!(matches!(
            FixedLedger::from_config(&config, 0),
            Err(LedgerError::Malformed(_))
        ));
    }
}
