//! HTTP ledger 网关客户端
//!
//! 接口约定：
//! - `GET {endpoint}/entitlements/{address}` → `{"tier": 2, "expires_at": 1735689600}`，404 表示无权益
//! - `GET {endpoint}/plans` → `{"plans": [{"tier", "duration_id", "duration_seconds", "price_minor_units"}]}`
//!
//! 价格以十进制字符串传输，避免超出 JSON 数字精度。

use super::{EntitlementSnapshot, LedgerOracle, Plan};
use crate::deadline::with_deadline;
use crate::error::LedgerError;
use crate::identity::WalletAddress;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct HttpLedger {
    endpoint: String,
    client: reqwest::Client,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct WirePlans {
    plans: Vec<WirePlan>,
}

#[derive(Debug, Deserialize)]
struct WirePlan {
    tier: u8,
    duration_id: u8,
    duration_seconds: u64,
    price_minor_units: String,
}

impl HttpLedger {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, LedgerError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LedgerError::Unavailable(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            client,
            timeout,
        })
    }

    async fn fetch_entitlement(&self, identity: &WalletAddress) -> Result<EntitlementSnapshot, LedgerError> {
        let url = format!("{}/entitlements/{}", self.endpoint, identity);
        debug!(%identity, "querying ledger entitlement");

        let response = self.client.get(&url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(EntitlementSnapshot::NONE);
        }
        if !response.status().is_success() {
            return Err(LedgerError::Unavailable(format!(
                "entitlement query returned status {}",
                response.status()
            )));
        }
        Ok(response.json::<EntitlementSnapshot>().await?)
    }

    async fn fetch_plans(&self) -> Result<Vec<Plan>, LedgerError> {
        let url = format!("{}/plans", self.endpoint);
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(LedgerError::Unavailable(format!(
                "plan query returned status {}",
                response.status()
            )));
        }

        let wire: WirePlans = response.json().await?;
        wire.plans
            .into_iter()
            .map(|p| {
                let price = p.price_minor_units.parse::<u128>().map_err(|_| {
                    LedgerError::Malformed(format!("invalid plan price: {}", p.price_minor_units))
                })?;
                Ok(Plan {
                    tier: p.tier,
                    duration_id: p.duration_id,
                    duration_seconds: p.duration_seconds,
                    price_minor_units: price,
                })
            })
            .collect()
    }
}

#[async_trait]
impl LedgerOracle for HttpLedger {
    async fn entitlement(&self, identity: &WalletAddress) -> Result<EntitlementSnapshot, LedgerError> {
        with_deadline(self.timeout, "ledger.entitlement", self.fetch_entitlement(identity)).await?
    }

    async fn list_plans(&self) -> Result<Vec<Plan>, LedgerError> {
        with_deadline(self.timeout, "ledger.plans", self.fetch_plans()).await?
    }
}
