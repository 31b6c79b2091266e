//! 请求与响应结构
//!
//! 请求体在业务逻辑之前按结构反序列化并校验，不合法时直接返回 `invalid_input`。

use crate::error::ApiError;
use keygate_common::{Plan, WalletAddress};
use nonce_auth::NonceCredential;
use serde::{Deserialize, Serialize};

const MAX_SIGNATURE_CHARS: usize = 200;
const MAX_LABEL_CHARS: usize = 64;
const MAX_PROMPT_CHARS: usize = 8_000;
const MAX_TOKENS_LIMIT: u32 = 4_096;

/// 反序列化之后的字段级校验
pub trait Validate {
    fn validate(&self) -> Result<(), ApiError> {
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NonceRequest {
    pub address: WalletAddress,
}

impl Validate for NonceRequest {}

#[derive(Debug, Serialize)]
pub struct NonceResponse {
    pub success: bool,
    pub address: WalletAddress,
    pub message: String,
    pub expires_in: u64,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClaimRequest {
    pub address: WalletAddress,
    pub signature: String,
    #[serde(default)]
    pub label: Option<String>,
}

impl Validate for ClaimRequest {
    fn validate(&self) -> Result<(), ApiError> {
        if self.signature.trim().is_empty() || self.signature.len() > MAX_SIGNATURE_CHARS {
            return Err(ApiError::InvalidInput("signature: expected 65-byte hex".into()));
        }
        if self.label.as_ref().is_some_and(|l| l.chars().count() > MAX_LABEL_CHARS) {
            return Err(ApiError::InvalidInput(format!(
                "label: at most {MAX_LABEL_CHARS} characters"
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub struct ClaimResponse {
    pub success: bool,
    pub api_key: String,
    pub tier: u8,
    pub tier_name: String,
    pub daily_limit: u64,
    pub entitlement_expires_at: Option<i64>,
}

/// 对外展示的套餐；价格用十进制字符串以免丢失精度
#[derive(Debug, Serialize)]
pub struct PlanView {
    pub tier: u8,
    pub tier_name: String,
    pub duration_id: u8,
    pub duration_seconds: u64,
    pub price_minor_units: String,
}

impl PlanView {
    pub fn new(plan: &Plan, tier_name: &str) -> Self {
        Self {
            tier: plan.tier,
            tier_name: tier_name.to_string(),
            duration_id: plan.duration_id,
            duration_seconds: plan.duration_seconds,
            price_minor_units: plan.price_minor_units.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PlansResponse {
    pub success: bool,
    pub plans: Vec<PlanView>,
    pub cached: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PurchaseTxRequest {
    pub tier: u8,
    pub duration_id: u8,
}

impl Validate for PurchaseTxRequest {
    fn validate(&self) -> Result<(), ApiError> {
        if self.tier == 0 {
            return Err(ApiError::InvalidInput("tier: must be a paid tier".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub struct PurchaseTxResponse {
    pub success: bool,
    pub tx: crate::tx::PurchaseTx,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GenerateRequest {
    pub prompt: String,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

impl Validate for GenerateRequest {
    fn validate(&self) -> Result<(), ApiError> {
        if self.prompt.trim().is_empty() {
            return Err(ApiError::InvalidInput("prompt: must not be empty".into()));
        }
        if self.prompt.chars().count() > MAX_PROMPT_CHARS {
            return Err(ApiError::InvalidInput(format!(
                "prompt: at most {MAX_PROMPT_CHARS} characters"
            )));
        }
        if let Some(max_tokens) = self.max_tokens {
            if max_tokens == 0 || max_tokens > MAX_TOKENS_LIMIT {
                return Err(ApiError::InvalidInput(format!(
                    "max_tokens: must be between 1 and {MAX_TOKENS_LIMIT}"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub struct Usage {
    pub scope: keygate_quota::QuotaScope,
    pub used: u64,
    pub daily_limit: u64,
}

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub success: bool,
    pub output: String,
    pub tier: String,
    pub usage: Usage,
}

#[derive(Debug, Serialize)]
pub struct KeyUsageResponse {
    pub success: bool,
    pub tier: u8,
    pub tier_name: String,
    pub daily_limit: u64,
    pub used: u64,
    pub remaining: u64,
    pub resets_in: u64,
    pub entitlement_expires_at: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AdminRevokeRequest {
    pub address: WalletAddress,
    pub credential: NonceCredential,
}

impl Validate for AdminRevokeRequest {}

#[derive(Debug, Serialize)]
pub struct AdminRevokeResponse {
    pub success: bool,
    pub address: WalletAddress,
    pub revoked: u64,
}
