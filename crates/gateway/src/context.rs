//! 服务上下文
//!
//! 所有存储连接和组件在启动时显式构造，经 axum state 传给各处理器；
//! 进程退出前调用 [`GatewayContext::close`] 关闭连接池。

use crate::extract::TrustedProxies;
use crate::upstream::{ContentGenerator, HttpGenerator, UpstreamError};
use keygate_auth::{
    AdminVerifier, AuthError, CredentialIssuer, CredentialStore, CredentialValidator,
    NonceManager, SecretHasher,
};
use keygate_common::config::QuotaConfig;
use keygate_common::{
    EphemeralStore, KeygateConfig, Ledger, LedgerError, PlanCache, SharedClock, StoreError,
    SystemClock,
};
use keygate_quota::QuotaEnforcer;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum ContextError {
    #[error("Failed to open ephemeral store: {0}")]
    Store(#[from] StoreError),

    #[error("Failed to open credential store: {0}")]
    Auth(#[from] AuthError),

    #[error("Failed to set up ledger: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Failed to set up content generation upstream: {0}")]
    Upstream(#[from] UpstreamError),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// 购买交易的目标
#[derive(Debug, Clone)]
pub struct PurchaseTarget {
    pub contract: String,
    pub signature: String,
}

pub struct GatewayContext {
    pub clock: SharedClock,
    pub store: EphemeralStore,
    pub credentials: CredentialStore,
    pub nonces: NonceManager,
    pub issuer: CredentialIssuer,
    pub validator: CredentialValidator,
    pub quota: QuotaEnforcer,
    pub quota_config: QuotaConfig,
    pub ledger: Ledger,
    pub plan_cache: PlanCache,
    pub generator: Arc<dyn ContentGenerator>,
    pub default_max_tokens: u32,
    pub model: Option<String>,
    /// 未配置 `auth.admin_shared_key` 时为 `None`
    pub admin: Option<AdminVerifier>,
    /// 未配置 `ledger.contract` 时为 `None`
    pub purchase: Option<PurchaseTarget>,
    pub trusted_proxies: TrustedProxies,
}

impl std::fmt::Debug for GatewayContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayContext")
            .field("store", &self.store.backend_name())
            .field("ledger_configured", &self.ledger.is_configured())
            .field("upstream_configured", &self.generator.is_configured())
            .field("admin_enabled", &self.admin.is_some())
            .finish()
    }
}

impl GatewayContext {
    /// 按配置打开所有连接，使用系统时钟与 HTTP 生成上游
    pub async fn open(config: &KeygateConfig) -> Result<Self, ContextError> {
        let generator = HttpGenerator::from_config(&config.upstream)?;
        Self::open_with(config, SystemClock::shared(), Arc::new(generator)).await
    }

    pub async fn open_with(
        config: &KeygateConfig,
        clock: SharedClock,
        generator: Arc<dyn ContentGenerator>,
    ) -> Result<Self, ContextError> {
        let salt_source = config.auth.salt_source().ok_or_else(|| {
            ContextError::Config(
                "auth.secret_salt, auth.secret_salt_env or auth.secret_salt_file is required"
                    .to_string(),
            )
        })?;
        let hasher = SecretHasher::from_source(&salt_source)?;

        let store = EphemeralStore::from_config(&config.store).await?;
        info!(backend = store.backend_name(), "Ephemeral store opened");

        let credentials = CredentialStore::open(&config.sqlite_path, config.auth.db_timeout()).await?;

        let ledger = Ledger::from_config(&config.ledger, clock.unix())?;
        if !ledger.is_configured() {
            warn!("Ledger endpoint not configured: claim and plan routes will fail with misconfigured");
        }
        if !generator.is_configured() {
            warn!("Upstream endpoint not configured: /v1/generate will fail with misconfigured");
        }

        let admin = config
            .auth
            .admin_shared_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .map(|key| {
                AdminVerifier::new(
                    key,
                    store.clone(),
                    clock.clone(),
                    config.auth.admin_max_skew_secs,
                )
            });
        if admin.is_none() {
            warn!("auth.admin_shared_key not set: admin revoke is disabled");
        }

        let purchase = config
            .ledger
            .contract
            .as_deref()
            .filter(|c| !c.is_empty())
            .map(|contract| PurchaseTarget {
                contract: contract.to_string(),
                signature: config.ledger.purchase_signature.clone(),
            });

        Ok(Self {
            nonces: NonceManager::new(store.clone(), clock.clone(), &config.auth),
            issuer: CredentialIssuer::new(
                credentials.clone(),
                hasher.clone(),
                config.auth.secret_prefix.clone(),
                clock.clone(),
            ),
            validator: CredentialValidator::new(credentials.clone(), hasher, clock.clone()),
            quota: QuotaEnforcer::new(store.clone(), clock.clone()),
            quota_config: config.quota.clone(),
            plan_cache: PlanCache::new(store.clone()),
            ledger,
            generator,
            default_max_tokens: config.upstream.default_max_tokens,
            model: config.upstream.model.clone(),
            admin,
            purchase,
            trusted_proxies: TrustedProxies::new(&config.rate_limit.trusted_proxies),
            credentials,
            store,
            clock,
        })
    }

    /// 凭证对应的每日上限：记录上的覆盖值优先，其次档位默认值
    pub fn credential_limit(&self, tier: u8, override_limit: Option<u64>) -> u64 {
        override_limit.unwrap_or_else(|| self.quota_config.tier_limit(tier))
    }

    pub async fn close(&self) {
        self.credentials.close().await;
        info!("Gateway context closed");
    }
}
