//! HTTP 处理器与路由

use crate::context::GatewayContext;
use crate::error::{ApiError, ApiResult};
use crate::extract::{CallerLabel, ClientAddress, PresentedKey, ValidJson};
use crate::ratelimit::ip_rate_limiter;
use crate::tx::build_purchase_tx;
use crate::types::{
    AdminRevokeRequest, AdminRevokeResponse, ClaimRequest, ClaimResponse, GenerateRequest,
    GenerateResponse, KeyUsageResponse, NonceRequest, NonceResponse, PlanView, PlansResponse,
    PurchaseTxRequest, PurchaseTxResponse, Usage,
};
use crate::upstream::{GenerationRequest, UpstreamError};
use axum::{
    Json, Router,
    extract::{MatchedPath, Request, State},
    http::{StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use keygate_auth::admin::revoke_payload;
use keygate_auth::entitlement::require_active;
use keygate_auth::signature;
use keygate_auth::MintRequest;
use keygate_common::LedgerOracle;
use keygate_common::config::RateLimitConfig;
use keygate_common::metrics::{RequestTimer, export_metrics, register_metrics};
use keygate_quota::{QuotaScope, normalize_label};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub type AppState = Arc<GatewayContext>;

/// 创建完整路由
pub fn create_router(ctx: AppState, rate_limit: &RateLimitConfig) -> Router {
    if let Err(e) = register_metrics() {
        warn!("Failed to register metrics: {e}");
    }

    let mut router = Router::new()
        .route("/v1/auth/nonce", post(nonce_handler))
        .route("/v1/auth/claim", post(claim_handler))
        .route("/v1/plans", get(plans_handler))
        .route("/v1/plans/purchase-tx", post(purchase_tx_handler))
        .route("/v1/generate", post(generate_handler))
        .route("/v1/key/usage", get(key_usage_handler))
        .route("/v1/admin/revoke", post(admin_revoke_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(ctx)
        .layer(middleware::from_fn(track_metrics));

    if let Some(limiter) = ip_rate_limiter(rate_limit) {
        router = router.layer(limiter);
    }
    router
}

/// 记录请求耗时与状态，路径使用路由模板
async fn track_metrics(request: Request, next: Next) -> Response {
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let timer = RequestTimer::new(request.method().as_str(), &path);

    let response = next.run(request).await;
    timer.observe(response.status().as_u16());
    response
}

async fn nonce_handler(
    State(ctx): State<AppState>,
    ValidJson(request): ValidJson<NonceRequest>,
) -> ApiResult<Json<NonceResponse>> {
    let challenge = ctx.nonces.issue_challenge(&request.address).await?;

    Ok(Json(NonceResponse {
        success: true,
        address: request.address,
        message: challenge.message,
        expires_in: challenge.expires_in,
    }))
}

async fn claim_handler(
    State(ctx): State<AppState>,
    ValidJson(request): ValidJson<ClaimRequest>,
) -> ApiResult<Json<ClaimResponse>> {
    let address = &request.address;

    // 先消费挑战：无论之后成败，这个签名都不能再用
    let record = ctx.nonces.consume_challenge(address).await?;
    let message = ctx.nonces.message(address, &record);
    signature::verify(&message, &request.signature, address)?;

    let snapshot = ctx.ledger.entitlement(address).await?;
    let tier = require_active(&snapshot, ctx.clock.unix())?;

    let issued = ctx
        .issuer
        .mint(MintRequest::new(address.clone(), tier, snapshot.expires_at).with_label(request.label))
        .await?;

    let credential = &issued.credential;
    info!(
        identity = %address,
        tier,
        revoked = issued.revoked,
        "claim succeeded"
    );

    Ok(Json(ClaimResponse {
        success: true,
        tier,
        tier_name: ctx.quota_config.tier_name(tier).to_string(),
        daily_limit: ctx.credential_limit(tier, credential.daily_limit),
        entitlement_expires_at: credential.entitlement_expires_at,
        api_key: issued.secret.into_inner(),
    }))
}

async fn plans_handler(State(ctx): State<AppState>) -> ApiResult<Json<PlansResponse>> {
    let (plans, cached) = ctx.plan_cache.plans(&ctx.ledger).await?;

    Ok(Json(PlansResponse {
        success: true,
        plans: plans
            .iter()
            .map(|plan| PlanView::new(plan, ctx.quota_config.tier_name(plan.tier)))
            .collect(),
        cached,
    }))
}

async fn purchase_tx_handler(
    State(ctx): State<AppState>,
    ValidJson(request): ValidJson<PurchaseTxRequest>,
) -> ApiResult<Json<PurchaseTxResponse>> {
    let target = ctx
        .purchase
        .as_ref()
        .ok_or_else(|| ApiError::Misconfigured("ledger.contract is not configured".to_string()))?;

    let (plans, _) = ctx.plan_cache.plans(&ctx.ledger).await?;
    let plan = plans
        .iter()
        .find(|p| p.tier == request.tier && p.duration_id == request.duration_id)
        .ok_or_else(|| {
            ApiError::InvalidInput(format!(
                "unknown plan: tier {} duration {}",
                request.tier, request.duration_id
            ))
        })?;

    let tx = build_purchase_tx(
        &target.contract,
        &target.signature,
        plan.tier,
        plan.duration_id,
        plan.price_minor_units,
    );
    debug!(tier = plan.tier, duration_id = plan.duration_id, "purchase tx composed");

    Ok(Json(PurchaseTxResponse { success: true, tx }))
}

async fn generate_handler(
    State(ctx): State<AppState>,
    PresentedKey(presented): PresentedKey,
    ClientAddress(client): ClientAddress,
    CallerLabel(label): CallerLabel,
    ValidJson(request): ValidJson<GenerateRequest>,
) -> ApiResult<Json<GenerateResponse>> {
    if !ctx.generator.is_configured() {
        return Err(ApiError::Misconfigured(
            "upstream endpoint is not configured".to_string(),
        ));
    }

    // 提交了凭证就必须可解析，不降级为匿名
    let credential = ctx.validator.resolve_presented(presented.as_deref()).await?;

    let (tier, decision) = match &credential {
        Some(credential) => {
            let limit = ctx.credential_limit(credential.tier, credential.daily_limit);
            let decision = ctx.quota.check_key(&credential.secret_hash, limit).await?;
            (ctx.quota_config.tier_name(credential.tier).to_string(), decision)
        }
        None => {
            let label = normalize_label(label.as_deref());
            let decision = ctx
                .quota
                .check_anonymous(
                    &client,
                    &label,
                    ctx.quota_config.free_daily_limit,
                    ctx.quota_config.free_coarse_daily_limit,
                )
                .await?;
            ("free".to_string(), decision)
        }
    };

    tracing::Span::current().record("tier", tier.as_str());

    let generation = GenerationRequest {
        model: ctx.model.clone(),
        prompt: request.prompt,
        max_tokens: request.max_tokens.unwrap_or(ctx.default_max_tokens),
    };
    let output = ctx.generator.generate(&generation).await.map_err(|e| match e {
        UpstreamError::NotConfigured => {
            ApiError::Misconfigured("upstream endpoint is not configured".to_string())
        }
        UpstreamError::Failed(detail) => ApiError::upstream("upstream", detail),
    })?;

    Ok(Json(GenerateResponse {
        success: true,
        output,
        tier,
        usage: Usage {
            scope: decision.scope,
            used: decision.used,
            daily_limit: decision.daily_limit,
        },
    }))
}

async fn key_usage_handler(
    State(ctx): State<AppState>,
    PresentedKey(presented): PresentedKey,
) -> ApiResult<Json<KeyUsageResponse>> {
    let raw = presented.ok_or(ApiError::Unauthorized("credential_unusable"))?;
    let credential = ctx.validator.resolve(&raw).await?;

    let daily_limit = ctx.credential_limit(credential.tier, credential.daily_limit);
    let used = ctx
        .quota
        .usage(QuotaScope::Key, &credential.secret_hash)
        .await?;

    Ok(Json(KeyUsageResponse {
        success: true,
        tier: credential.tier,
        tier_name: ctx.quota_config.tier_name(credential.tier).to_string(),
        daily_limit,
        used,
        remaining: daily_limit.saturating_sub(used),
        resets_in: ctx.quota.resets_in(),
        entitlement_expires_at: credential.entitlement_expires_at,
    }))
}

async fn admin_revoke_handler(
    State(ctx): State<AppState>,
    ValidJson(request): ValidJson<AdminRevokeRequest>,
) -> ApiResult<Json<AdminRevokeResponse>> {
    let verifier = ctx.admin.as_ref().ok_or_else(|| {
        ApiError::Misconfigured("auth.admin_shared_key is not configured".to_string())
    })?;

    verifier
        .verify(&request.credential, &revoke_payload(&request.address))
        .await?;
    let revoked = ctx.issuer.revoke_all(&request.address).await?;

    Ok(Json(AdminRevokeResponse {
        success: true,
        address: request.address,
        revoked,
    }))
}

async fn health_handler(State(ctx): State<AppState>) -> impl IntoResponse {
    let store_ok = match ctx.store.ping().await {
        Ok(()) => true,
        Err(e) => {
            warn!("Health check: ephemeral store unavailable: {e}");
            false
        }
    };
    let database_ok = match ctx.credentials.ping().await {
        Ok(()) => true,
        Err(e) => {
            warn!("Health check: credential database unavailable: {e}");
            false
        }
    };
    let healthy = store_ok && database_ok;

    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let body = json!({
        "success": healthy,
        "status": if healthy { "healthy" } else { "degraded" },
        "store": ctx.store.backend_name(),
        "store_ok": store_ok,
        "database_ok": database_ok,
        "ledger_configured": ctx.ledger.is_configured(),
        "upstream_configured": ctx.generator.is_configured(),
        "admin_enabled": ctx.admin.is_some(),
        "timestamp": ctx.clock.unix(),
    });

    (status, Json(body))
}

async fn metrics_handler() -> Response {
    match export_metrics() {
        Ok(text) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(e) => ApiError::Internal(format!("Failed to encode metrics: {e}")).into_response(),
    }
}
