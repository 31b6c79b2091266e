//! 统一响应信封中的错误
//!
//! 所有失败都渲染为 `{"success": false, "error": "<code>", ...}`。
//! 驱动层错误文本只写日志，不返回给调用方。

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use keygate_auth::AuthError;
use keygate_common::metrics::UPSTREAM_ERRORS;
use keygate_common::{LedgerError, StoreError};
use keygate_quota::{QuotaError, QuotaScope};
use serde_json::{Map, Value, json};
use thiserror::Error;
use tracing::{error, warn};

#[derive(Error, Debug)]
pub enum ApiError {
    /// 请求体或参数不合法
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// 签名、挑战或凭证认证失败，携带机器码
    #[error("Authentication failed: {0}")]
    Unauthorized(&'static str),

    #[error("No active entitlement")]
    NoActiveEntitlement,

    #[error("Daily quota exceeded ({scope}): {used}/{daily_limit}")]
    QuotaExceeded {
        scope: QuotaScope,
        daily_limit: u64,
        used: u64,
        resets_in: u64,
    },

    /// 外部协作方（ledger、存储、数据库、生成上游）失败
    #[error("Upstream failure ({collaborator}): {detail}")]
    Upstream {
        collaborator: &'static str,
        detail: String,
    },

    /// 路由依赖的外部协作方未配置
    #[error("Misconfigured: {0}")]
    Misconfigured(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn upstream(collaborator: &'static str, detail: impl ToString) -> Self {
        ApiError::Upstream {
            collaborator,
            detail: detail.to_string(),
        }
    }

    /// 稳定的机器码
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::InvalidInput(_) => "invalid_input",
            ApiError::Unauthorized(code) => *code,
            ApiError::NoActiveEntitlement => "no_active_entitlement",
            ApiError::QuotaExceeded { .. } => "quota_exceeded",
            ApiError::Upstream { .. } => "upstream_failure",
            ApiError::Misconfigured(_) => "misconfigured",
            ApiError::Internal(_) => "internal_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::NoActiveEntitlement => StatusCode::PAYMENT_REQUIRED,
            ApiError::QuotaExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Upstream { .. } => StatusCode::BAD_GATEWAY,
            ApiError::Misconfigured(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidInput(msg) => ApiError::InvalidInput(msg),
            AuthError::ChallengeExpired => ApiError::Unauthorized("challenge_expired"),
            AuthError::SignatureInvalid(_) => ApiError::Unauthorized("signature_invalid"),
            AuthError::SignatureMismatch => ApiError::Unauthorized("signature_mismatch"),
            AuthError::CredentialUnusable => ApiError::Unauthorized("credential_unusable"),
            AuthError::AdminRejected(_) => ApiError::Unauthorized("admin_rejected"),
            AuthError::NoActiveEntitlement => ApiError::NoActiveEntitlement,
            AuthError::Store(e) => e.into(),
            AuthError::Ledger(e) => e.into(),
            AuthError::Database(e) => ApiError::upstream("database", e),
            AuthError::Timeout(e) => ApiError::upstream(e.operation, e),
            AuthError::Config(msg) => ApiError::Misconfigured(msg),
            AuthError::Internal(msg) => ApiError::Internal(msg),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Config(msg) => ApiError::Misconfigured(msg),
            other => ApiError::upstream("store", other),
        }
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::NotConfigured => {
                ApiError::Misconfigured("ledger endpoint is not configured".to_string())
            }
            other => ApiError::upstream("ledger", other),
        }
    }
}

impl From<QuotaError> for ApiError {
    fn from(err: QuotaError) -> Self {
        match err {
            QuotaError::Exceeded {
                scope,
                daily_limit,
                used,
                resets_in,
            } => ApiError::QuotaExceeded {
                scope,
                daily_limit,
                used,
                resets_in,
            },
            QuotaError::Store(e) => e.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut body = Map::new();
        body.insert("success".into(), Value::Bool(false));
        body.insert("error".into(), Value::from(self.code()));

        match &self {
            ApiError::InvalidInput(msg) => {
                body.insert("message".into(), Value::from(msg.as_str()));
            }
            ApiError::NoActiveEntitlement => {
                body.insert(
                    "hint".into(),
                    Value::from("acquire an entitlement on the ledger, then request a new nonce"),
                );
            }
            ApiError::QuotaExceeded {
                scope,
                daily_limit,
                used,
                resets_in,
            } => {
                body.insert("scope".into(), json!(scope));
                body.insert("daily_limit".into(), json!(daily_limit));
                body.insert("used".into(), json!(used));
                body.insert("resets_in".into(), json!(resets_in));
            }
            ApiError::Upstream { collaborator, .. } => {
                UPSTREAM_ERRORS.with_label_values(&[collaborator]).inc();
                warn!("Upstream failure: {self}");
            }
            ApiError::Misconfigured(_) => warn!("Request hit misconfigured route: {self}"),
            ApiError::Internal(_) => error!("Internal error: {self}"),
            ApiError::Unauthorized(_) => {}
        }

        (status, Json(Value::Object(body))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
