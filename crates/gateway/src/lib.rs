//! keygate HTTP 网关
//!
//! 路由一览：
//! - `POST /v1/auth/nonce`、`POST /v1/auth/claim`：钱包签名换取凭证
//! - `GET /v1/plans`、`POST /v1/plans/purchase-tx`：套餐与未签名购买交易
//! - `POST /v1/generate`、`GET /v1/key/usage`：受配额约束的内容生成
//! - `POST /v1/admin/revoke`：管理撤销
//! - `GET /health`、`GET /metrics`

pub mod context;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod ratelimit;
pub mod tx;
pub mod types;
pub mod upstream;

pub use context::{ContextError, GatewayContext};
pub use error::{ApiError, ApiResult};
pub use handlers::{AppState, create_router};
pub use upstream::{ContentGenerator, GenerationRequest, HttpGenerator, UpstreamError};
