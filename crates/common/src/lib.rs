//! keygate 基础设施库
//!
//! 为凭证签发与配额服务提供共享组件：
//! - 统一配置模型（TOML）及校验
//! - 可注入的时钟（UTC）与外部调用超时
//! - 临时存储（挑战、配额计数器、套餐缓存），支持内存与 Redis 后端
//! - 链上权益查询（只读 ledger oracle）及套餐缓存
//! - Prometheus 指标注册表

pub mod clock;
pub mod config;
pub mod deadline;
pub mod error;
pub mod identity;
pub mod ledger;
pub mod metrics;
pub mod store;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::KeygateConfig;
pub use deadline::{DeadlineExceeded, with_deadline};
pub use error::{LedgerError, StoreError};
pub use identity::{IdentityError, WalletAddress};
pub use ledger::{EntitlementSnapshot, Ledger, LedgerOracle, Plan, PlanCache};
pub use store::{EphemeralBackend, EphemeralStore};
