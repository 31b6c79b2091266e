//! 每日配额
//!
//! 计数器键为 `quota:{scope}:{day}:{identity}`，首次递增时设置到下一个
//! UTC 午夜的 TTL，无需额外的重置任务。请求在递增后的值不超过上限时放行；
//! 越过上限的请求被拒绝，但同样占用一次计数。

pub mod enforcer;
pub mod error;
pub mod scope;
pub mod window;

pub use enforcer::{QuotaDecision, QuotaEnforcer};
pub use error::{QuotaError, QuotaResult};
pub use scope::{QuotaScope, normalize_label};
