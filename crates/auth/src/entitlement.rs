//! 权益解释
//!
//! 档位代码由外部定义（如 0 = 无、1 = basic、2 = pro），这里只做过期判断，
//! 不对代码本身做任何解释或映射。

use crate::error::{AuthError, AuthResult};
use keygate_common::EntitlementSnapshot;

/// 档位 0：无权益
pub const TIER_NONE: u8 = 0;

/// 过期（`expires_at <= now`）返回 0，否则原样返回档位代码
pub fn effective_tier(tier: u8, expires_at: i64, now: i64) -> u8 {
    if expires_at <= now { TIER_NONE } else { tier }
}

/// 要求存在有效权益，返回有效档位
pub fn require_active(snapshot: &EntitlementSnapshot, now: i64) -> AuthResult<u8> {
    match effective_tier(snapshot.tier, snapshot.expires_at, now) {
        TIER_NONE => Err(AuthError::NoActiveEntitlement.record()),
        tier => Ok(tier),
    }
}
