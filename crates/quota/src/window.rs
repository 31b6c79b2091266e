//! UTC 自然日计算

use chrono::{DateTime, Days, Utc};

/// 计数器键中的日期，如 `2025-06-01`
pub fn utc_day(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%d").to_string()
}

/// 距下一个 UTC 午夜的秒数，至少为 1
pub fn seconds_until_utc_midnight(now: DateTime<Utc>) -> u64 {
    let next_midnight = now
        .date_naive()
        .checked_add_days(Days::new(1))
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|d| d.and_utc());

    match next_midnight {
        Some(midnight) => (midnight - now).num_seconds().max(1) as u64,
        None => 1,
    }
}
