//! 配额作用域与调用方标签

use serde::Serialize;
use std::fmt;

const MAX_LABEL_CHARS: usize = 32;
const ANONYMOUS_LABEL: &str = "anonymous";

/// 计数维度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum QuotaScope {
    /// 已认证：按凭证哈希
    Key,
    /// 匿名：按客户端地址 + 调用方标签
    Free,
    /// 匿名：仅按客户端地址，作为外层上限
    FreeCoarse,
}

impl QuotaScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuotaScope::Key => "key",
            QuotaScope::Free => "free",
            QuotaScope::FreeCoarse => "free-coarse",
        }
    }
}

impl fmt::Display for QuotaScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 规范化调用方标签
///
/// 去空白、转小写，只保留 `[a-z0-9._-]`，最多 32 个字符；结果为空时记为 `anonymous`。
pub fn normalize_label(raw: Option<&str>) -> String {
    let label: String = raw
        .unwrap_or_default()
        .trim()
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .take(MAX_LABEL_CHARS)
        .collect();

    if label.is_empty() {
        ANONYMOUS_LABEL.to_string()
    } else {
        label
    }
}

/// `free` 作用域下的计数身份
pub fn free_identity(client: &str, label: &str) -> String {
    format!("{client}:{label}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_label() {
        assert_eq!(normalize_label(Some("  Bot1 ")), "bot1");
        assert_eq!(normalize_label(Some("my bot/v2!")), "mybotv2");
        assert_eq!(normalize_label(Some("a.b_c-d")), "a.b_c-d");
        assert_eq!(normalize_label(Some("!!!")), "anonymous");
        assert_eq!(normalize_label(None), "anonymous");
        assert_eq!(normalize_label(Some(&"x".repeat(100))).len(), 32);
    }

    #[test]
    fn test_scope_names() {
        assert_eq!(QuotaScope::FreeCoarse.to_string(), "free-coarse");
        assert_eq!(
            serde_json::to_string(&QuotaScope::FreeCoarse).unwrap(),
            "\"free-coarse\""
        );
        assert_eq!(free_identity("10.0.0.1", "bot1"), "10.0.0.1:bot1");
    }
}
