//! 内容生成上游配置

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// 上游生成接口地址；未配置时 /v1/generate 返回 misconfigured
    #[serde(default)]
    pub endpoint: Option<String>,

    /// 以 Bearer 方式发送给上游
    #[serde(default)]
    pub api_key: Option<String>,

    /// 上游模型名
    #[serde(default)]
    pub model: Option<String>,

    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            model: None,
            default_max_tokens: default_max_tokens(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl UpstreamConfig {
    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.timeout_ms)
    }

    pub fn is_configured(&self) -> bool {
        self.endpoint
            .as_deref()
            .is_some_and(|e| !e.trim().is_empty())
    }
}

fn default_max_tokens() -> u32 {
    256
}

fn default_timeout_ms() -> u64 {
    30_000
}
