//! 可观测性配置（日志 + OpenTelemetry 追踪）

use serde::{Deserialize, Serialize};

/// 可观测性配置
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ObservabilityConfig {
    /// 过滤级别，EnvFilter 语法（如 "info,sqlx=warn"）
    ///
    /// 设置了 RUST_LOG 时以 RUST_LOG 为准。
    #[serde(default = "default_filter_level")]
    pub filter_level: String,

    #[serde(default)]
    pub log: LogConfig,

    /// OTLP 追踪导出，需要编译时启用 `opentelemetry` feature
    #[serde(default)]
    pub tracing: TracingConfig,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            filter_level: default_filter_level(),
            log: LogConfig::default(),
            tracing: TracingConfig::default(),
        }
    }
}

/// 日志输出配置
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LogConfig {
    /// "console"（默认）或 "file"
    #[serde(default = "default_log_output")]
    pub output: String,

    /// output = "file" 时按天轮转
    #[serde(default)]
    pub rotate: bool,

    /// output = "file" 时的日志目录
    #[serde(default = "default_log_path")]
    pub path: String,

    /// "text"（默认）或 "json"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl LogConfig {
    pub fn is_json(&self) -> bool {
        self.format == "json"
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            output: default_log_output(),
            rotate: false,
            path: default_log_path(),
            format: default_log_format(),
        }
    }
}

/// OpenTelemetry 追踪配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TracingConfig {
    #[serde(default)]
    pub enable: bool,

    /// span 中的 service.name
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// OTLP gRPC 端点（Jaeger / Tempo / Collector）
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            enable: false,
            service_name: default_service_name(),
            endpoint: default_endpoint(),
        }
    }
}

impl TracingConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !self.enable {
            return Ok(());
        }
        if self.endpoint.trim().is_empty() {
            return Err("Tracing endpoint cannot be empty when tracing is enabled".to_string());
        }
        if !self.endpoint.starts_with("http://") && !self.endpoint.starts_with("https://") {
            return Err("Tracing endpoint must start with http:// or https://".to_string());
        }
        Ok(())
    }

    pub fn is_enabled(&self) -> bool {
        self.enable
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }
}

fn default_filter_level() -> String {
    "info".to_string()
}

fn default_log_output() -> String {
    "console".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_log_path() -> String {
    "logs/".to_string()
}

fn default_service_name() -> String {
    "keygate".to_string()
}

fn default_endpoint() -> String {
    "http://127.0.0.1:4317".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ObservabilityConfig::default();
        assert_eq!(config.filter_level, "info");
        assert_eq!(config.log.output, "console");
        assert!(!config.tracing.is_enabled());
        assert_eq!(config.tracing.service_name(), "keygate");
    }

    #[test]
    fn test_tracing_endpoint_checked_only_when_enabled() {
        let mut tracing = TracingConfig {
            endpoint: String::new(),
            ..Default::default()
        };
        assert!(tracing.validate().is_ok());

        tracing.enable = true;
        assert!(tracing.validate().is_err());

        tracing.endpoint = "tempo:4317".to_string();
        assert!(tracing.validate().is_err());

        tracing.endpoint = "http://tempo:4317".to_string();
        assert!(tracing.validate().is_ok());
    }

    #[test]
    fn test_partial_section_uses_defaults() {
        let config: ObservabilityConfig = toml::from_str(
            r#"
            filter_level = "debug,sqlx=warn"
            [log]
            output = "file"
            "#,
        )
        .unwrap();
        assert_eq!(config.filter_level, "debug,sqlx=warn");
        assert_eq!(config.log.output, "file");
        assert_eq!(config.log.path, "logs/");
        assert!(!config.log.rotate);
    }
}
