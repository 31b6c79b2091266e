//! 顶层错误类型
//!
//! 聚合启动阶段各组件的错误；请求级错误由 gateway 的 `ApiError` 处理。

use keygate_common::config::ConfigError;
use keygate_gateway::ContextError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// 配置文件读取或解析失败
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// 配置校验未通过
    #[error("Configuration validation failed: {message}")]
    Validation { message: String },

    /// 服务上下文（存储、ledger、上游）初始化失败
    #[error("Service context error: {0}")]
    Context(#[from] ContextError),

    /// 服务启动失败
    #[error("Server startup failed: {message}")]
    Startup { message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Task join error: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn startup(message: impl Into<String>) -> Self {
        Self::Startup {
            message: message.into(),
        }
    }
}
