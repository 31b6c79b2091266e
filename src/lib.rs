//! # keygate
//!
//! 钱包签名换取 API Key 的网关进程：配置加载、可观测性、PID 文件与 HTTP 服务生命周期。

pub mod error;
pub mod observability;
pub mod process;
pub mod server;
pub mod trace;

pub use error::{Error, Result};
pub use keygate_common::KeygateConfig;
pub use server::{build_app, serve};
