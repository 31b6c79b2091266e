//! IP 突发限流
//!
//! 与每日配额无关，只用于抵御短时洪泛。客户端 IP 与配额使用同一套
//! [`TrustedProxies`] 解析，因此服务需以
//! `into_make_service_with_connect_info::<SocketAddr>()` 启动。

use crate::extract::TrustedProxies;
use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::Request;
use governor::middleware::NoOpMiddleware;
use keygate_common::config::RateLimitConfig;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tower_governor::{
    GovernorError, GovernorLayer, governor::GovernorConfigBuilder, key_extractor::KeyExtractor,
};
use tracing::warn;

pub type IpRateLimitLayer = GovernorLayer<TrustedProxies, NoOpMiddleware, Body>;

impl KeyExtractor for TrustedProxies {
    type Key = IpAddr;

    fn extract<T>(&self, req: &Request<T>) -> Result<Self::Key, GovernorError> {
        let peer = req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());
        self.client_ip(req.headers(), peer)
            .ok_or(GovernorError::UnableToExtractKey)
    }
}

/// 按配置创建限流层；关闭或参数非法时返回 `None`
pub fn ip_rate_limiter(config: &RateLimitConfig) -> Option<IpRateLimitLayer> {
    if !config.enabled {
        return None;
    }

    let Some(governor_conf) = GovernorConfigBuilder::default()
        .per_second(config.per_second)
        .burst_size(config.burst_size)
        .key_extractor(TrustedProxies::new(&config.trusted_proxies))
        .finish()
    else {
        warn!(
            per_second = config.per_second,
            burst_size = config.burst_size,
            "Invalid rate limit settings, IP burst limiter disabled"
        );
        return None;
    };

    Some(GovernorLayer::new(Arc::new(governor_conf)))
}
