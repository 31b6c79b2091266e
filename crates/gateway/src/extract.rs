//! 自定义提取器

use crate::error::ApiError;
use crate::handlers::AppState;
use crate::types::Validate;
use axum::{
    Json,
    extract::{ConnectInfo, FromRequest, FromRequestParts, Request, rejection::JsonRejection},
    http::{Extensions, HeaderMap, request::Parts},
};
use serde::de::DeserializeOwned;
use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

pub const API_KEY_HEADER: &str = "x-api-key";
pub const CALLER_LABEL_HEADER: &str = "x-caller-label";
pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

/// 反序列化并校验的 JSON 请求体
#[derive(Debug)]
pub struct ValidJson<T>(pub T);

impl<S, T> FromRequest<S> for ValidJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection: JsonRejection| ApiError::InvalidInput(rejection.body_text()))?;
        value.validate()?;
        Ok(ValidJson(value))
    }
}

/// 请求中提交的凭证：`Authorization: Bearer <secret>` 或 `X-API-Key`
///
/// 只要头部存在就视为提交了凭证，即使格式不对；由校验器拒绝。
#[derive(Debug, Clone, Default)]
pub struct PresentedKey(pub Option<String>);

fn presented_key(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers.get(axum::http::header::AUTHORIZATION) {
        let raw = value.to_str().unwrap_or_default().trim();
        let secret = raw
            .strip_prefix("Bearer ")
            .or_else(|| raw.strip_prefix("bearer "))
            .unwrap_or(raw);
        return Some(secret.trim().to_string());
    }

    headers
        .get(API_KEY_HEADER)
        .map(|value| value.to_str().unwrap_or_default().trim().to_string())
}

impl<S: Send + Sync> FromRequestParts<S> for PresentedKey {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(PresentedKey(presented_key(&parts.headers)))
    }
}

/// 可信反向代理列表
///
/// 连接对端可信时，从右向左跳过 `X-Forwarded-For` 中的可信代理，取第一个不可信的地址；
/// 对端不可信时忽略转发头。配额与突发限流共用这一解析。
#[derive(Debug, Clone, Default)]
pub struct TrustedProxies(Arc<[IpAddr]>);

impl TrustedProxies {
    pub fn new(proxies: &[IpAddr]) -> Self {
        Self(proxies.into())
    }

    pub fn is_trusted(&self, ip: &IpAddr) -> bool {
        self.0.contains(ip)
    }

    pub fn client_ip(&self, headers: &HeaderMap, peer: Option<IpAddr>) -> Option<IpAddr> {
        let peer = peer?;
        if !self.is_trusted(&peer) {
            return Some(peer);
        }

        let Some(forwarded) = headers
            .get(FORWARDED_FOR_HEADER)
            .and_then(|v| v.to_str().ok())
        else {
            return Some(peer);
        };

        let mut client = peer;
        for hop in forwarded.rsplit(',') {
            // 无法解析的一跳之前的内容都不可信
            let Ok(ip) = hop.trim().parse::<IpAddr>() else {
                break;
            };
            client = ip;
            if !self.is_trusted(&ip) {
                break;
            }
        }
        Some(client)
    }
}

fn connect_peer(extensions: &Extensions) -> Option<IpAddr> {
    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
}

/// 客户端地址，经 [`TrustedProxies`] 解析；没有连接信息时为 `"unknown"`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientAddress(pub String);

fn client_address(parts: &Parts, proxies: &TrustedProxies) -> String {
    proxies
        .client_ip(&parts.headers, connect_peer(&parts.extensions))
        .map(|ip| ip.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

impl FromRequestParts<AppState> for ClientAddress {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        Ok(ClientAddress(client_address(parts, &state.trusted_proxies)))
    }
}

/// 匿名调用方标签（未规范化）
#[derive(Debug, Clone, Default)]
pub struct CallerLabel(pub Option<String>);

impl<S: Send + Sync> FromRequestParts<S> for CallerLabel {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(CallerLabel(
            parts
                .headers
                .get(CALLER_LABEL_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
        ))
    }
}
