//! HTTP 请求 span
//!
//! span 以路由模板而非原始路径命名，避免把钱包地址、key 之类的路径参数或
//! 扫描器的随机路径带进追踪后端。调用方只记录是否携带凭证，从不记录凭证内容；
//! `tier` 由 `/v1/generate` 在配额判定后补写。

use axum::{
    extract::MatchedPath,
    http::{HeaderMap, Request, header::AUTHORIZATION},
};
use keygate_gateway::extract::API_KEY_HEADER;
use tower_http::{
    classify::{ServerErrorsAsFailures, SharedClassifier},
    trace::{MakeSpan, TraceLayer},
};
use tracing::{Span, field, info_span};

#[cfg(feature = "opentelemetry")]
use opentelemetry::{Context, propagation::Extractor, trace::TraceContextExt};
#[cfg(feature = "opentelemetry")]
use tracing_opentelemetry::OpenTelemetrySpanExt;

/// 未命中任何路由时的 `route` 取值
pub const UNMATCHED_ROUTE: &str = "unmatched";

pub type HttpTraceLayer = TraceLayer<SharedClassifier<ServerErrorsAsFailures>, GatewayMakeSpan>;

pub fn http_trace_layer() -> HttpTraceLayer {
    TraceLayer::new_for_http().make_span_with(GatewayMakeSpan)
}

/// 调用方类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallerKind {
    /// 携带了 `Authorization` 或 `X-API-Key`
    Keyed,
    Anonymous,
}

impl CallerKind {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        if headers.contains_key(AUTHORIZATION) || headers.contains_key(API_KEY_HEADER) {
            CallerKind::Keyed
        } else {
            CallerKind::Anonymous
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CallerKind::Keyed => "keyed",
            CallerKind::Anonymous => "anonymous",
        }
    }
}

/// 请求命中的路由模板
pub fn route_template<B>(request: &Request<B>) -> &str {
    request
        .extensions()
        .get::<MatchedPath>()
        .map(MatchedPath::as_str)
        .unwrap_or(UNMATCHED_ROUTE)
}

/// 每个请求一个 `keygate.request` span
#[derive(Clone, Debug, Default)]
pub struct GatewayMakeSpan;

impl<B> MakeSpan<B> for GatewayMakeSpan {
    fn make_span(&mut self, request: &Request<B>) -> Span {
        let span = info_span!(
            "keygate.request",
            method = %request.method(),
            route = route_template(request),
            caller = CallerKind::from_headers(request.headers()).as_str(),
            tier = field::Empty,
        );

        #[cfg(feature = "opentelemetry")]
        if let Some(context) = remote_context(request.headers()) {
            span.set_parent(context);
        }

        span
    }
}

/// 取出上游传来的 W3C trace context
#[cfg(feature = "opentelemetry")]
fn remote_context(headers: &HeaderMap) -> Option<Context> {
    struct HeaderExtractor<'a>(&'a HeaderMap);

    impl Extractor for HeaderExtractor<'_> {
        fn get(&self, key: &str) -> Option<&str> {
            self.0.get(key).and_then(|value| value.to_str().ok())
        }

        fn keys(&self) -> Vec<&str> {
            self.0.keys().map(|name| name.as_str()).collect()
        }
    }

    let context = opentelemetry::global::get_text_map_propagator(|propagator| {
        propagator.extract(&HeaderExtractor(headers))
    });
    let valid = context.span().span_context().is_valid();
    valid.then_some(context)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_caller_kind_never_needs_secret() {
        let mut headers = HeaderMap::new();
        assert_eq!(CallerKind::from_headers(&headers), CallerKind::Anonymous);

        headers.insert(API_KEY_HEADER, "kg_secret".parse().unwrap());
        assert_eq!(CallerKind::from_headers(&headers), CallerKind::Keyed);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, "Bearer kg_secret".parse().unwrap());
        assert_eq!(CallerKind::from_headers(&headers).as_str(), "keyed");
    }

    #[tokio::test]
    async fn test_route_template_hides_path_parameters() {
        use axum::{Router, body::Body, middleware, routing::get};
        use tower::ServiceExt;

        let app = Router::new()
            .route("/v1/key/{address}", get(|| async { "ok" }))
            .layer(middleware::from_fn(
                |request: Request<Body>, next: middleware::Next| async move {
                    let route = route_template(&request).to_string();
                    let mut response = next.run(request).await;
                    response
                        .headers_mut()
                        .insert("x-route", route.parse().unwrap());
                    response
                },
            ));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/v1/key/0x52908400098527886e0f7030069857d2e4169ee7")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.headers()["x-route"], "/v1/key/{address}");
    }

    #[test]
    fn test_unrouted_request_uses_placeholder() {
        let request = Request::builder()
            .uri("/v1/key/0xdeadbeef/../../etc/passwd")
            .body(())
            .unwrap();
        assert_eq!(route_template(&request), UNMATCHED_ROUTE);
    }
}
