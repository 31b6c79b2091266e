//! Prometheus 监控指标
//!
//! 指标在全局 Registry 中注册一次，由 `GET /metrics` 导出。

use lazy_static::lazy_static;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry};
use std::sync::Once;
use std::time::Instant;

static METRICS_INIT: Once = Once::new();

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // ========== 签发路径 ==========

    /// 已发出的登录挑战
    pub static ref CHALLENGES_ISSUED: IntCounterVec = IntCounterVec::new(
        Opts::new("challenges_issued_total", "Total number of sign-in challenges issued")
            .namespace("keygate"),
        &["status"]
    ).unwrap();

    /// 已签发的凭证，按档位
    pub static ref CREDENTIALS_ISSUED: IntCounterVec = IntCounterVec::new(
        Opts::new("credentials_issued_total", "Total number of credentials minted")
            .namespace("keygate"),
        &["tier"]
    ).unwrap();

    /// 被撤销的凭证，按原因（reissue / admin）
    pub static ref CREDENTIALS_REVOKED: IntCounterVec = IntCounterVec::new(
        Opts::new("credentials_revoked_total", "Total number of credentials revoked")
            .namespace("keygate"),
        &["reason"]
    ).unwrap();

    // ========== 安全 ==========

    /// 认证失败，按原因
    pub static ref AUTH_FAILURES: IntCounterVec = IntCounterVec::new(
        Opts::new("auth_failures_total", "Total number of authentication failures")
            .namespace("keygate"),
        &["reason"]
    ).unwrap();

    /// 配额拒绝，按作用域
    pub static ref QUOTA_REJECTIONS: IntCounterVec = IntCounterVec::new(
        Opts::new("quota_rejections_total", "Total number of requests rejected by daily quota")
            .namespace("keygate"),
        &["scope"]
    ).unwrap();

    // ========== 性能 ==========

    pub static ref REQUEST_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new("request_duration_seconds", "HTTP request duration in seconds")
            .namespace("keygate")
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0]),
        &["method", "path", "status"]
    ).unwrap();

    pub static ref REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("requests_total", "Total number of HTTP requests")
            .namespace("keygate"),
        &["method", "path", "status"]
    ).unwrap();

    /// 外部协作方调用失败（ledger / store / database / upstream）
    pub static ref UPSTREAM_ERRORS: IntCounterVec = IntCounterVec::new(
        Opts::new("upstream_errors_total", "Total number of failed calls to external collaborators")
            .namespace("keygate"),
        &["collaborator"]
    ).unwrap();
}

/// 注册所有指标，可重复调用
pub fn register_metrics() -> Result<(), prometheus::Error> {
    let mut result = Ok(());

    METRICS_INIT.call_once(|| {
        let register_result = (|| {
            REGISTRY.register(Box::new(CHALLENGES_ISSUED.clone()))?;
            REGISTRY.register(Box::new(CREDENTIALS_ISSUED.clone()))?;
            REGISTRY.register(Box::new(CREDENTIALS_REVOKED.clone()))?;
            REGISTRY.register(Box::new(AUTH_FAILURES.clone()))?;
            REGISTRY.register(Box::new(QUOTA_REJECTIONS.clone()))?;
            REGISTRY.register(Box::new(REQUEST_DURATION.clone()))?;
            REGISTRY.register(Box::new(REQUESTS_TOTAL.clone()))?;
            REGISTRY.register(Box::new(UPSTREAM_ERRORS.clone()))?;
            Ok::<(), prometheus::Error>(())
        })();

        if let Err(e) = register_result {
            result = Err(e);
        }
    });

    result
}

/// HTTP 请求计时器
pub struct RequestTimer {
    start: Instant,
    method: String,
    path: String,
}

impl RequestTimer {
    /// `path` 应为路由模板而不是原始 URI，避免标签基数失控
    pub fn new(method: &str, path: &str) -> Self {
        Self {
            start: Instant::now(),
            method: method.to_string(),
            path: path.to_string(),
        }
    }

    pub fn observe(self, status: u16) {
        let duration = self.start.elapsed().as_secs_f64();
        let status = status.to_string();

        REQUEST_DURATION
            .with_label_values(&[&self.method, &self.path, &status])
            .observe(duration);
        REQUESTS_TOTAL
            .with_label_values(&[&self.method, &self.path, &status])
            .inc();
    }
}

/// 导出 Prometheus 文本格式
pub fn export_metrics() -> Result<String, prometheus::Error> {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&REGISTRY.gather(), &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_is_idempotent() {
        assert!(register_metrics().is_ok());
        assert!(register_metrics().is_ok());
    }

    #[test]
    fn test_request_timer() {
        let _ = register_metrics();

        let before = REQUESTS_TOTAL
            .with_label_values(&["GET", "/health", "200"])
            .get();
        RequestTimer::new("GET", "/health").observe(200);
        let after = REQUESTS_TOTAL
            .with_label_values(&["GET", "/health", "200"])
            .get();

        assert_eq!(after, before + 1);
    }

    #[test]
    fn test_export_metrics() {
        let _ = register_metrics();
        QUOTA_REJECTIONS.with_label_values(&["free-coarse"]).inc();

        let output = export_metrics().unwrap();
        assert!(output.contains("keygate_quota_rejections_total"));
        assert!(output.contains("free-coarse"));
    }
}
