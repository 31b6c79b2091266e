//! 内容生成上游
//!
//! 上游接口约定：`POST {endpoint}`，请求体 `{"model", "prompt", "max_tokens"}`，
//! 响应 `{"text": "..."}` 或兼容格式 `{"choices": [{"text": "..."}]}`。

use async_trait::async_trait;
use keygate_common::config::UpstreamConfig;
use keygate_common::with_deadline;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum UpstreamError {
    #[error("Content generation upstream is not configured")]
    NotConfigured,

    #[error("Content generation failed: {0}")]
    Failed(String),
}

/// 发往上游的生成请求
#[derive(Debug, Clone, Serialize)]
pub struct GenerationRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub prompt: String,
    pub max_tokens: u32,
}

/// 内容生成接口
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    fn is_configured(&self) -> bool {
        true
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String, UpstreamError>;
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    text: Option<String>,
    #[serde(default)]
    choices: Vec<WireChoice>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    text: String,
}

/// HTTP 生成上游
#[derive(Debug, Clone)]
pub struct HttpGenerator {
    endpoint: Option<String>,
    api_key: Option<String>,
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpGenerator {
    pub fn from_config(config: &UpstreamConfig) -> Result<Self, UpstreamError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| UpstreamError::Failed(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            endpoint: config
                .endpoint
                .as_deref()
                .map(str::trim)
                .filter(|e| !e.is_empty())
                .map(str::to_string),
            api_key: config.api_key.clone(),
            client,
            timeout: config.timeout(),
        })
    }

    async fn call(&self, endpoint: &str, request: &GenerationRequest) -> Result<String, UpstreamError> {
        let mut builder = self.client.post(endpoint).json(request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| UpstreamError::Failed(e.to_string()))?;
        if !response.status().is_success() {
            return Err(UpstreamError::Failed(format!(
                "upstream returned status {}",
                response.status()
            )));
        }

        let wire: WireResponse = response
            .json()
            .await
            .map_err(|e| UpstreamError::Failed(format!("malformed upstream response: {e}")))?;

        wire.text
            .or_else(|| wire.choices.into_iter().next().map(|c| c.text))
            .ok_or_else(|| UpstreamError::Failed("upstream response has no text".to_string()))
    }
}

#[async_trait]
impl ContentGenerator for HttpGenerator {
    fn is_configured(&self) -> bool {
        self.endpoint.is_some()
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String, UpstreamError> {
        let endpoint = self.endpoint.as_deref().ok_or(UpstreamError::NotConfigured)?;
        debug!(max_tokens = request.max_tokens, "calling content generation upstream");

        with_deadline(self.timeout, "upstream.generate", self.call(endpoint, request))
            .await
            .map_err(|e| UpstreamError::Failed(e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Json, Router, http::HeaderMap, routing::post};
    use serde_json::{Value, json};

    async fn spawn_stub(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}/generate")
    }

    fn request() -> GenerationRequest {
        GenerationRequest {
            model: Some("tiny".to_string()),
            prompt: "hello".to_string(),
            max_tokens: 16,
        }
    }

    #[tokio::test]
    async fn test_generate_sends_bearer_and_reads_text() {
        let router = Router::new().route(
            "/generate",
            post(|headers: HeaderMap, Json(body): Json<Value>| async move {
                let auth = headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                Json(json!({ "text": format!("{auth}|{}", body["prompt"].as_str().unwrap()) }))
            }),
        );
        let endpoint = spawn_stub(router).await;

        let generator = HttpGenerator::from_config(&UpstreamConfig {
            endpoint: Some(endpoint),
            api_key: Some("upstream-key".to_string()),
            ..Default::default()
        })
        .unwrap();

        let text = generator.generate(&request()).await.unwrap();
        assert_eq!(text, "Bearer upstream-key|hello");
    }

    #[tokio::test]
    async fn test_choices_format_and_failure_status() {
        let ok = spawn_stub(Router::new().route(
            "/generate",
            post(|| async { Json(json!({ "choices": [{ "text": "from choices" }] })) }),
        ))
        .await;
        let generator = HttpGenerator::from_config(&UpstreamConfig {
            endpoint: Some(ok),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(generator.generate(&request()).await.unwrap(), "from choices");

        let failing = spawn_stub(Router::new().route(
            "/generate",
            post(|| async { (axum::http::StatusCode::SERVICE_UNAVAILABLE, "down") }),
        ))
        .await;
        let generator = HttpGenerator::from_config(&UpstreamConfig {
            endpoint: Some(failing),
            ..Default::default()
        })
        .unwrap();
        assert!(matches!(
            generator.generate(&request()).await,
            Err(UpstreamError::Failed(_))
        ));
    }

    #[tokio::test]
    async fn test_unconfigured() {
        let generator = HttpGenerator::from_config(&UpstreamConfig::default()).unwrap();
        assert!(!generator.is_configured());
        assert!(matches!(
            generator.generate(&request()).await,
            Err(UpstreamError::NotConfigured)
        ));
    }
}
