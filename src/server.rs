//! HTTP 服务生命周期
//!
//! 同时支持 HTTP 与 HTTPS 监听；收到关闭广播后停止接受新连接，
//! 等待进行中的请求完成。

use crate::error::{Error, Result};
use crate::trace::http_trace_layer;
use axum::Router;
use axum_server::{Handle, tls_rustls::RustlsConfig};
use keygate_common::KeygateConfig;
use keygate_gateway::{AppState, create_router};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

const HTTPS_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// 网关路由加上追踪与 CORS 层
pub fn build_app(ctx: AppState, config: &KeygateConfig) -> Router {
    create_router(ctx, &config.rate_limit)
        .layer(http_trace_layer())
        .layer(CorsLayer::permissive())
}

fn parse_addr(raw: &str) -> Result<SocketAddr> {
    raw.parse()
        .map_err(|e| Error::startup(format!("Invalid bind address '{raw}': {e}")))
}

/// 启动所有已配置的监听，返回各监听任务句柄
pub async fn serve(
    app: Router,
    config: &KeygateConfig,
    shutdown_tx: broadcast::Sender<()>,
) -> Result<Vec<JoinHandle<()>>> {
    let mut handles = Vec::new();

    if let Some(http) = &config.bind.http {
        let addr = parse_addr(&http.bind_addr())?;
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| Error::startup(format!("Failed to bind to address '{addr}': {e}")))?;
        info!("HTTP server listening on {}", addr);

        let app = app.clone();
        let mut shutdown_rx = shutdown_tx.subscribe();
        let shutdown_tx = shutdown_tx.clone();
        handles.push(tokio::spawn(async move {
            let server = axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                info!("HTTP server received shutdown signal");
            });
            if let Err(e) = server.await {
                error!("HTTP server error: {}", e);
                let _ = shutdown_tx.send(());
            }
            info!("HTTP server stopped");
        }));
    }

    if let Some(https) = &config.bind.https {
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

        let addr = parse_addr(&https.bind_addr())?;
        let tls_config = RustlsConfig::from_pem_file(&https.cert, &https.key)
            .await
            .map_err(|e| Error::startup(format!("Failed to load TLS certificate: {e}")))?;
        info!("HTTPS server listening on {} ({})", addr, https.domain_name);

        let handle = Handle::new();
        let mut shutdown_rx = shutdown_tx.subscribe();
        let drain = handle.clone();
        tokio::spawn(async move {
            let _ = shutdown_rx.recv().await;
            info!("HTTPS server received shutdown signal");
            drain.graceful_shutdown(Some(HTTPS_DRAIN_TIMEOUT));
        });

        let shutdown_tx = shutdown_tx.clone();
        handles.push(tokio::spawn(async move {
            let server = axum_server::bind_rustls(addr, tls_config)
                .handle(handle)
                .serve(app.into_make_service_with_connect_info::<SocketAddr>());
            if let Err(e) = server.await {
                error!("HTTPS server error: {}", e);
                let _ = shutdown_tx.send(());
            }
            info!("HTTPS server stopped");
        }));
    }

    if handles.is_empty() {
        return Err(Error::startup("No HTTP or HTTPS binding configured"));
    }
    Ok(handles)
}
