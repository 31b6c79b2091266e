//! 日志与追踪初始化
//!
//! 过滤级别 `RUST_LOG` 优先，其次 `observability.filter_level`。
//! 输出到控制台或文件（可按天轮转），格式为文本或 JSON；
//! 开启 `opentelemetry` feature 后按 `observability.tracing` 导出 span。

use crate::error::Result;
use keygate_common::KeygateConfig;
use keygate_common::config::LogConfig;
use std::fs;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{
    Layer, Registry, filter::EnvFilter, fmt, layer::Layered, prelude::*,
};

#[cfg(feature = "opentelemetry")]
use crate::error::Error;
#[cfg(feature = "opentelemetry")]
use opentelemetry::KeyValue;
#[cfg(feature = "opentelemetry")]
use opentelemetry_otlp::WithExportConfig;
#[cfg(feature = "opentelemetry")]
use opentelemetry_sdk::propagation::TraceContextPropagator;
#[cfg(feature = "opentelemetry")]
use opentelemetry_sdk::{Resource, trace::SdkTracerProvider};

const LOG_FILE_NAME: &str = "keygate.log";

type FmtLayer = Box<dyn Layer<Layered<EnvFilter, Registry>> + Send + Sync>;

/// 持有日志写线程与 tracer provider，drop 时刷新
#[derive(Default)]
pub struct ObservabilityGuard {
    #[cfg(feature = "opentelemetry")]
    tracer_provider: Option<SdkTracerProvider>,
    log_guard: Option<WorkerGuard>,
}

impl Drop for ObservabilityGuard {
    fn drop(&mut self) {
        #[cfg(feature = "opentelemetry")]
        if let Some(provider) = self.tracer_provider.take()
            && let Err(e) = provider.shutdown()
        {
            eprintln!("Failed to shutdown tracer provider: {e:?}");
        }
        // WorkerGuard 在这里随结构体一起 drop，剩余日志被刷出
        let _ = self.log_guard.take();
    }
}

pub fn init_observability(config: &KeygateConfig) -> Result<ObservabilityGuard> {
    let mut guard = ObservabilityGuard::default();
    let log_config = config.log_config();

    if config.is_console_logging() {
        let layer = fmt_layer(std::io::stdout, true, log_config);
        install(layer, &mut guard, config)?;
    } else {
        fs::create_dir_all(&log_config.path)?;
        let (writer, worker_guard) = build_file_writer(log_config, config.should_rotate_logs())?;
        guard.log_guard = Some(worker_guard);
        install(fmt_layer(writer, false, log_config), &mut guard, config)?;
    }

    Ok(guard)
}

fn env_filter(config: &KeygateConfig) -> EnvFilter {
    let directive = config.get_filter_level();
    EnvFilter::try_new(&directive).unwrap_or_else(|_| {
        println!("Failed to parse filter directive: {directive}. Falling back to default: info");
        EnvFilter::new("info")
    })
}

fn fmt_layer<W>(writer: W, use_ansi: bool, log_config: &LogConfig) -> FmtLayer
where
    W: for<'a> fmt::MakeWriter<'a> + Send + Sync + 'static,
{
    if log_config.is_json() {
        fmt::layer()
            .json()
            .with_current_span(true)
            .with_target(true)
            .with_writer(writer)
            .boxed()
    } else {
        fmt::layer()
            .with_target(true)
            .with_level(true)
            .with_line_number(true)
            .with_file(true)
            .with_ansi(use_ansi)
            .with_writer(writer)
            .boxed()
    }
}

fn install(
    fmt_layer: FmtLayer,
    #[cfg_attr(not(feature = "opentelemetry"), allow(unused_variables))]
    guard: &mut ObservabilityGuard,
    config: &KeygateConfig,
) -> Result<()> {
    let subscriber = tracing_subscriber::registry()
        .with(env_filter(config))
        .with(fmt_layer);

    #[cfg(feature = "opentelemetry")]
    {
        if let Some(provider) = build_tracing_provider(config)? {
            use opentelemetry::trace::TracerProvider as _;
            let tracer = provider.tracer(config.tracing_config().service_name().to_string());
            guard.tracer_provider = Some(provider);

            subscriber
                .with(tracing_opentelemetry::layer().with_tracer(tracer))
                .try_init()
                .ok();
            return Ok(());
        }
    }

    // 测试中可能重复初始化，忽略错误
    subscriber.try_init().ok();
    Ok(())
}

fn build_file_writer(log_config: &LogConfig, rotate: bool) -> Result<(NonBlocking, WorkerGuard)> {
    println!(
        "Logging to {}/{LOG_FILE_NAME} (rotation: {})",
        log_config.path.trim_end_matches('/'),
        if rotate { "daily" } else { "off" }
    );

    if rotate {
        let appender = tracing_appender::rolling::daily(&log_config.path, LOG_FILE_NAME);
        Ok(tracing_appender::non_blocking(appender))
    } else {
        let file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(std::path::Path::new(&log_config.path).join(LOG_FILE_NAME))?;
        Ok(tracing_appender::non_blocking(file))
    }
}

#[cfg(feature = "opentelemetry")]
fn build_tracing_provider(config: &KeygateConfig) -> Result<Option<SdkTracerProvider>> {
    let tracing_cfg = config.tracing_config();

    if !tracing_cfg.is_enabled() {
        return Ok(None);
    }
    tracing_cfg.validate().map_err(Error::validation)?;

    println!(
        "Initializing OpenTelemetry tracing: service_name={}, endpoint={}",
        tracing_cfg.service_name(),
        tracing_cfg.endpoint()
    );

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(tracing_cfg.endpoint())
        .build()
        .map_err(|e| Error::startup(format!("Failed to build OTLP exporter: {e}")))?;

    let resource = Resource::builder()
        .with_service_name(tracing_cfg.service_name().to_string())
        .with_attributes([
            KeyValue::new("service.instance.id", config.name.clone()),
            KeyValue::new("service.environment", config.env.clone()),
        ])
        .build();

    let tracer_provider = SdkTracerProvider::builder()
        .with_resource(resource)
        .with_batch_exporter(exporter)
        .build();

    opentelemetry::global::set_tracer_provider(tracer_provider.clone());
    opentelemetry::global::set_text_map_propagator(TraceContextPropagator::new());

    Ok(Some(tracer_provider))
}
