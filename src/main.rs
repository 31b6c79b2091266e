//! keygate 主程序
//!
//! 加载配置、初始化可观测性，然后启动 API 网关直到收到关闭信号。

mod cli;

use anyhow::Context;
use clap::Parser;
use keygate::observability::init_observability;
use keygate::process::{PidFileGuard, write_pid_file};
use keygate::{Error, KeygateConfig, Result, build_app, serve};
use keygate_common::config::only_warnings;
use keygate_common::metrics;
use keygate_gateway::GatewayContext;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

macro_rules! bootstrap_info {
    ($($arg:tt)*) => {
        println!($($arg)*)
    };
}

macro_rules! bootstrap_error {
    ($($arg:tt)*) => {
        eprintln!($($arg)*)
    };
}

use cli::{Cli, Commands};

/// Application launcher utilities
struct ApplicationLauncher;

fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Some(Commands::Test { config_file }) => {
            let config_path =
                ApplicationLauncher::find_config_file(config_file.as_ref().unwrap_or(&cli.config))?;
            ApplicationLauncher::test_config_file(&config_path)
        }
        None => {
            let config_path = ApplicationLauncher::find_config_file(&cli.config)?;

            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;

            runtime.block_on(ApplicationLauncher::run_application(&config_path))
        }
    }
}

impl ApplicationLauncher {
    /// Find config file with fallback locations
    fn find_config_file(provided_path: &PathBuf) -> Result<PathBuf> {
        // 显式给出的路径必须存在，不做回退
        if provided_path != Path::new("config.toml") {
            if provided_path.exists() {
                bootstrap_info!("Using provided config file: {:?}", provided_path);
                return Ok(provided_path.clone());
            }
            bootstrap_error!("Provided config file not found: {:?}", provided_path);
            return Err(Error::startup(format!(
                "Config file not found: {provided_path:?}"
            )));
        }

        let fallback_paths = [
            PathBuf::from("config.toml"),
            PathBuf::from("/etc/keygate/config.toml"),
        ];

        bootstrap_info!("Searching for config file in default locations...");
        for path in &fallback_paths {
            if path.exists() {
                bootstrap_info!("Found config file: {:?}", path);
                return Ok(path.clone());
            }
            bootstrap_info!("Config not found at: {:?}", path);
        }

        bootstrap_error!("No configuration file found!");
        bootstrap_error!("Please create a config file in one of these locations:");
        for (i, path) in fallback_paths.iter().enumerate() {
            bootstrap_error!("  {}. {:?}", i + 1, path);
        }
        bootstrap_error!("Or specify a custom path with: keygate --config <path>");

        Err(Error::startup(
            "No configuration file found. Please create one or specify path with --config",
        ))
    }

    /// 解析并校验配置文件，不启动服务
    fn test_config_file(config_path: &Path) -> Result<()> {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .init();

        let config = match KeygateConfig::from_file(config_path) {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to parse config file {:?}: {}", config_path, e);
                return Err(e.into());
            }
        };
        info!("Config file parsed: {:?}", config_path);

        if let Err(problems) = config.validate() {
            Self::report_problems(&problems, |line| warn!("{line}"), |line| error!("{line}"));
            if !only_warnings(&problems) {
                return Err(Error::validation(format!(
                    "{} problem(s) found in {:?}",
                    problems.iter().filter(|p| !p.starts_with("Warning:")).count(),
                    config_path
                )));
            }
        }

        info!("Configuration is valid");
        Ok(())
    }

    fn report_problems(
        problems: &[String],
        on_warning: impl Fn(String),
        on_error: impl Fn(String),
    ) {
        for (i, problem) in problems.iter().enumerate() {
            if problem.starts_with("Warning:") {
                on_warning(format!("  {}. {}", i + 1, problem));
            } else {
                on_error(format!("  {}. {}", i + 1, problem));
            }
        }
    }

    /// 运行应用程序的主入口
    async fn run_application(config_path: &Path) -> Result<()> {
        bootstrap_info!("Loading config file: {:?}", config_path);

        let config = KeygateConfig::from_file(config_path).inspect_err(|e| {
            bootstrap_error!("Failed to load config: {}", e);
        })?;

        // 可观测性尚未初始化，问题直接打到标准输出
        if let Err(problems) = config.validate() {
            bootstrap_error!("Configuration problems found:");
            Self::report_problems(
                &problems,
                |line| bootstrap_info!("{line}"),
                |line| bootstrap_error!("{line}"),
            );
            if !only_warnings(&problems) {
                return Err(Error::validation(
                    "fix the configuration errors above before starting",
                ));
            }
        }

        if !config.sqlite_path.exists() {
            std::fs::create_dir_all(&config.sqlite_path).with_context(|| {
                format!(
                    "Failed to create SQLite data directory: {}",
                    config.sqlite_path.display()
                )
            })?;
        }

        let _observability_guard = init_observability(&config)?;

        let pid_path = write_pid_file(config.get_pid_path().as_deref())?;
        let _pid_guard = PidFileGuard::new(pid_path);

        Self::run_gateway(config).await
    }

    async fn run_gateway(config: KeygateConfig) -> Result<()> {
        info!("Starting keygate '{}' (env: {})", config.name, config.env);

        if let Err(e) = metrics::register_metrics() {
            warn!(
                "Prometheus metrics registration warning (may already be registered): {}",
                e
            );
        }

        let ctx = Arc::new(GatewayContext::open(&config).await?);
        info!(
            "Gateway context ready (store: {}, database: {})",
            ctx.store.backend_name(),
            config.database_file().display()
        );

        let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(10);
        setup_ctrl_c_handler(shutdown_tx.clone());

        let app = build_app(ctx.clone(), &config);
        let handles = serve(app, &config, shutdown_tx.clone()).await?;
        Self::display_endpoints(&config);

        for handle in handles {
            if let Err(e) = handle.await {
                error!("Server task terminated unexpectedly: {}", e);
                let _ = shutdown_tx.send(());
            }
        }

        ctx.close().await;
        info!("keygate stopped");
        Ok(())
    }

    fn display_endpoints(config: &KeygateConfig) {
        let mut bases = Vec::new();
        if let Some(http) = &config.bind.http {
            bases.push(format!("http://{}:{}", http.ip, http.port));
        }
        if let Some(https) = &config.bind.https {
            bases.push(format!("https://{}:{}", https.domain_name, https.port));
        }

        for base in &bases {
            info!("Listening on {}", base);
            info!("  - POST {}/v1/auth/nonce", base);
            info!("  - POST {}/v1/auth/claim", base);
            info!("  - POST {}/v1/generate", base);
            info!("  - GET  {}/health", base);
        }
    }
}

/// 设置 Ctrl-C 信号处理程序
fn setup_ctrl_c_handler(shutdown_tx: tokio::sync::broadcast::Sender<()>) {
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            return;
        }
        info!("Received Ctrl-C, shutting down gracefully...");
        let _ = shutdown_tx.send(());
    });
}
