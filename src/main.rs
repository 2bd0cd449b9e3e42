use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Arg, Command};
use jobrelay_core::AppConfig;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod app;
mod shutdown;

use app::Application;
use shutdown::ShutdownManager;

#[tokio::main]
async fn main() -> Result<()> {
    // 解析命令行参数
    let matches = Command::new("jobrelay")
        .version(env!("CARGO_PKG_VERSION"))
        .about("异步任务分发器：从标准输入读取任务请求，经消息总线分发给 Worker，结果写到标准输出")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("配置文件路径，未指定时依次查找 config/jobrelay.toml、jobrelay.toml、/etc/jobrelay/config.toml"),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("日志级别，覆盖配置文件")
                .value_parser(["trace", "debug", "info", "warn", "error"]),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_name("FORMAT")
                .help("日志格式，覆盖配置文件")
                .value_parser(["json", "pretty"]),
        )
        .get_matches();

    let config_path = matches.get_one::<String>("config").map(String::as_str);

    // 加载配置
    let mut config = AppConfig::load(config_path).context("加载配置失败")?;
    if let Some(level) = matches.get_one::<String>("log-level") {
        config.observability.log_level = level.clone();
    }
    if let Some(format) = matches.get_one::<String>("log-format") {
        config.observability.log_format = format.clone();
    }

    // 初始化日志系统
    init_logging(
        &config.observability.log_level,
        &config.observability.log_format,
    )?;

    info!("启动 jobrelay 任务分发器");
    if let Some(path) = config_path {
        info!("配置文件: {path}");
    }

    if let Some(addr) = config.observability.metrics_addr()? {
        init_metrics(addr)?;
    }

    // 创建应用实例
    let app = Application::new(config).await?;

    // 创建优雅关闭管理器
    let shutdown_manager = ShutdownManager::new();
    let shutdown_rx = shutdown_manager.subscribe().await;

    // 启动应用：标准输入为任务请求，标准输出为结果事件
    let input = app::spawn_line_reader(std::io::BufReader::new(std::io::stdin()))?;
    let mut app_handle =
        tokio::spawn(async move { app.run(input, tokio::io::stdout(), shutdown_rx).await });

    tokio::select! {
        _ = wait_for_shutdown_signal() => {
            info!("收到关闭信号，开始优雅关闭...");
            shutdown_manager.shutdown().await;

            // 等待应用关闭，设置超时
            match tokio::time::timeout(Duration::from_secs(30), &mut app_handle).await {
                Ok(Ok(Ok(()))) => info!("应用已优雅关闭"),
                Ok(Ok(Err(e))) => error!("应用关闭时发生错误: {e:#}"),
                Ok(Err(e)) => error!("应用任务异常退出: {e}"),
                Err(_) => warn!("应用关闭超时，强制退出"),
            }
        }
        result = &mut app_handle => {
            match result {
                Ok(Ok(())) => info!("输入已结束，应用正常退出"),
                Ok(Err(e)) => return Err(e),
                Err(e) => error!("应用任务异常退出: {e}"),
            }
        }
    }

    info!("jobrelay 已退出");
    Ok(())
}

/// 初始化日志系统。标准输出用于结果事件，日志一律写到标准错误。
fn init_logging(log_level: &str, log_format: &str) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let registry = tracing_subscriber::registry().with(env_filter);

    match log_format {
        "json" => {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(std::io::stderr),
                )
                .try_init()
                .context("初始化JSON日志格式失败")?;
        }
        "pretty" => {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .pretty()
                        .with_writer(std::io::stderr),
                )
                .try_init()
                .context("初始化Pretty日志格式失败")?;
        }
        _ => {
            return Err(anyhow::anyhow!("不支持的日志格式: {log_format}"));
        }
    }

    Ok(())
}

/// 启动 Prometheus 抓取端点
fn init_metrics(addr: SocketAddr) -> Result<()> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("启动Prometheus导出器失败: {}", e))?;

    info!("Prometheus 指标导出器已启动: {}", addr);
    Ok(())
}

/// 等待关闭信号
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("安装Ctrl+C信号处理器失败: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("安装SIGTERM信号处理器失败: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("收到Ctrl+C信号");
        },
        _ = terminate => {
            info!("收到SIGTERM信号");
        },
    }
}
