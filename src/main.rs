use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use recon_core::{config::ObservabilityConfig, AppConfig};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod app;
mod shutdown;

use app::Application;
use shutdown::ShutdownManager;

/// 应用运行模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AppMode {
    /// 编排核心：任务注册中心、触发引擎、调度与HTTP入口
    Dispatcher,
    /// 仅运行Worker
    Worker,
    /// 同一进程内运行全部组件
    All,
}

#[derive(Debug, Parser)]
#[command(name = "recon", version, about = "安全侦察任务编排系统")]
struct Cli {
    /// 配置文件路径，未指定时按默认路径查找
    #[arg(short, long, value_name = "FILE")]
    config: Option<String>,

    /// 运行模式
    #[arg(short, long, value_enum, default_value_t = AppMode::All)]
    mode: AppMode,

    /// 覆盖配置中的日志级别
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref()).with_context(|| {
        format!(
            "加载配置失败: {}",
            cli.config.as_deref().unwrap_or("<默认路径>")
        )
    })?;
    if let Some(level) = cli.log_level {
        config.observability.log_level = level;
    }

    init_logging(&config.observability)?;

    info!("启动安全侦察任务编排系统");
    info!("运行模式: {:?}", cli.mode);

    let app = Application::new(config, cli.mode).await?;
    let shutdown_manager = ShutdownManager::new();

    let app_handle = {
        let shutdown = shutdown_manager.sender();
        tokio::spawn(async move {
            if let Err(e) = app.run(shutdown).await {
                error!("应用运行失败: {e:#}");
            }
        })
    };

    shutdown::wait_for_signal().await;
    info!("收到关闭信号，开始优雅关闭...");
    shutdown_manager.shutdown();

    match tokio::time::timeout(Duration::from_secs(30), app_handle).await {
        Ok(Ok(())) => info!("应用已优雅关闭"),
        Ok(Err(e)) => error!("应用关闭时发生错误: {e}"),
        Err(_) => warn!("应用关闭超时，强制退出"),
    }

    Ok(())
}

/// 初始化日志系统，`RUST_LOG` 优先于配置中的级别
fn init_logging(config: &ObservabilityConfig) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let registry = tracing_subscriber::registry().with(env_filter);

    match config.log_format.as_str() {
        "json" => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .context("初始化JSON日志格式失败")?,
        "pretty" => registry
            .with(tracing_subscriber::fmt::layer().pretty())
            .try_init()
            .context("初始化Pretty日志格式失败")?,
        other => return Err(anyhow::anyhow!("不支持的日志格式: {other}")),
    }

    Ok(())
}
