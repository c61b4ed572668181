use std::sync::Arc;

use anyhow::{Context, Result};
use recon_api::create_app;
use recon_core::{
    config::LockBackend,
    models::built_in_tools,
    traits::{LockStore, ToolRepository},
    AppConfig,
};
use recon_dispatcher::{Dispatcher, Repositories};
use recon_domain::EventBus;
use recon_infrastructure::{
    observability::init_metrics_exporter, DatabaseManager, InMemoryEventBus, InMemoryLockStore,
    RedisLockStore,
};
use recon_worker::WorkerService;
use tokio::{net::TcpListener, sync::broadcast};
use tracing::{info, warn};

use crate::AppMode;

/// 主应用程序
pub struct Application {
    config: AppConfig,
    mode: AppMode,
}

impl Application {
    pub async fn new(config: AppConfig, mode: AppMode) -> Result<Self> {
        info!("初始化应用程序，模式: {:?}", mode);

        if config.observability.metrics_enabled {
            init_metrics_exporter(&config.observability.metrics_bind_address)?;
        }

        Ok(Self { config, mode })
    }

    pub async fn run(self, shutdown: broadcast::Sender<()>) -> Result<()> {
        match self.mode {
            AppMode::Dispatcher => self.run_dispatcher(&shutdown).await,
            AppMode::Worker => self.run_worker(&shutdown).await,
            AppMode::All => {
                if !self.config.worker.enabled {
                    info!("Worker未启用，仅运行编排核心");
                    return self.run_dispatcher(&shutdown).await;
                }
                let (dispatcher, worker) = tokio::join!(
                    self.run_dispatcher(&shutdown),
                    self.run_worker(&shutdown)
                );
                dispatcher.and(worker)
            }
        }
    }

    async fn run_dispatcher(&self, shutdown: &broadcast::Sender<()>) -> Result<()> {
        info!("启动编排核心");

        let database = DatabaseManager::new(&self.config.database)
            .await
            .context("连接数据库失败")?;
        if self.config.database.run_migrations {
            database.migrate().await.context("数据库迁移失败")?;
        }

        let repos = Repositories::postgres(database.pool().clone());
        for tool in built_in_tools() {
            repos
                .tools
                .upsert_by_name(&tool)
                .await
                .with_context(|| format!("写入内置工具失败: {}", tool.name))?;
        }

        let lock_store: Arc<dyn LockStore> = match self.config.cache.lock_backend {
            LockBackend::Redis => Arc::new(
                RedisLockStore::connect(&self.config.cache)
                    .await
                    .context("连接Redis锁存储失败")?,
            ),
            LockBackend::Memory => {
                warn!("使用进程内锁存储，多实例部署时无法互斥");
                Arc::new(InMemoryLockStore::new())
            }
        };
        let event_bus: Arc<dyn EventBus> = Arc::new(InMemoryEventBus::default());

        let dispatcher = Dispatcher::new(&self.config, repos, lock_store, event_bus);
        let background = dispatcher.spawn_background(shutdown);

        let mut shutdown_rx = shutdown.subscribe();
        if self.config.api.enabled {
            let listener = TcpListener::bind(&self.config.api.bind_address)
                .await
                .with_context(|| format!("绑定地址失败: {}", self.config.api.bind_address))?;
            info!("HTTP服务监听于 {}", self.config.api.bind_address);

            axum::serve(listener, create_app(dispatcher, &self.config.api))
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.recv().await;
                })
                .await
                .context("HTTP服务异常退出")?;
        } else {
            warn!("API未启用，Worker无法连接到编排核心");
            let _ = shutdown_rx.recv().await;
        }

        for handle in background {
            if let Err(e) = handle.await {
                warn!("后台任务异常退出: {}", e);
            }
        }
        database.close().await;
        info!("编排核心已停止");
        Ok(())
    }

    async fn run_worker(&self, shutdown: &broadcast::Sender<()>) -> Result<()> {
        let worker = WorkerService::new(self.config.worker.clone()).context("创建Worker失败")?;
        worker.run(shutdown).await?;
        Ok(())
    }
}
