pub mod postgres_job_repository;
pub mod postgres_result_repository;
pub mod postgres_tool_repository;
pub mod postgres_worker_repository;
pub mod postgres_workflow_repository;

pub use postgres_job_repository::PostgresJobRepository;
pub use postgres_result_repository::PostgresResultRepository;
pub use postgres_tool_repository::PostgresToolRepository;
pub use postgres_worker_repository::PostgresWorkerRepository;
pub use postgres_workflow_repository::{
    PostgresAssetGroupWorkflowRepository, PostgresWorkflowRepository,
};

use anyhow::{Context, Result};
use recon_core::config::DatabaseConfig;
use sqlx::{postgres::PgPoolOptions, PgPool, Pool, Postgres};
use std::time::Duration;
use tracing::info;

pub type DbPool = Pool<Postgres>;

const MAX_CONNECTION_LIFETIME: Duration = Duration::from_secs(1800);

/// 持有编排核心的 PostgreSQL 连接池，负责迁移与关闭
pub struct DatabaseManager {
    pool: PgPool,
}

impl DatabaseManager {
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connection_timeout())
            .idle_timeout(config.idle_timeout())
            .max_lifetime(MAX_CONNECTION_LIFETIME)
            .connect(&config.url)
            .await
            .context("无法建立PostgreSQL连接池")?;
        info!(
            max_connections = config.max_connections,
            "PostgreSQL连接池已建立"
        );
        Ok(Self { pool })
    }

    /// 复用外部创建的连接池（集成测试用）
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// 执行工具、任务、工作流与结果表的迁移
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .context("执行数据库迁移失败")?;
        info!("数据库迁移完成");
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
        info!("PostgreSQL连接池已关闭");
    }
}
