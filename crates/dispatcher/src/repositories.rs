use std::sync::Arc;

use recon_core::traits::{
    AssetGroupWorkflowRepository, JobRepository, ResultRepository, ToolRepository,
    WorkerRepository, WorkflowRepository,
};
use recon_infrastructure::{
    database::{
        DbPool, PostgresAssetGroupWorkflowRepository, PostgresJobRepository,
        PostgresResultRepository, PostgresToolRepository, PostgresWorkerRepository,
        PostgresWorkflowRepository,
    },
    memory::{
        InMemoryAssetGroupWorkflowRepository, InMemoryJobRepository, InMemoryResultRepository,
        InMemoryToolRepository, InMemoryWorkerRepository, InMemoryWorkflowRepository,
    },
};

/// 编排核心用到的全部仓储
#[derive(Clone)]
pub struct Repositories {
    pub tools: Arc<dyn ToolRepository>,
    pub jobs: Arc<dyn JobRepository>,
    pub workers: Arc<dyn WorkerRepository>,
    pub workflows: Arc<dyn WorkflowRepository>,
    pub asset_group_workflows: Arc<dyn AssetGroupWorkflowRepository>,
    pub results: Arc<dyn ResultRepository>,
}

impl Repositories {
    pub fn postgres(pool: DbPool) -> Self {
        Self {
            tools: Arc::new(PostgresToolRepository::new(pool.clone())),
            jobs: Arc::new(PostgresJobRepository::new(pool.clone())),
            workers: Arc::new(PostgresWorkerRepository::new(pool.clone())),
            workflows: Arc::new(PostgresWorkflowRepository::new(pool.clone())),
            asset_group_workflows: Arc::new(PostgresAssetGroupWorkflowRepository::new(
                pool.clone(),
            )),
            results: Arc::new(PostgresResultRepository::new(pool)),
        }
    }
}

/// 内存仓储的具体句柄，测试里需要直接读写底层状态
#[derive(Clone)]
pub struct InMemoryRepositories {
    pub tools: InMemoryToolRepository,
    pub jobs: InMemoryJobRepository,
    pub workers: InMemoryWorkerRepository,
    pub workflows: InMemoryWorkflowRepository,
    pub asset_group_workflows: InMemoryAssetGroupWorkflowRepository,
    pub results: InMemoryResultRepository,
}

impl Default for InMemoryRepositories {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRepositories {
    pub fn new() -> Self {
        let jobs = InMemoryJobRepository::new();
        Self {
            tools: InMemoryToolRepository::new(),
            results: InMemoryResultRepository::new(jobs.clone()),
            jobs,
            workers: InMemoryWorkerRepository::new(),
            workflows: InMemoryWorkflowRepository::new(),
            asset_group_workflows: InMemoryAssetGroupWorkflowRepository::new(),
        }
    }

    pub fn as_repositories(&self) -> Repositories {
        Repositories {
            tools: Arc::new(self.tools.clone()),
            jobs: Arc::new(self.jobs.clone()),
            workers: Arc::new(self.workers.clone()),
            workflows: Arc::new(self.workflows.clone()),
            asset_group_workflows: Arc::new(self.asset_group_workflows.clone()),
            results: Arc::new(self.results.clone()),
        }
    }
}
