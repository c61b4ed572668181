//! 数据仓储层接口定义
//!
//! 任务与Worker记录只由任务注册中心写入；工作流、资产组工作流与工具目录由CRUD层维护，
//! 编排核心只读取它们。
//!
//! 所有会改变任务状态的方法都是条件更新：只有当前状态（以及持有者）符合预期时才生效，
//! 返回值表示是否真的发生了变更。多个调度实例并发调用时由存储层保证原子性。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{
    AssetGroupWorkflow, GroupAsset, Job, JobStatus, NormalizedResult, StoredChanges,
    ToolDefinition, Worker, Workflow,
};
use crate::ReconResult;

/// 工具目录（只读）
#[async_trait]
pub trait ToolRepository: Send + Sync {
    async fn get_by_names(&self, names: &[String]) -> ReconResult<Vec<ToolDefinition>>;

    async fn get_by_ids(&self, ids: &[Uuid]) -> ReconResult<Vec<ToolDefinition>>;

    /// 某个类别下的内置工具
    async fn get_built_in_by_category(&self, category: &str)
        -> ReconResult<Option<ToolDefinition>>;

    /// 按名称upsert，返回存储中的记录（id以已存在的为准）
    async fn upsert_by_name(&self, tool: &ToolDefinition) -> ReconResult<ToolDefinition>;
}

#[async_trait]
pub trait JobRepository: Send + Sync {
    async fn create_many(&self, jobs: &[Job]) -> ReconResult<()>;

    async fn get_by_id(&self, id: Uuid) -> ReconResult<Option<Job>>;

    /// 某Worker类型可领取的最早待处理任务：priority升序，created_at升序
    async fn find_next_pending(&self, worker_type: &str) -> ReconResult<Option<Job>>;

    /// PENDING → ASSIGNED，并记录持有者与 started_at
    async fn claim(&self, job_id: Uuid, worker_id: Uuid, now: DateTime<Utc>)
        -> ReconResult<bool>;

    /// ASSIGNED → RUNNING，仅当持有者一致
    async fn mark_running(&self, job_id: Uuid, worker_id: Uuid) -> ReconResult<bool>;

    /// 在途 → DONE/FAILED，仅当持有者一致
    async fn complete(
        &self,
        job_id: Uuid,
        worker_id: Uuid,
        status: JobStatus,
        error_message: Option<&str>,
        now: DateTime<Utc>,
    ) -> ReconResult<bool>;

    /// 所有 ASSIGNED/RUNNING 任务
    async fn find_in_flight(&self) -> ReconResult<Vec<Job>>;

    /// 在途 → PENDING，清空持有者并递增重试次数
    async fn requeue(&self, job_id: Uuid, expected_worker: Uuid) -> ReconResult<bool>;

    /// 在途 → FAILED（超出重试上限）
    async fn fail_in_flight(
        &self,
        job_id: Uuid,
        expected_worker: Uuid,
        reason: &str,
        now: DateTime<Utc>,
    ) -> ReconResult<bool>;
}

#[async_trait]
pub trait WorkerRepository: Send + Sync {
    async fn register(&self, worker: &Worker) -> ReconResult<()>;

    async fn get_by_id(&self, id: Uuid) -> ReconResult<Option<Worker>>;

    /// 刷新 last_seen_at 并标记为 ALIVE
    async fn touch(&self, id: Uuid, now: DateTime<Utc>) -> ReconResult<bool>;

    /// last_seen_at 早于给定时间的存活Worker
    async fn find_stale(&self, seen_before: DateTime<Utc>) -> ReconResult<Vec<Worker>>;

    async fn mark_down(&self, id: Uuid) -> ReconResult<bool>;

    /// last_seen_at 早于给定时间的 DOWN Worker
    async fn find_down_before(&self, seen_before: DateTime<Utc>) -> ReconResult<Vec<Worker>>;

    /// 删除离线Worker：仍为 DOWN、last_seen_at 早于 `seen_before` 且不持有在途任务
    async fn delete_offline(&self, id: Uuid, seen_before: DateTime<Utc>) -> ReconResult<bool>;

    async fn count_alive(&self) -> ReconResult<i64>;
}

#[async_trait]
pub trait WorkflowRepository: Send + Sync {
    /// `content.on[kind]` 包含 `action` 的工作流（在存储端做包含查询）
    async fn find_triggered_by(&self, kind: &str, action: &str) -> ReconResult<Vec<Workflow>>;

    async fn get_by_id(&self, id: Uuid) -> ReconResult<Option<Workflow>>;
}

#[async_trait]
pub trait AssetGroupWorkflowRepository: Send + Sync {
    /// 所有配置了定时的绑定
    async fn list_scheduled(&self) -> ReconResult<Vec<AssetGroupWorkflow>>;

    async fn get_by_id(&self, id: Uuid) -> ReconResult<Option<AssetGroupWorkflow>>;

    async fn list_group_assets(&self, asset_group_id: Uuid) -> ReconResult<Vec<GroupAsset>>;

    /// 记录最近一次运行
    async fn record_run(
        &self,
        id: Uuid,
        job_id: Option<Uuid>,
        ran_at: DateTime<Utc>,
    ) -> ReconResult<()>;
}

#[async_trait]
pub trait ResultRepository: Send + Sync {
    /// 在同一事务内把任务置为 DONE 并写入结果
    ///
    /// 只有任务仍由 `worker_id` 持有且处于 ASSIGNED/RUNNING 时才会写入；否则什么都不写，
    /// 返回 `None`，由调用方区分重复提交与过期结果。
    async fn complete_with_results(
        &self,
        job: &Job,
        worker_id: Uuid,
        results: &[NormalizedResult],
        raw_output: Option<&str>,
        completed_at: DateTime<Utc>,
    ) -> ReconResult<Option<StoredChanges>>;
}
