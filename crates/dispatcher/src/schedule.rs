//! 资产组定时工作流
//!
//! 每个配置了定时的绑定在 `asset-group-workflow:<id>` 锁内判断是否到期；到期时为组内每个资产
//! 创建工作流第一阶段的任务，并记录运行时间与产生的任务。锁内会重新读取绑定，多个实例在同一个
//! 时间点只会触发一次。

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use recon_core::{
    config::DispatcherConfig,
    models::{AssetGroupWorkflow, CreateJobOptions, Job},
    traits::{AssetGroupWorkflowRepository, WorkflowRepository},
    ReconError, ReconResult,
};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::cron_utils::CronScheduler;
use crate::lock::DistributedLock;
use crate::registry::JobCreator;

pub const SCHEDULE_LOCK_PREFIX: &str = "asset-group-workflow:";

#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    pub interval_seconds: u64,
    pub lock_ttl_ms: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 60,
            lock_ttl_ms: 30_000,
        }
    }
}

impl From<&DispatcherConfig> for ScheduleConfig {
    fn from(config: &DispatcherConfig) -> Self {
        Self {
            interval_seconds: config.schedule_interval_seconds,
            lock_ttl_ms: config.schedule_lock_ttl_ms,
        }
    }
}

/// 一次运行的结果
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledRun {
    pub asset_group_workflow_id: Uuid,
    pub job_ids: Vec<Uuid>,
    pub ran_at: DateTime<Utc>,
}

pub struct AssetGroupScheduler {
    bindings: Arc<dyn AssetGroupWorkflowRepository>,
    workflows: Arc<dyn WorkflowRepository>,
    creator: Arc<dyn JobCreator>,
    lock: DistributedLock,
    config: ScheduleConfig,
}

impl AssetGroupScheduler {
    pub fn new(
        bindings: Arc<dyn AssetGroupWorkflowRepository>,
        workflows: Arc<dyn WorkflowRepository>,
        creator: Arc<dyn JobCreator>,
        lock: DistributedLock,
        config: ScheduleConfig,
    ) -> Self {
        Self {
            bindings,
            workflows,
            creator,
            lock,
            config,
        }
    }

    fn lock_key(id: Uuid) -> String {
        format!("{SCHEDULE_LOCK_PREFIX}{id}")
    }

    fn is_due(binding: &AssetGroupWorkflow, now: DateTime<Utc>) -> ReconResult<bool> {
        let Some(schedule) = &binding.schedule else {
            return Ok(false);
        };
        let cron = CronScheduler::for_schedule(schedule)?;
        let reference = binding.last_run_at.unwrap_or(binding.created_at);
        Ok(cron.should_trigger(Some(reference), now))
    }

    /// 检查全部定时绑定，触发到期的那些
    pub async fn tick(&self, now: DateTime<Utc>) -> ReconResult<Vec<ScheduledRun>> {
        let mut runs = Vec::new();

        for binding in self.bindings.list_scheduled().await? {
            match Self::is_due(&binding, now) {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e) => {
                    warn!(asset_group_workflow.id = %binding.id, "定时配置无效: {}", e);
                    continue;
                }
            }

            let fired = self
                .lock
                .with_lock(&Self::lock_key(binding.id), self.config.lock_ttl_ms, || async {
                    let Some(current) = self.bindings.get_by_id(binding.id).await? else {
                        return Ok(None);
                    };
                    if !Self::is_due(&current, now)? {
                        debug!(asset_group_workflow.id = %binding.id, "其他实例已完成本次触发");
                        return Ok(None);
                    }
                    self.fire(&current, now).await.map(Some)
                })
                .await;

            match fired {
                Ok(Some(Some(run))) => runs.push(run),
                Ok(_) => {}
                Err(e) if e.is_client_error() => {
                    error!(asset_group_workflow.id = %binding.id, "定时工作流触发失败: {}", e);
                }
                Err(e) => return Err(e),
            }
        }

        Ok(runs)
    }

    /// 立即运行，不检查定时；其他实例正在运行同一绑定时返回 `None`
    pub async fn run_now(&self, id: Uuid) -> ReconResult<Option<ScheduledRun>> {
        let binding = self
            .bindings
            .get_by_id(id)
            .await?
            .ok_or(ReconError::WorkflowNotFound { id })?;

        self.lock
            .with_lock(&Self::lock_key(id), self.config.lock_ttl_ms, || {
                self.fire(&binding, Utc::now())
            })
            .await
    }

    async fn fire(&self, binding: &AssetGroupWorkflow, now: DateTime<Utc>) -> ReconResult<ScheduledRun> {
        let workflow = self
            .workflows
            .get_by_id(binding.workflow_id)
            .await?
            .ok_or(ReconError::WorkflowNotFound {
                id: binding.workflow_id,
            })?;
        let tools = workflow.content.first_stage_tools();
        let assets = self.bindings.list_group_assets(binding.asset_group_id).await?;

        let mut jobs: Vec<Job> = Vec::new();
        if tools.is_empty() {
            warn!(workflow.id = %workflow.id, "工作流没有声明任何阶段");
        } else {
            for asset in &assets {
                let opts = CreateJobOptions {
                    workspace_id: binding.workspace_id,
                    asset_ids: vec![asset.id],
                    values: vec![asset.value.clone()],
                    workflow_id: Some(workflow.id),
                    ..Default::default()
                };
                let target_ids = asset.target_id.into_iter().collect();
                jobs.extend(
                    self.creator
                        .create_jobs_by_name(tools.clone(), target_ids, opts)
                        .await?,
                );
            }
        }

        let job_ids: Vec<Uuid> = jobs.iter().map(|j| j.id).collect();
        self.bindings
            .record_run(binding.id, job_ids.first().copied(), now)
            .await?;

        info!(
            asset_group_workflow.id = %binding.id,
            workflow.name = %workflow.name,
            assets = assets.len(),
            "资产组工作流已运行，创建 {} 个任务",
            job_ids.len()
        );

        Ok(ScheduledRun {
            asset_group_workflow_id: binding.id,
            job_ids,
            ran_at: now,
        })
    }

    /// 定时循环，直到收到停止信号
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            "启动资产组定时调度，检查间隔 {} 秒",
            self.config.interval_seconds
        );
        let mut interval =
            tokio::time::interval(Duration::from_secs(self.config.interval_seconds.max(1)));

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.tick(Utc::now()).await {
                        Ok(runs) if !runs.is_empty() => info!("本轮触发 {} 个资产组工作流", runs.len()),
                        Ok(_) => {}
                        Err(e) => error!("资产组定时调度失败: {}", e),
                    }
                }
                _ = shutdown.recv() => {
                    info!("收到停止信号，退出资产组定时调度");
                    break;
                }
            }
        }
    }
}
