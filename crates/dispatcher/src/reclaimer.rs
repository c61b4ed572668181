//! 超时回收
//!
//! 周期性扫描在途任务（ASSIGNED/RUNNING），满足任一条件即回收：
//!
//! - 持有者已失联（未知、已标记 DOWN 或心跳超时），且任务分配已超过心跳超时窗口
//! - 任务分配已超过任务超时，无论持有者是否仍在心跳
//!
//! 回收的任务回到 PENDING 并递增重试次数；已达重试上限的任务直接进入 FAILED。

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use recon_core::{
    config::DispatcherConfig,
    models::{Job, Worker},
    traits::{JobRepository, WorkerRepository},
    ReconResult,
};
use recon_infrastructure::{MetricsCollector, StructuredLogger};
use tokio::sync::broadcast;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::lock::DistributedLock;

pub const RECLAIM_LOCK_KEY: &str = "job-registry:reclaim";

#[derive(Debug, Clone)]
pub struct ReclaimConfig {
    pub interval_seconds: u64,
    pub job_timeout_seconds: i64,
    pub heartbeat_timeout_seconds: i64,
    pub max_retries: i32,
    pub lock_ttl_ms: u64,
}

impl Default for ReclaimConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 5,
            job_timeout_seconds: 3600,
            heartbeat_timeout_seconds: 10,
            max_retries: 3,
            lock_ttl_ms: 30_000,
        }
    }
}

impl From<&DispatcherConfig> for ReclaimConfig {
    fn from(config: &DispatcherConfig) -> Self {
        Self {
            interval_seconds: config.reclaim_interval_seconds,
            job_timeout_seconds: config.job_timeout_seconds,
            heartbeat_timeout_seconds: config.heartbeat_timeout_seconds,
            max_retries: config.max_retries,
            lock_ttl_ms: config.schedule_lock_ttl_ms,
        }
    }
}

/// 一次扫描的结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReclaimReport {
    pub requeued: Vec<Uuid>,
    pub failed: Vec<Uuid>,
}

impl ReclaimReport {
    pub fn is_empty(&self) -> bool {
        self.requeued.is_empty() && self.failed.is_empty()
    }
}

pub struct JobReclaimer {
    jobs: Arc<dyn JobRepository>,
    workers: Arc<dyn WorkerRepository>,
    lock: DistributedLock,
    metrics: MetricsCollector,
    config: ReclaimConfig,
}

impl JobReclaimer {
    pub fn new(
        jobs: Arc<dyn JobRepository>,
        workers: Arc<dyn WorkerRepository>,
        lock: DistributedLock,
        config: ReclaimConfig,
    ) -> Self {
        Self {
            jobs,
            workers,
            lock,
            metrics: MetricsCollector::new(),
            config,
        }
    }

    /// 判断任务是否需要回收，返回回收原因
    fn reclaim_reason(
        &self,
        job: &Job,
        holder: Option<&Worker>,
        now: DateTime<Utc>,
    ) -> Option<&'static str> {
        let elapsed = job.elapsed_seconds(now)?;

        if elapsed > self.config.job_timeout_seconds {
            return Some("job_timeout");
        }

        let holder_lost = match holder {
            None => true,
            Some(worker) => {
                !worker.is_alive()
                    || worker.is_heartbeat_expired(now, self.config.heartbeat_timeout_seconds)
            }
        };
        if holder_lost && elapsed > self.config.heartbeat_timeout_seconds {
            return Some("heartbeat_timeout");
        }

        None
    }

    /// 执行一次回收扫描；其他实例正在扫描时返回空报告
    pub async fn reclaim_expired(&self, now: DateTime<Utc>) -> ReconResult<ReclaimReport> {
        let report = self
            .lock
            .with_lock(RECLAIM_LOCK_KEY, self.config.lock_ttl_ms, || {
                self.sweep(now)
            })
            .await?;
        Ok(report.unwrap_or_default())
    }

    async fn sweep(&self, now: DateTime<Utc>) -> ReconResult<ReclaimReport> {
        let mut report = ReclaimReport::default();

        for job in self.jobs.find_in_flight().await? {
            let Some(worker_id) = job.worker_id else {
                continue;
            };
            let holder = self.workers.get_by_id(worker_id).await?;
            let Some(reason) = self.reclaim_reason(&job, holder.as_ref(), now) else {
                continue;
            };

            let exhausted = job.retry_count >= self.config.max_retries;
            let changed = if exhausted {
                let message = format!("超出重试上限 {} 次: {}", self.config.max_retries, reason);
                self.jobs
                    .fail_in_flight(job.id, worker_id, &message, now)
                    .await?
            } else {
                self.jobs.requeue(job.id, worker_id).await?
            };

            if !changed {
                debug!("任务 {} 在回收前已被处理", job.id);
                continue;
            }

            StructuredLogger::log_job_reclaimed(&job, reason, exhausted);
            self.metrics.record_job_reclaimed(&job.tool_name, exhausted);
            if exhausted {
                report.failed.push(job.id);
            } else {
                report.requeued.push(job.id);
            }
        }

        Ok(report)
    }

    /// 回收循环，直到收到停止信号
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            "启动任务超时回收，间隔 {} 秒",
            self.config.interval_seconds
        );
        let mut interval =
            tokio::time::interval(Duration::from_secs(self.config.interval_seconds.max(1)));

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.reclaim_expired(Utc::now()).await {
                        Ok(report) if !report.is_empty() => info!(
                            "回收任务: 重新排队 {} 个, 失败 {} 个",
                            report.requeued.len(),
                            report.failed.len()
                        ),
                        Ok(_) => {}
                        Err(e) => error!("任务回收扫描失败: {}", e),
                    }
                }
                _ = shutdown.recv() => {
                    info!("收到停止信号，退出任务回收循环");
                    break;
                }
            }
        }
    }
}
