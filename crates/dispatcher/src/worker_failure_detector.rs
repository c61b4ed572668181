use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::{debug, error, info};

use recon_core::{
    config::DispatcherConfig,
    models::{Worker, WorkerStatus},
    traits::{JobRepository, WorkerRepository},
    ReconResult,
};
use recon_infrastructure::{MetricsCollector, StructuredLogger};

/// Worker失效检测配置
#[derive(Debug, Clone)]
pub struct WorkerFailureDetectorConfig {
    /// 心跳超时时间（秒）
    pub heartbeat_timeout_seconds: i64,
    /// 检测间隔（秒）
    pub detection_interval_seconds: u64,
    /// 是否自动清理离线Worker
    pub auto_cleanup_offline_workers: bool,
    /// 离线清理阈值（秒）
    pub offline_cleanup_threshold_seconds: i64,
}

impl Default for WorkerFailureDetectorConfig {
    fn default() -> Self {
        Self {
            heartbeat_timeout_seconds: 10,
            detection_interval_seconds: 5,
            auto_cleanup_offline_workers: true,
            offline_cleanup_threshold_seconds: 300,
        }
    }
}

impl From<&DispatcherConfig> for WorkerFailureDetectorConfig {
    fn from(config: &DispatcherConfig) -> Self {
        Self {
            heartbeat_timeout_seconds: config.heartbeat_timeout_seconds,
            detection_interval_seconds: config.reclaim_interval_seconds,
            auto_cleanup_offline_workers: config.auto_cleanup_offline_workers,
            offline_cleanup_threshold_seconds: config.offline_cleanup_threshold_seconds,
        }
    }
}

/// 把心跳超时的Worker标记为 DOWN
///
/// 只修改Worker状态；其持有的任务由超时回收负责处理。
/// 离线超过清理阈值、且手上已没有在途任务的Worker会被删除。
pub struct WorkerFailureDetector {
    worker_repo: Arc<dyn WorkerRepository>,
    job_repo: Arc<dyn JobRepository>,
    metrics: MetricsCollector,
    config: WorkerFailureDetectorConfig,
}

impl WorkerFailureDetector {
    pub fn new(
        worker_repo: Arc<dyn WorkerRepository>,
        job_repo: Arc<dyn JobRepository>,
        config: Option<WorkerFailureDetectorConfig>,
    ) -> Self {
        Self {
            worker_repo,
            job_repo,
            metrics: MetricsCollector::new(),
            config: config.unwrap_or_default(),
        }
    }

    /// 检测并标记失效的Worker
    pub async fn detect_failed_workers(&self, now: DateTime<Utc>) -> ReconResult<Vec<Worker>> {
        debug!("开始检测失效的Worker");

        let seen_before = now - chrono::Duration::seconds(self.config.heartbeat_timeout_seconds);
        let stale = self.worker_repo.find_stale(seen_before).await?;
        let mut failed = Vec::with_capacity(stale.len());

        for worker in stale {
            if self.worker_repo.mark_down(worker.id).await? {
                StructuredLogger::log_worker_down(
                    worker.id,
                    &worker.name,
                    (now - worker.last_seen_at).num_seconds(),
                );
                failed.push(worker);
            }
        }

        let alive = self.worker_repo.count_alive().await?;
        self.metrics.update_alive_workers(alive as f64);

        Ok(failed)
    }

    fn offline_cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - chrono::Duration::seconds(self.config.offline_cleanup_threshold_seconds)
    }

    /// Worker是否已离线足够久，可以删除
    pub fn should_cleanup_worker(&self, worker: &Worker, now: DateTime<Utc>) -> bool {
        worker.status == WorkerStatus::Down && worker.last_seen_at < self.offline_cutoff(now)
    }

    /// 删除离线超过阈值且不持有在途任务的Worker，返回删除数量
    pub async fn cleanup_offline_workers(&self, now: DateTime<Utc>) -> ReconResult<u64> {
        let cutoff = self.offline_cutoff(now);
        let candidates = self.worker_repo.find_down_before(cutoff).await?;
        if candidates.is_empty() {
            return Ok(0);
        }

        // 仍持有在途任务的Worker留给超时回收处理
        let holders: HashSet<_> = self
            .job_repo
            .find_in_flight()
            .await?
            .into_iter()
            .filter_map(|job| job.worker_id)
            .collect();

        let mut removed = 0;
        for worker in candidates {
            if !self.should_cleanup_worker(&worker, now) || holders.contains(&worker.id) {
                continue;
            }
            if self.worker_repo.delete_offline(worker.id, cutoff).await? {
                debug!(worker_id = %worker.id, worker_name = %worker.name, "删除离线Worker");
                removed += 1;
            }
        }

        Ok(removed)
    }

    /// 检测循环，直到收到停止信号
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        info!("启动Worker失效检测循环");
        let mut interval = tokio::time::interval(Duration::from_secs(
            self.config.detection_interval_seconds.max(1),
        ));

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.detect_failed_workers(Utc::now()).await {
                        Ok(failed) if !failed.is_empty() => {
                            info!("检测到 {} 个失效的Worker", failed.len());
                        }
                        Ok(_) => {}
                        Err(e) => error!("Worker失效检测时出错: {}", e),
                    }

                    if self.config.auto_cleanup_offline_workers {
                        match self.cleanup_offline_workers(Utc::now()).await {
                            Ok(removed) if removed > 0 => info!("清理了 {} 个离线Worker", removed),
                            Ok(_) => {}
                            Err(e) => error!("清理离线Worker时出错: {}", e),
                        }
                    }
                }
                _ = shutdown.recv() => {
                    info!("收到停止信号，退出Worker失效检测循环");
                    break;
                }
            }
        }
    }
}
