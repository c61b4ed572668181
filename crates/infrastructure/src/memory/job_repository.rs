use async_trait::async_trait;
use chrono::{DateTime, Utc};
use recon_core::{
    models::{Job, JobStatus},
    traits::JobRepository,
    ReconError, ReconResult,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Default)]
struct JobTable {
    jobs: HashMap<Uuid, (u64, Job)>,
    next_seq: u64,
}

/// 内存任务仓储；每个条件更新都在同一把写锁内完成检查与修改
#[derive(Debug, Clone, Default)]
pub struct InMemoryJobRepository {
    table: Arc<RwLock<JobTable>>,
}

impl InMemoryJobRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn all(&self) -> Vec<Job> {
        let table = self.table.read().await;
        let mut jobs: Vec<_> = table.jobs.values().cloned().collect();
        jobs.sort_by_key(|(seq, _)| *seq);
        jobs.into_iter().map(|(_, job)| job).collect()
    }

    /// 直接覆盖任务（测试中用于构造超时等场景）
    pub async fn put(&self, job: Job) {
        let mut table = self.table.write().await;
        let seq = match table.jobs.get(&job.id) {
            Some((seq, _)) => *seq,
            None => {
                table.next_seq += 1;
                table.next_seq
            }
        };
        table.jobs.insert(job.id, (seq, job));
    }

    async fn update_if<F>(&self, job_id: Uuid, update: F) -> bool
    where
        F: FnOnce(&mut Job) -> bool + Send,
    {
        let mut table = self.table.write().await;
        match table.jobs.get_mut(&job_id) {
            Some((_, job)) => update(job),
            None => false,
        }
    }
}

#[async_trait]
impl JobRepository for InMemoryJobRepository {
    async fn create_many(&self, jobs: &[Job]) -> ReconResult<()> {
        let mut table = self.table.write().await;
        if let Some(dup) = jobs.iter().find(|j| table.jobs.contains_key(&j.id)) {
            return Err(ReconError::DatabaseOperation(format!("任务已存在: {}", dup.id)));
        }
        for job in jobs {
            table.next_seq += 1;
            let seq = table.next_seq;
            table.jobs.insert(job.id, (seq, job.clone()));
        }
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> ReconResult<Option<Job>> {
        Ok(self.table.read().await.jobs.get(&id).map(|(_, j)| j.clone()))
    }

    async fn find_next_pending(&self, worker_type: &str) -> ReconResult<Option<Job>> {
        let table = self.table.read().await;
        Ok(table
            .jobs
            .values()
            .filter(|(_, j)| j.status == JobStatus::Pending && j.matches_worker_type(worker_type))
            .min_by_key(|(seq, j)| (j.priority, j.created_at, *seq))
            .map(|(_, j)| j.clone()))
    }

    async fn claim(&self, job_id: Uuid, worker_id: Uuid, now: DateTime<Utc>) -> ReconResult<bool> {
        Ok(self
            .update_if(job_id, |job| {
                if job.status != JobStatus::Pending {
                    return false;
                }
                job.status = JobStatus::Assigned;
                job.worker_id = Some(worker_id);
                job.started_at = Some(now);
                true
            })
            .await)
    }

    async fn mark_running(&self, job_id: Uuid, worker_id: Uuid) -> ReconResult<bool> {
        Ok(self
            .update_if(job_id, |job| {
                if job.status != JobStatus::Assigned || job.worker_id != Some(worker_id) {
                    return false;
                }
                job.status = JobStatus::Running;
                true
            })
            .await)
    }

    async fn complete(
        &self,
        job_id: Uuid,
        worker_id: Uuid,
        status: JobStatus,
        error_message: Option<&str>,
        now: DateTime<Utc>,
    ) -> ReconResult<bool> {
        if !status.is_terminal() {
            return Err(ReconError::Validation(format!(
                "任务只能完成为 DONE 或 FAILED，收到 {status}"
            )));
        }
        let error_message = error_message.map(str::to_string);
        Ok(self
            .update_if(job_id, |job| {
                if !job.is_owned_by(worker_id) {
                    return false;
                }
                job.status = status;
                job.error_message = error_message;
                job.completed_at = Some(now);
                true
            })
            .await)
    }

    async fn find_in_flight(&self) -> ReconResult<Vec<Job>> {
        let table = self.table.read().await;
        Ok(table
            .jobs
            .values()
            .filter(|(_, j)| j.status.is_in_flight())
            .map(|(_, j)| j.clone())
            .collect())
    }

    async fn requeue(&self, job_id: Uuid, expected_worker: Uuid) -> ReconResult<bool> {
        Ok(self
            .update_if(job_id, |job| {
                if !job.is_owned_by(expected_worker) {
                    return false;
                }
                job.status = JobStatus::Pending;
                job.worker_id = None;
                job.started_at = None;
                job.retry_count += 1;
                true
            })
            .await)
    }

    async fn fail_in_flight(
        &self,
        job_id: Uuid,
        expected_worker: Uuid,
        reason: &str,
        now: DateTime<Utc>,
    ) -> ReconResult<bool> {
        let reason = reason.to_string();
        Ok(self
            .update_if(job_id, |job| {
                if !job.is_owned_by(expected_worker) {
                    return false;
                }
                job.status = JobStatus::Failed;
                job.error_message = Some(reason);
                job.completed_at = Some(now);
                true
            })
            .await)
    }
}
