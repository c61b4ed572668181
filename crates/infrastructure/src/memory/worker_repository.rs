use async_trait::async_trait;
use chrono::{DateTime, Utc};
use recon_core::{
    models::{Worker, WorkerStatus},
    traits::WorkerRepository,
    ReconResult,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
pub struct InMemoryWorkerRepository {
    workers: Arc<RwLock<HashMap<Uuid, Worker>>>,
}

impl InMemoryWorkerRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// 直接修改最近心跳时间（测试用）
    pub async fn set_last_seen(&self, id: Uuid, at: DateTime<Utc>) {
        if let Some(worker) = self.workers.write().await.get_mut(&id) {
            worker.last_seen_at = at;
        }
    }
}

#[async_trait]
impl WorkerRepository for InMemoryWorkerRepository {
    async fn register(&self, worker: &Worker) -> ReconResult<()> {
        self.workers.write().await.insert(worker.id, worker.clone());
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> ReconResult<Option<Worker>> {
        Ok(self.workers.read().await.get(&id).cloned())
    }

    async fn touch(&self, id: Uuid, now: DateTime<Utc>) -> ReconResult<bool> {
        let mut workers = self.workers.write().await;
        Ok(match workers.get_mut(&id) {
            Some(worker) => {
                worker.last_seen_at = now;
                worker.status = WorkerStatus::Alive;
                true
            }
            None => false,
        })
    }

    async fn find_stale(&self, seen_before: DateTime<Utc>) -> ReconResult<Vec<Worker>> {
        Ok(self
            .workers
            .read()
            .await
            .values()
            .filter(|w| w.is_alive() && w.last_seen_at < seen_before)
            .cloned()
            .collect())
    }

    async fn mark_down(&self, id: Uuid) -> ReconResult<bool> {
        let mut workers = self.workers.write().await;
        Ok(match workers.get_mut(&id) {
            Some(worker) if worker.is_alive() => {
                worker.status = WorkerStatus::Down;
                true
            }
            _ => false,
        })
    }

    async fn find_down_before(&self, seen_before: DateTime<Utc>) -> ReconResult<Vec<Worker>> {
        Ok(self
            .workers
            .read()
            .await
            .values()
            .filter(|w| w.status == WorkerStatus::Down && w.last_seen_at < seen_before)
            .cloned()
            .collect())
    }

    /// 不查看任务表，在途任务由调用方先行排除
    async fn delete_offline(&self, id: Uuid, seen_before: DateTime<Utc>) -> ReconResult<bool> {
        let mut workers = self.workers.write().await;
        let removable = workers
            .get(&id)
            .is_some_and(|w| w.status == WorkerStatus::Down && w.last_seen_at < seen_before);
        if removable {
            workers.remove(&id);
        }
        Ok(removable)
    }

    async fn count_alive(&self) -> ReconResult<i64> {
        Ok(self
            .workers
            .read()
            .await
            .values()
            .filter(|w| w.is_alive())
            .count() as i64)
    }
}
