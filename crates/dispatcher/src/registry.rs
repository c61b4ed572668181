//! 任务注册中心
//!
//! 负责任务的创建、按Worker类型在锁内分配，以及结果提交。任务与Worker记录只在这里被修改。

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use recon_core::{
    config::DispatcherConfig,
    models::{
        CreateJobOptions, Job, JobResultPayload, JobStatus, NormalizedResult, ResultAck,
        StoredChanges, ToolDefinition,
    },
    ReconError, ReconResult,
};
use recon_domain::{
    topics, DomainEvent, EventBus, EventPayload, EventSource, Normalizer, ParseError, ParserKind,
};
use recon_infrastructure::{MetricsCollector, StructuredLogger};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::lock::DistributedLock;
use crate::repositories::Repositories;

/// 分配锁的键前缀，后接Worker类型
pub const NEXT_LOCK_PREFIX: &str = "job-registry:next:";

/// 工作流引擎通过它创建任务
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait JobCreator: Send + Sync {
    async fn create_jobs_by_name(
        &self,
        tool_names: Vec<String>,
        target_ids: Vec<Uuid>,
        opts: CreateJobOptions,
    ) -> ReconResult<Vec<Job>>;
}

#[derive(Debug, Clone)]
pub struct RegistryConfig {
    pub next_lock_ttl_ms: u64,
}

impl From<&DispatcherConfig> for RegistryConfig {
    fn from(config: &DispatcherConfig) -> Self {
        Self {
            next_lock_ttl_ms: config.next_lock_ttl_ms,
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            next_lock_ttl_ms: 5_000,
        }
    }
}

pub struct JobRegistry {
    repos: Repositories,
    event_bus: Arc<dyn EventBus>,
    lock: DistributedLock,
    normalizer: Normalizer,
    metrics: MetricsCollector,
    config: RegistryConfig,
}

impl JobRegistry {
    pub fn new(
        repos: Repositories,
        event_bus: Arc<dyn EventBus>,
        lock: DistributedLock,
        config: RegistryConfig,
    ) -> Self {
        Self {
            repos,
            event_bus,
            lock,
            normalizer: Normalizer::new(),
            metrics: MetricsCollector::new(),
            config,
        }
    }

    /// 为每个工具创建一个 PENDING 任务
    ///
    /// `tool_ids` 为空或包含未知工具时返回校验错误，不会创建任何任务。
    pub async fn create_job(
        &self,
        tool_ids: &[Uuid],
        target_ids: &[Uuid],
        opts: CreateJobOptions,
    ) -> ReconResult<Vec<Job>> {
        let tool_ids = dedup(tool_ids);
        if tool_ids.is_empty() {
            return Err(ReconError::Validation("toolIds 不能为空".to_string()));
        }

        let tools = self.repos.tools.get_by_ids(&tool_ids).await?;
        if let Some(missing) = tool_ids.iter().find(|id| !tools.iter().any(|t| t.id == **id)) {
            return Err(ReconError::ToolNotFound {
                name: missing.to_string(),
            });
        }

        self.create_for_tools(&tools, target_ids, opts).await
    }

    /// 按工具名创建任务，校验规则同 [`JobRegistry::create_job`]
    pub async fn create_jobs_for_tools(
        &self,
        tool_names: &[String],
        target_ids: &[Uuid],
        opts: CreateJobOptions,
    ) -> ReconResult<Vec<Job>> {
        let tool_names = dedup(tool_names);
        if tool_names.is_empty() {
            return Err(ReconError::Validation("工具列表不能为空".to_string()));
        }

        let tools = self.repos.tools.get_by_names(&tool_names).await?;
        if let Some(missing) = tool_names
            .iter()
            .find(|name| !tools.iter().any(|t| &t.name == *name))
        {
            return Err(ReconError::ToolNotFound {
                name: missing.clone(),
            });
        }

        self.create_for_tools(&tools, target_ids, opts).await
    }

    async fn create_for_tools(
        &self,
        tools: &[ToolDefinition],
        target_ids: &[Uuid],
        opts: CreateJobOptions,
    ) -> ReconResult<Vec<Job>> {
        let mut jobs: Vec<Job> = tools
            .iter()
            .map(|tool| {
                let priority = opts.priority.unwrap_or_else(|| tool.effective_priority());
                let mut job = Job::new(tool.id, &tool.name, &tool.category, priority);
                job.target_ids = target_ids.to_vec();
                job.asset_ids = opts.asset_ids.clone();
                job.values = opts.values.clone();
                job.workspace_id = opts.workspace_id;
                job.workflow_id = opts.workflow_id;
                job.is_save_raw_result = opts.is_save_raw_result;
                job
            })
            .collect();
        jobs.sort_by_key(|job| job.priority);

        self.repos.jobs.create_many(&jobs).await?;

        for job in &jobs {
            StructuredLogger::log_job_created(job);
            self.metrics.record_jobs_created(&job.tool_name, 1);
        }
        Ok(jobs)
    }

    /// 为Worker分配下一个任务
    ///
    /// 在 `job-registry:next:<worker类型>` 锁内完成 "查询最早的待处理任务 + 条件更新为 ASSIGNED"。
    /// 没有任务或锁被其他实例占用时返回 `None`，Worker应退避后重试。
    #[instrument(skip(self), fields(worker.id = %worker_id))]
    pub async fn next(&self, worker_id: Uuid) -> ReconResult<Option<Job>> {
        let worker = self
            .repos
            .workers
            .get_by_id(worker_id)
            .await?
            .ok_or(ReconError::WorkerNotFound { id: worker_id })?;
        let worker_type = worker.name;
        let key = format!("{NEXT_LOCK_PREFIX}{worker_type}");

        let assigned = self
            .lock
            .with_lock(&key, self.config.next_lock_ttl_ms, || async {
                let Some(mut job) = self.repos.jobs.find_next_pending(&worker_type).await? else {
                    return Ok(None);
                };
                let now = Utc::now();
                if !self.repos.jobs.claim(job.id, worker_id, now).await? {
                    return Ok(None);
                }
                job.status = JobStatus::Assigned;
                job.worker_id = Some(worker_id);
                job.started_at = Some(now);
                Ok(Some(job))
            })
            .await?;

        match assigned {
            None => {
                debug!("分配锁被占用: {}", key);
                self.metrics.record_lock_busy(NEXT_LOCK_PREFIX);
                Ok(None)
            }
            Some(None) => Ok(None),
            Some(Some(job)) => {
                StructuredLogger::log_job_assigned(&job, worker_id, &worker_type);
                self.metrics.record_job_assigned(&worker_type);
                Ok(Some(job))
            }
        }
    }

    /// 提交任务结果
    ///
    /// - 任务已结束：不做任何修改，返回 `duplicate = true`
    /// - 任务不再属于该Worker（被回收或重新分配）：返回 [`ReconError::StaleResult`]
    /// - 否则持久化结果、结束任务并发布领域事件
    #[instrument(skip(self, payload), fields(job.id = %job_id, worker.id = %worker_id))]
    pub async fn submit_result(
        &self,
        job_id: Uuid,
        worker_id: Uuid,
        payload: JobResultPayload,
    ) -> ReconResult<ResultAck> {
        let job = self
            .repos
            .jobs
            .get_by_id(job_id)
            .await?
            .ok_or(ReconError::JobNotFound { id: job_id })?;

        if job.status.is_terminal() {
            debug!("任务已处于终态 {}，忽略重复提交", job.status);
            return Ok(ResultAck {
                job_id,
                status: job.status,
                duplicate: true,
            });
        }
        if !job.is_owned_by(worker_id) {
            warn!(current_worker = ?job.worker_id, "拒绝过期的任务结果");
            return Err(ReconError::StaleResult { job_id, worker_id });
        }

        let now = Utc::now();
        let duration = job.elapsed_seconds(now).map(|s| s as f64);

        if let Some(error) = payload.error.as_deref() {
            if !self
                .repos
                .jobs
                .complete(job_id, worker_id, JobStatus::Failed, Some(error), now)
                .await?
            {
                return self.ownership_lost(job_id, worker_id).await;
            }
            StructuredLogger::log_job_completed(&job, worker_id, false, Some(error));
            self.metrics
                .record_job_finished(&job.tool_name, false, duration);
            self.publish(topics::JOB_FAILED, job_payload(&job)).await?;
            return Ok(ResultAck {
                job_id,
                status: JobStatus::Failed,
                duplicate: false,
            });
        }

        let results = match (payload.results, payload.output.as_deref()) {
            (Some(results), _) => results,
            (None, Some(raw)) => self.normalize(&job, raw).await?,
            (None, None) => Vec::new(),
        };
        let raw_output = if job.is_save_raw_result {
            payload.output.as_deref()
        } else {
            None
        };

        let Some(changes) = self
            .repos
            .results
            .complete_with_results(&job, worker_id, &results, raw_output, now)
            .await?
        else {
            return self.ownership_lost(job_id, worker_id).await;
        };
        StructuredLogger::log_job_completed(&job, worker_id, true, None);
        self.metrics.record_job_finished(&job.tool_name, true, duration);

        self.publish_changes(&job, &changes).await?;
        self.publish(topics::JOB_COMPLETED, job_payload(&job)).await?;

        Ok(ResultAck {
            job_id,
            status: JobStatus::Done,
            duplicate: false,
        })
    }

    /// 条件更新失败后重新读取任务，判断是重复提交还是过期结果
    async fn ownership_lost(&self, job_id: Uuid, worker_id: Uuid) -> ReconResult<ResultAck> {
        match self.repos.jobs.get_by_id(job_id).await? {
            Some(job) if job.status.is_terminal() => Ok(ResultAck {
                job_id,
                status: job.status,
                duplicate: true,
            }),
            Some(_) => Err(ReconError::StaleResult { job_id, worker_id }),
            None => Err(ReconError::JobNotFound { id: job_id }),
        }
    }

    /// 用工具的解析器处理原始输出
    async fn normalize(&self, job: &Job, raw: &str) -> ReconResult<Vec<NormalizedResult>> {
        match self
            .normalizer
            .parse_for_values(&job.tool_name, raw, &job.values)
        {
            Ok(results) => Ok(results),
            Err(ParseError::UnknownTool(_)) => {
                let tool = self
                    .repos
                    .tools
                    .get_by_ids(&[job.tool_id])
                    .await?
                    .into_iter()
                    .next()
                    .ok_or_else(|| ReconError::ToolNotFound {
                        name: job.tool_name.clone(),
                    })?;
                Ok(ParserKind::from_name(&tool.parser)?.parse_for_values(raw, &job.values))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn publish_changes(&self, job: &Job, changes: &StoredChanges) -> ReconResult<()> {
        let base = job_payload(job);

        let groups = [
            (topics::ASSET_DISCOVERED, &changes.new_assets),
            (topics::ASSET_HTTP_PROBED, &changes.probed_assets),
            (topics::ASSET_PORTS_SCANNED, &changes.port_assets),
        ];
        for (topic, assets) in groups {
            if assets.is_empty() {
                continue;
            }
            let payload = EventPayload {
                asset_ids: assets.iter().map(|a| a.id).collect(),
                values: assets.iter().map(|a| a.value.clone()).collect(),
                ..base.clone()
            };
            self.publish(topic, payload).await?;
        }

        if !changes.vulnerability_ids.is_empty() {
            self.publish(topics::VULNERABILITY_DISCOVERED, base).await?;
        }
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: EventPayload) -> ReconResult<()> {
        let event = DomainEvent::from_topic(topic, payload)?;
        self.event_bus.publish(event).await
    }
}

#[async_trait]
impl JobCreator for JobRegistry {
    async fn create_jobs_by_name(
        &self,
        tool_names: Vec<String>,
        target_ids: Vec<Uuid>,
        opts: CreateJobOptions,
    ) -> ReconResult<Vec<Job>> {
        self.create_jobs_for_tools(&tool_names, &target_ids, opts)
            .await
    }
}

/// 任务自身范围的事件载荷，带上工作流来源
fn job_payload(job: &Job) -> EventPayload {
    EventPayload {
        target_ids: job.target_ids.clone(),
        asset_ids: job.asset_ids.clone(),
        workspace_id: job.workspace_id,
        values: job.values.clone(),
        source: Some(EventSource {
            job_id: job.id,
            workflow_id: job.workflow_id,
            tool_name: job.tool_name.clone(),
        }),
    }
}

fn dedup<T: Clone + Eq + std::hash::Hash>(items: &[T]) -> Vec<T> {
    let mut seen = HashSet::new();
    items
        .iter()
        .filter(|item| seen.insert((*item).clone()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::InMemoryRepositories;
    use recon_core::models::{built_in_tools, priority, Worker};
    use recon_core::traits::{JobRepository, ResultRepository, ToolRepository, WorkerRepository};
    use recon_infrastructure::memory::{InMemoryJobRepository, InMemoryResultRepository};
    use recon_infrastructure::{InMemoryEventBus, InMemoryLockStore};
    use std::collections::HashMap;

    struct Fixture {
        registry: JobRegistry,
        store: InMemoryRepositories,
        bus: Arc<InMemoryEventBus>,
        lock_store: Arc<InMemoryLockStore>,
        tools: HashMap<String, ToolDefinition>,
    }

    async fn fixture() -> Fixture {
        let store = InMemoryRepositories::new();
        let mut tools = HashMap::new();
        for tool in built_in_tools() {
            let stored = store.tools.upsert_by_name(&tool).await.unwrap();
            tools.insert(stored.name.clone(), stored);
        }
        let bus = Arc::new(InMemoryEventBus::default());
        let lock_store = Arc::new(InMemoryLockStore::new());
        let registry = JobRegistry::new(
            store.as_repositories(),
            bus.clone(),
            DistributedLock::new(lock_store.clone()),
            RegistryConfig::default(),
        );
        Fixture {
            registry,
            store,
            bus,
            lock_store,
            tools,
        }
    }

    async fn join(store: &InMemoryRepositories, name: &str) -> Uuid {
        let worker = Worker::new(name);
        store.workers.register(&worker).await.unwrap();
        worker.id
    }

    #[tokio::test]
    async fn test_create_job_validates_tools() {
        let f = fixture().await;

        let err = f
            .registry
            .create_job(&[], &[], CreateJobOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ReconError::Validation(_)));

        let err = f
            .registry
            .create_job(
                &[f.tools["subfinder"].id, Uuid::new_v4()],
                &[],
                CreateJobOptions::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ReconError::ToolNotFound { .. }));
        assert!(f.store.jobs.all().await.is_empty());
    }

    #[tokio::test]
    async fn test_create_job_orders_by_priority() {
        let f = fixture().await;
        let target = Uuid::new_v4();

        let jobs = f
            .registry
            .create_job(
                &[f.tools["nuclei"].id, f.tools["subfinder"].id],
                &[target],
                CreateJobOptions::default(),
            )
            .await
            .unwrap();

        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].tool_name, "subfinder");
        assert_eq!(jobs[0].priority, priority::HIGH);
        assert_eq!(jobs[1].priority, priority::BACKGROUND);
        assert!(jobs.iter().all(|j| j.status == JobStatus::Pending));
        assert!(jobs.iter().all(|j| j.target_ids == vec![target]));
    }

    #[tokio::test]
    async fn test_next_matches_worker_type() {
        let f = fixture().await;
        f.registry
            .create_job(&[f.tools["subfinder"].id], &[], CreateJobOptions::default())
            .await
            .unwrap();

        let prober = join(&f.store, "http_probe").await;
        assert!(f.registry.next(prober).await.unwrap().is_none());

        let worker = join(&f.store, "subdomains").await;
        let job = f.registry.next(worker).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Assigned);
        assert_eq!(job.worker_id, Some(worker));
        assert!(job.started_at.is_some());

        assert!(f.registry.next(worker).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_next_returns_empty_while_lock_is_held() {
        let f = fixture().await;
        f.registry
            .create_job(&[f.tools["subfinder"].id], &[], CreateJobOptions::default())
            .await
            .unwrap();
        let worker = join(&f.store, "subdomains").await;

        let other_instance = DistributedLock::new(f.lock_store.clone());
        let guard = other_instance
            .try_acquire(&format!("{NEXT_LOCK_PREFIX}subdomains"), 5_000)
            .await
            .unwrap()
            .unwrap();

        assert!(f.registry.next(worker).await.unwrap().is_none());
        other_instance.release(&guard).await.unwrap();
        assert!(f.registry.next(worker).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_next_for_unknown_worker() {
        let f = fixture().await;
        let err = f.registry.next(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, ReconError::WorkerNotFound { .. }));
    }

    #[tokio::test]
    async fn test_submit_raw_output_is_normalized_and_published() {
        let f = fixture().await;
        let mut events = f.bus.subscribe_all();
        let target = Uuid::new_v4();
        let workflow_id = Uuid::new_v4();
        f.registry
            .create_job(
                &[f.tools["subfinder"].id],
                &[target],
                CreateJobOptions {
                    workflow_id: Some(workflow_id),
                    values: vec!["example.com".to_string()],
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let worker = join(&f.store, "subdomains").await;
        let job = f.registry.next(worker).await.unwrap().unwrap();

        let raw = "a.example.com [A] [1.1.1.1]\nb.example.com [CNAME] [a.example.com]\n";
        let ack = f
            .registry
            .submit_result(
                job.id,
                worker,
                JobResultPayload {
                    output: Some(raw.to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(ack.status, JobStatus::Done);
        assert!(!ack.duplicate);
        assert_eq!(f.store.results.asset_count().await, 2);

        let discovered = events.recv().await.unwrap();
        assert_eq!(discovered.topic(), topics::ASSET_DISCOVERED);
        assert_eq!(discovered.payload.target_ids, vec![target]);
        let mut values = discovered.payload.values.clone();
        values.sort();
        assert_eq!(values, vec!["a.example.com", "b.example.com"]);
        assert_eq!(
            discovered.workflow_source(),
            Some((workflow_id, "subfinder"))
        );

        let completed = events.recv().await.unwrap();
        assert_eq!(completed.topic(), topics::JOB_COMPLETED);
    }

    #[tokio::test]
    async fn test_duplicate_submission_is_a_noop() {
        let f = fixture().await;
        f.registry
            .create_job(&[f.tools["subfinder"].id], &[], CreateJobOptions::default())
            .await
            .unwrap();
        let worker = join(&f.store, "subdomains").await;
        let job = f.registry.next(worker).await.unwrap().unwrap();

        let payload = JobResultPayload {
            output: Some("a.example.com [A] [1.1.1.1]".to_string()),
            ..Default::default()
        };
        f.registry
            .submit_result(job.id, worker, payload.clone())
            .await
            .unwrap();
        let second = f
            .registry
            .submit_result(job.id, worker, payload)
            .await
            .unwrap();

        assert!(second.duplicate);
        assert_eq!(second.status, JobStatus::Done);
        assert_eq!(f.store.results.asset_count().await, 1);
    }

    #[tokio::test]
    async fn test_stale_worker_result_is_rejected() {
        let f = fixture().await;
        f.registry
            .create_job(&[f.tools["subfinder"].id], &[], CreateJobOptions::default())
            .await
            .unwrap();
        let first = join(&f.store, "subdomains").await;
        let job = f.registry.next(first).await.unwrap().unwrap();

        // 模拟超时回收后被另一个Worker领取
        assert!(f.store.jobs.requeue(job.id, first).await.unwrap());
        let second = join(&f.store, "subdomains").await;
        assert_eq!(f.registry.next(second).await.unwrap().unwrap().id, job.id);

        let err = f
            .registry
            .submit_result(job.id, first, JobResultPayload::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ReconError::StaleResult { .. }));

        let ack = f
            .registry
            .submit_result(job.id, second, JobResultPayload::default())
            .await
            .unwrap();
        assert_eq!(ack.status, JobStatus::Done);
    }

    /// 在写入结果之前把任务回收，模拟回收扫描插在归属检查与写入之间
    struct ReclaimBeforeWrite {
        jobs: InMemoryJobRepository,
        inner: InMemoryResultRepository,
    }

    #[async_trait]
    impl ResultRepository for ReclaimBeforeWrite {
        async fn complete_with_results(
            &self,
            job: &Job,
            worker_id: Uuid,
            results: &[NormalizedResult],
            raw_output: Option<&str>,
            completed_at: chrono::DateTime<Utc>,
        ) -> ReconResult<Option<StoredChanges>> {
            assert!(self.jobs.requeue(job.id, worker_id).await?);
            self.inner
                .complete_with_results(job, worker_id, results, raw_output, completed_at)
                .await
        }
    }

    #[tokio::test]
    async fn test_result_racing_a_reclaim_leaves_nothing_behind() {
        let f = fixture().await;
        let mut events = f.bus.subscribe_all();
        f.registry
            .create_job(
                &[f.tools["subfinder"].id],
                &[],
                CreateJobOptions {
                    workflow_id: Some(Uuid::new_v4()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let silent = join(&f.store, "subdomains").await;
        let job = f.registry.next(silent).await.unwrap().unwrap();

        let mut repos = f.store.as_repositories();
        repos.results = Arc::new(ReclaimBeforeWrite {
            jobs: f.store.jobs.clone(),
            inner: f.store.results.clone(),
        });
        let racing = JobRegistry::new(
            repos,
            f.bus.clone(),
            DistributedLock::new(f.lock_store.clone()),
            RegistryConfig::default(),
        );

        let payload = JobResultPayload {
            output: Some("a.example.com [A] [1.1.1.1]".to_string()),
            ..Default::default()
        };
        let err = racing
            .submit_result(job.id, silent, payload.clone())
            .await
            .unwrap_err();
        assert!(matches!(err, ReconError::StaleResult { .. }));
        assert!(!f.store.results.has_results(job.id).await);
        assert_eq!(f.store.results.asset_count().await, 0);
        assert!(events.try_recv().is_err());

        let rescuer = join(&f.store, "subdomains").await;
        assert_eq!(f.registry.next(rescuer).await.unwrap().unwrap().id, job.id);
        f.registry
            .submit_result(job.id, rescuer, payload)
            .await
            .unwrap();

        let discovered = events.recv().await.unwrap();
        assert_eq!(discovered.topic(), topics::ASSET_DISCOVERED);
        assert_eq!(discovered.payload.values, vec!["a.example.com"]);
    }

    #[tokio::test]
    async fn test_error_payload_fails_job() {
        let f = fixture().await;
        let mut events = f.bus.subscribe_all();
        f.registry
            .create_job(&[f.tools["naabu"].id], &[], CreateJobOptions::default())
            .await
            .unwrap();
        let worker = join(&f.store, "naabu").await;
        let job = f.registry.next(worker).await.unwrap().unwrap();

        let ack = f
            .registry
            .submit_result(job.id, worker, JobResultPayload::failure("exit status 2", None))
            .await
            .unwrap();
        assert_eq!(ack.status, JobStatus::Failed);

        let stored = f.store.jobs.all().await.remove(0);
        assert_eq!(stored.error_message.as_deref(), Some("exit status 2"));
        assert_eq!(events.recv().await.unwrap().topic(), topics::JOB_FAILED);
    }

    #[tokio::test]
    async fn test_concurrent_pollers_never_share_a_job() {
        let f = fixture().await;
        let registry = Arc::new(f.registry);
        let job_count = 20;
        for _ in 0..job_count {
            registry
                .create_job(&[f.tools["subfinder"].id], &[], CreateJobOptions::default())
                .await
                .unwrap();
        }

        let mut handles = Vec::new();
        for _ in 0..8 {
            let worker = join(&f.store, "subdomains").await;
            let registry = registry.clone();
            let jobs = f.store.jobs.clone();
            handles.push(tokio::spawn(async move {
                let mut received = Vec::new();
                loop {
                    match registry.next(worker).await.unwrap() {
                        Some(job) => received.push(job.id),
                        None => {
                            let remaining = jobs
                                .all()
                                .await
                                .iter()
                                .any(|j| j.status == JobStatus::Pending);
                            if !remaining {
                                break;
                            }
                            tokio::task::yield_now().await;
                        }
                    }
                }
                received
            }));
        }

        let mut all = Vec::new();
        for handle in handles {
            all.extend(handle.await.unwrap());
        }
        let unique: HashSet<_> = all.iter().collect();
        assert_eq!(all.len(), job_count);
        assert_eq!(unique.len(), job_count);
    }
}
