//! 编排核心
//!
//! 组装分布式锁、任务注册中心、超时回收、Worker失效检测、Worker会话、
//! 工作流触发引擎和资产组定时调度。

pub mod cron_utils;
pub mod lock;
pub mod reclaimer;
pub mod registry;
pub mod repositories;
pub mod schedule;
pub mod trigger;
pub mod worker_failure_detector;
pub mod worker_sessions;

use std::sync::Arc;

use recon_core::{traits::LockStore, AppConfig};
use recon_domain::EventBus;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

pub use cron_utils::CronScheduler;
pub use lock::{DistributedLock, LockGuard};
pub use reclaimer::{JobReclaimer, ReclaimConfig, ReclaimReport};
pub use registry::{JobCreator, JobRegistry, RegistryConfig};
pub use repositories::{InMemoryRepositories, Repositories};
pub use schedule::{AssetGroupScheduler, ScheduleConfig, ScheduledRun};
pub use trigger::WorkflowTriggerEngine;
pub use worker_failure_detector::{WorkerFailureDetector, WorkerFailureDetectorConfig};
pub use worker_sessions::{hash_api_key, TokenService, WorkerIdentity, WorkerSessions};

/// 编排核心的全部服务，由HTTP层和后台循环共享
#[derive(Clone)]
pub struct Dispatcher {
    pub registry: Arc<JobRegistry>,
    pub sessions: Arc<WorkerSessions>,
    pub trigger: Arc<WorkflowTriggerEngine>,
    pub scheduler: Arc<AssetGroupScheduler>,
    pub reclaimer: Arc<JobReclaimer>,
    pub failure_detector: Arc<WorkerFailureDetector>,
    pub event_bus: Arc<dyn EventBus>,
}

impl Dispatcher {
    pub fn new(
        config: &AppConfig,
        repos: Repositories,
        lock_store: Arc<dyn LockStore>,
        event_bus: Arc<dyn EventBus>,
    ) -> Self {
        let lock = DistributedLock::new(lock_store);
        let registry = Arc::new(JobRegistry::new(
            repos.clone(),
            event_bus.clone(),
            lock.clone(),
            RegistryConfig::from(&config.dispatcher),
        ));
        let creator: Arc<dyn JobCreator> = registry.clone();

        Self {
            sessions: Arc::new(WorkerSessions::new(
                repos.workers.clone(),
                repos.jobs.clone(),
                &config.auth,
            )),
            trigger: Arc::new(WorkflowTriggerEngine::new(
                repos.workflows.clone(),
                creator.clone(),
            )),
            scheduler: Arc::new(AssetGroupScheduler::new(
                repos.asset_group_workflows.clone(),
                repos.workflows.clone(),
                creator,
                lock.clone(),
                ScheduleConfig::from(&config.dispatcher),
            )),
            reclaimer: Arc::new(JobReclaimer::new(
                repos.jobs.clone(),
                repos.workers.clone(),
                lock,
                ReclaimConfig::from(&config.dispatcher),
            )),
            failure_detector: Arc::new(WorkerFailureDetector::new(
                repos.workers.clone(),
                repos.jobs.clone(),
                Some(WorkerFailureDetectorConfig::from(&config.dispatcher)),
            )),
            registry,
            event_bus,
        }
    }

    /// 启动后台循环：触发引擎、资产组调度、超时回收、Worker失效检测
    pub fn spawn_background(&self, shutdown: &broadcast::Sender<()>) -> Vec<JoinHandle<()>> {
        let events = self.event_bus.subscribe_all();
        let trigger = self.trigger.clone();
        let scheduler = self.scheduler.clone();
        let reclaimer = self.reclaimer.clone();
        let detector = self.failure_detector.clone();

        let trigger_shutdown = shutdown.subscribe();
        let scheduler_shutdown = shutdown.subscribe();
        let reclaimer_shutdown = shutdown.subscribe();
        let detector_shutdown = shutdown.subscribe();

        vec![
            tokio::spawn(async move { trigger.run(events, trigger_shutdown).await }),
            tokio::spawn(async move { scheduler.run(scheduler_shutdown).await }),
            tokio::spawn(async move { reclaimer.run(reclaimer_shutdown).await }),
            tokio::spawn(async move { detector.run(detector_shutdown).await }),
        ]
    }
}
