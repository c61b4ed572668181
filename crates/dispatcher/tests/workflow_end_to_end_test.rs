use std::sync::Arc;

use chrono::{Duration, Utc};
use recon_core::{
    models::{built_in_tools, JobResultPayload, JobStatus, Workflow},
    traits::{JobRepository, ToolRepository, WorkerRepository},
    AppConfig,
};
use recon_dispatcher::{Dispatcher, InMemoryRepositories};
use recon_domain::{DomainEvent, EventBus, EventPayload, EventReceiver};
use recon_infrastructure::{InMemoryEventBus, InMemoryLockStore};
use serde_json::json;
use uuid::Uuid;

const API_KEY: &str = "integration-key";

async fn setup() -> (Dispatcher, InMemoryRepositories, Arc<InMemoryEventBus>) {
    let store = InMemoryRepositories::new();
    for tool in built_in_tools() {
        store.tools.upsert_by_name(&tool).await.unwrap();
    }

    let mut config = AppConfig::default();
    config.auth.api_keys = vec![API_KEY.to_string()];

    let bus = Arc::new(InMemoryEventBus::default());
    let dispatcher = Dispatcher::new(
        &config,
        store.as_repositories(),
        Arc::new(InMemoryLockStore::new()),
        bus.clone(),
    );
    (dispatcher, store, bus)
}

/// 把总线上积压的事件逐个交给触发引擎
async fn drain(dispatcher: &Dispatcher, events: &mut EventReceiver) -> usize {
    let mut created = 0;
    while let Ok(event) = events.try_recv() {
        created += dispatcher.trigger.handle_event(&event).await.unwrap().len();
    }
    created
}

#[tokio::test]
async fn test_target_created_runs_workflow_stage_by_stage() {
    let (dispatcher, store, bus) = setup().await;
    let mut events = bus.subscribe_all();

    let workflow = Workflow {
        id: Uuid::new_v4(),
        name: "subdomain-recon".to_string(),
        content: serde_json::from_value(json!({
            "on": {"target": ["created"]},
            "jobs": [{"subfinder": {}}, {"httpx": {}}]
        }))
        .unwrap(),
        file_path: None,
    };
    store.workflows.insert(workflow.clone()).await;

    let subdomains = dispatcher.sessions.join(API_KEY, "subdomains").await.unwrap();
    let prober = dispatcher.sessions.join(API_KEY, "http_probe").await.unwrap();

    let target = Uuid::new_v4();
    bus.publish(DomainEvent::new(
        "target",
        "created",
        EventPayload {
            target_ids: vec![target],
            workspace_id: Some(Uuid::new_v4()),
            ..Default::default()
        },
    ))
    .await
    .unwrap();
    assert_eq!(drain(&dispatcher, &mut events).await, 1);

    // 第一阶段只有子域名任务
    assert!(dispatcher.registry.next(prober.worker_id).await.unwrap().is_none());
    let job = dispatcher
        .registry
        .next(subdomains.worker_id)
        .await
        .unwrap()
        .expect("subfinder job");
    assert_eq!(job.tool_name, "subfinder");
    assert_eq!(job.workflow_id, Some(workflow.id));
    assert_eq!(job.target_ids, vec![target]);

    let ack = dispatcher
        .registry
        .submit_result(
            job.id,
            subdomains.worker_id,
            JobResultPayload {
                output: Some(
                    "a.example.com [A] [10.0.0.1]\nb.example.com [A] [10.0.0.2]\n".to_string(),
                ),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(ack.status, JobStatus::Done);
    assert_eq!(store.results.asset_count().await, 2);

    // asset.discovered 推进到第二阶段
    assert_eq!(drain(&dispatcher, &mut events).await, 1);
    let probe_job = dispatcher
        .registry
        .next(prober.worker_id)
        .await
        .unwrap()
        .expect("httpx job");
    assert_eq!(probe_job.tool_name, "httpx");
    assert_eq!(probe_job.values.len(), 2);
    assert!(probe_job.values.contains(&"a.example.com".to_string()));
    assert!(dispatcher
        .registry
        .next(subdomains.worker_id)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_job_of_silent_worker_is_reassigned() {
    let (dispatcher, store, _bus) = setup().await;
    let tool = store
        .tools
        .get_by_names(&["subfinder".to_string()])
        .await
        .unwrap()
        .remove(0);

    dispatcher
        .registry
        .create_job(&[tool.id], &[Uuid::new_v4()], Default::default())
        .await
        .unwrap();

    let first = dispatcher.sessions.join(API_KEY, "subdomains").await.unwrap();
    let second = dispatcher.sessions.join(API_KEY, "subdomains").await.unwrap();

    let job = dispatcher
        .registry
        .next(first.worker_id)
        .await
        .unwrap()
        .unwrap();

    // 第一个Worker从此不再心跳
    let later = Utc::now() + Duration::seconds(30);
    store.workers.set_last_seen(second.worker_id, later).await;
    let failed = dispatcher
        .failure_detector
        .detect_failed_workers(later)
        .await
        .unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].id, first.worker_id);

    let report = dispatcher.reclaimer.reclaim_expired(later).await.unwrap();
    assert_eq!(report.requeued, vec![job.id]);

    let reassigned = dispatcher
        .registry
        .next(second.worker_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reassigned.id, job.id);
    assert_eq!(reassigned.retry_count, 1);

    // 失联Worker迟到的结果被拒绝
    assert!(dispatcher
        .registry
        .submit_result(
            job.id,
            first.worker_id,
            JobResultPayload::success(Vec::new(), None),
        )
        .await
        .is_err());
    let stored = store.jobs.get_by_id(job.id).await.unwrap().unwrap();
    assert_eq!(stored.worker_id, Some(second.worker_id));
    assert!(store.workers.get_by_id(second.worker_id).await.unwrap().unwrap().is_alive());
}
