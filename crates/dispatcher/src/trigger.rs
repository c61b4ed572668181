//! 工作流触发引擎
//!
//! 订阅全部领域事件。每个事件按 `kind.action` 在存储端做包含查询，找到声明了该触发条件的
//! 工作流，只解析第一阶段并创建任务。后续阶段由任务结果事件推进：带有工作流来源的事件会让
//! 来源工作流前进到来源工具所在阶段的下一阶段，该工作流不再参与这次事件的全局匹配。

use std::sync::Arc;

use recon_core::{
    models::{CreateJobOptions, Job, Workflow},
    traits::WorkflowRepository,
    ReconResult,
};
use recon_domain::{DomainEvent, EventReceiver};
use recon_infrastructure::MetricsCollector;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::registry::JobCreator;

/// 任务生命周期事件只用于通知，不推进工作流阶段
const JOB_EVENT_KIND: &str = "job";

pub struct WorkflowTriggerEngine {
    workflows: Arc<dyn WorkflowRepository>,
    creator: Arc<dyn JobCreator>,
    metrics: MetricsCollector,
}

impl WorkflowTriggerEngine {
    pub fn new(workflows: Arc<dyn WorkflowRepository>, creator: Arc<dyn JobCreator>) -> Self {
        Self {
            workflows,
            creator,
            metrics: MetricsCollector::new(),
        }
    }

    /// 处理一个事件，返回创建的任务
    pub async fn handle_event(&self, event: &DomainEvent) -> ReconResult<Vec<Job>> {
        let mut created = Vec::new();
        let source = event.workflow_source();

        if let Some((workflow_id, tool_name)) = source {
            if event.kind != JOB_EVENT_KIND {
                created.extend(self.advance_stage(event, workflow_id, tool_name).await?);
            }
        }

        let matched = self
            .workflows
            .find_triggered_by(&event.kind, &event.action)
            .await?;

        for workflow in matched {
            if source.is_some_and(|(id, _)| id == workflow.id) {
                continue;
            }
            if !workflow.content.is_triggered_by(&event.kind, &event.action) {
                warn!(workflow.id = %workflow.id, "存储返回了触发条件不匹配的工作流，已忽略");
                continue;
            }

            let tools = workflow.content.first_stage_tools();
            if tools.is_empty() {
                warn!(workflow.id = %workflow.id, "工作流没有声明任何阶段");
                continue;
            }
            created.extend(self.create_stage_jobs(&workflow, tools, event).await?);
        }

        if !created.is_empty() {
            self.metrics.record_workflow_triggered(&event.topic());
        }
        Ok(created)
    }

    /// 推进来源工作流到下一阶段
    async fn advance_stage(
        &self,
        event: &DomainEvent,
        workflow_id: Uuid,
        tool_name: &str,
    ) -> ReconResult<Vec<Job>> {
        let Some(workflow) = self.workflows.get_by_id(workflow_id).await? else {
            warn!(workflow.id = %workflow_id, "事件来源的工作流不存在");
            return Ok(Vec::new());
        };
        let Some(stage) = workflow.content.stage_index_of(tool_name) else {
            warn!(
                workflow.id = %workflow_id,
                tool.name = tool_name,
                "来源工具不属于该工作流的任何阶段"
            );
            return Ok(Vec::new());
        };

        let next_tools = workflow.content.stage_tools(stage + 1);
        if next_tools.is_empty() {
            debug!(workflow.id = %workflow_id, "工作流已到最后阶段");
            return Ok(Vec::new());
        }
        if event.payload.values.is_empty() {
            debug!(workflow.id = %workflow_id, "事件没有携带新值，不推进阶段");
            return Ok(Vec::new());
        }

        self.create_stage_jobs(&workflow, next_tools, event).await
    }

    async fn create_stage_jobs(
        &self,
        workflow: &Workflow,
        tools: Vec<String>,
        event: &DomainEvent,
    ) -> ReconResult<Vec<Job>> {
        let payload = &event.payload;
        let opts = CreateJobOptions {
            workspace_id: payload.workspace_id,
            asset_ids: payload.asset_ids.clone(),
            values: payload.values.clone(),
            workflow_id: Some(workflow.id),
            ..Default::default()
        };

        match self
            .creator
            .create_jobs_by_name(tools.clone(), payload.target_ids.clone(), opts)
            .await
        {
            Ok(jobs) => {
                info!(
                    workflow.id = %workflow.id,
                    workflow.name = %workflow.name,
                    event.topic = %event.topic(),
                    tools = ?tools,
                    "工作流触发，创建 {} 个任务",
                    jobs.len()
                );
                Ok(jobs)
            }
            Err(e) if e.is_client_error() => {
                error!(workflow.id = %workflow.id, "工作流阶段无法创建任务: {}", e);
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }

    /// 事件循环，直到收到停止信号或事件总线关闭
    pub async fn run(
        &self,
        mut events: EventReceiver,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        info!("启动工作流触发引擎");
        loop {
            tokio::select! {
                received = events.recv() => match received {
                    Some(event) => {
                        if let Err(e) = self.handle_event(&event).await {
                            error!(event.topic = %event.topic(), "处理领域事件失败: {}", e);
                        }
                    }
                    None => {
                        info!("事件总线已关闭，退出触发引擎");
                        break;
                    }
                },
                _ = shutdown.recv() => {
                    info!("收到停止信号，退出触发引擎");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::MockJobCreator;
    use recon_core::ReconError;
    use recon_domain::{EventBus, EventPayload, EventSource};
    use recon_infrastructure::memory::InMemoryWorkflowRepository;
    use recon_infrastructure::InMemoryEventBus;
    use serde_json::json;

    fn workflow(content: serde_json::Value) -> Workflow {
        Workflow {
            id: Uuid::new_v4(),
            name: "recon".to_string(),
            content: serde_json::from_value(content).unwrap(),
            file_path: None,
        }
    }

    async fn engine_with(
        workflows: Vec<Workflow>,
        creator: MockJobCreator,
    ) -> WorkflowTriggerEngine {
        let repo = InMemoryWorkflowRepository::new();
        for w in workflows {
            repo.insert(w).await;
        }
        WorkflowTriggerEngine::new(Arc::new(repo), Arc::new(creator))
    }

    #[tokio::test]
    async fn test_target_created_fires_first_stage_once() {
        let target = Uuid::new_v4();
        let wf = workflow(json!({
            "on": {"target": ["created"]},
            "jobs": [{"subfinder": {}}, {"httpx": {}}]
        }));
        let wf_id = wf.id;

        let mut creator = MockJobCreator::new();
        creator
            .expect_create_jobs_by_name()
            .withf(move |tools, targets, opts| {
                tools == &vec!["subfinder".to_string()]
                    && targets == &vec![target]
                    && opts.workflow_id == Some(wf_id)
            })
            .times(1)
            .returning(|_, _, _| Ok(Vec::new()));
        let engine = engine_with(vec![wf], creator).await;

        let event = DomainEvent::new(
            "target",
            "created",
            EventPayload {
                target_ids: vec![target],
                ..Default::default()
            },
        );
        engine.handle_event(&event).await.unwrap();
    }

    #[tokio::test]
    async fn test_multi_key_jobs_object_fires_only_its_first_key() {
        let wf = Workflow {
            id: Uuid::new_v4(),
            name: "recon".to_string(),
            content: serde_json::from_str(
                r#"{"on": {"target": ["created"]}, "jobs": {"subfinder": {}, "httpx": {}}}"#,
            )
            .unwrap(),
            file_path: None,
        };
        let wf_id = wf.id;

        let mut creator = MockJobCreator::new();
        creator
            .expect_create_jobs_by_name()
            .withf(|tools, _, _| tools == &vec!["subfinder".to_string()])
            .times(1)
            .returning(|_, _, _| Ok(Vec::new()));
        creator
            .expect_create_jobs_by_name()
            .withf(|tools, _, opts| {
                tools == &vec!["httpx".to_string()]
                    && opts.values == vec!["a.example.com".to_string()]
            })
            .times(1)
            .returning(|_, _, _| Ok(Vec::new()));
        let engine = engine_with(vec![wf], creator).await;

        let created = DomainEvent::new("target", "created", EventPayload::default());
        engine.handle_event(&created).await.unwrap();

        let discovered = DomainEvent::new(
            "asset",
            "discovered",
            EventPayload {
                values: vec!["a.example.com".to_string()],
                source: Some(EventSource {
                    job_id: Uuid::new_v4(),
                    workflow_id: Some(wf_id),
                    tool_name: "subfinder".to_string(),
                }),
                ..Default::default()
            },
        );
        engine.handle_event(&discovered).await.unwrap();
    }

    #[tokio::test]
    async fn test_unmatched_action_creates_nothing() {
        let wf = workflow(json!({
            "on": {"target": ["created"]},
            "jobs": {"subfinder": {}}
        }));
        let mut creator = MockJobCreator::new();
        creator.expect_create_jobs_by_name().times(0);
        let engine = engine_with(vec![wf], creator).await;

        let event = DomainEvent::new("target", "updated", EventPayload::default());
        assert!(engine.handle_event(&event).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_result_event_advances_source_workflow() {
        let wf = workflow(json!({
            "on": {"target": ["created"], "asset": ["discovered"]},
            "jobs": [{"subfinder": {}}, {"httpx": {}, "naabu": {}}]
        }));
        let wf_id = wf.id;

        let mut creator = MockJobCreator::new();
        creator
            .expect_create_jobs_by_name()
            .withf(|tools, _, opts| {
                tools == &vec!["httpx".to_string(), "naabu".to_string()]
                    && opts.values == vec!["a.example.com".to_string()]
            })
            .times(1)
            .returning(|_, _, _| Ok(Vec::new()));
        let engine = engine_with(vec![wf], creator).await;

        let event = DomainEvent::new(
            "asset",
            "discovered",
            EventPayload {
                values: vec!["a.example.com".to_string()],
                source: Some(EventSource {
                    job_id: Uuid::new_v4(),
                    workflow_id: Some(wf_id),
                    tool_name: "subfinder".to_string(),
                }),
                ..Default::default()
            },
        );
        engine.handle_event(&event).await.unwrap();
    }

    #[tokio::test]
    async fn test_job_events_and_last_stage_do_not_advance() {
        let wf = workflow(json!({
            "on": {"target": ["created"]},
            "jobs": [{"subfinder": {}}, {"nuclei": {}}]
        }));
        let wf_id = wf.id;
        let mut creator = MockJobCreator::new();
        creator.expect_create_jobs_by_name().times(0);
        let engine = engine_with(vec![wf], creator).await;

        let source = |tool: &str| EventSource {
            job_id: Uuid::new_v4(),
            workflow_id: Some(wf_id),
            tool_name: tool.to_string(),
        };
        let completed = DomainEvent::new(
            "job",
            "completed",
            EventPayload {
                values: vec!["example.com".to_string()],
                source: Some(source("subfinder")),
                ..Default::default()
            },
        );
        engine.handle_event(&completed).await.unwrap();

        let from_last_stage = DomainEvent::new(
            "vulnerability",
            "discovered",
            EventPayload {
                values: vec!["a.example.com".to_string()],
                source: Some(source("nuclei")),
                ..Default::default()
            },
        );
        engine.handle_event(&from_last_stage).await.unwrap();

        let foreign_tool = DomainEvent::new(
            "asset",
            "discovered",
            EventPayload {
                values: vec!["a.example.com".to_string()],
                source: Some(source("amass")),
                ..Default::default()
            },
        );
        engine.handle_event(&foreign_tool).await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_tool_in_one_workflow_does_not_block_others() {
        let broken = workflow(json!({"on": {"target": ["created"]}, "jobs": {"missing": {}}}));
        let healthy = workflow(json!({"on": {"target": ["created"]}, "jobs": {"subfinder": {}}}));

        let mut creator = MockJobCreator::new();
        creator
            .expect_create_jobs_by_name()
            .times(2)
            .returning(|tools, _, _| {
                if tools[0] == "missing" {
                    Err(ReconError::ToolNotFound {
                        name: "missing".to_string(),
                    })
                } else {
                    Ok(vec![Job::new(Uuid::new_v4(), "subfinder", "subdomains", 10)])
                }
            });
        let engine = engine_with(vec![broken, healthy], creator).await;

        let event = DomainEvent::new("target", "created", EventPayload::default());
        let created = engine.handle_event(&event).await.unwrap();
        assert_eq!(created.len(), 1);
    }

    #[tokio::test]
    async fn test_event_burst_is_processed_completely() {
        let burst = 2_000;
        let wf = workflow(json!({"on": {"asset": ["discovered"]}, "jobs": {"httpx": {}}}));
        let mut creator = MockJobCreator::new();
        creator
            .expect_create_jobs_by_name()
            .times(burst)
            .returning(|_, _, _| Ok(Vec::new()));
        let engine = engine_with(vec![wf], creator).await;

        let bus = InMemoryEventBus::new();
        let events = bus.subscribe_all();
        for i in 0..burst {
            let payload = EventPayload {
                values: vec![format!("host-{i}.example.com")],
                ..Default::default()
            };
            bus.publish(DomainEvent::new("asset", "discovered", payload))
                .await
                .unwrap();
        }
        drop(bus);

        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
        engine.run(events, shutdown_rx).await;
    }
}
