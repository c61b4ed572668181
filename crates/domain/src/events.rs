//! 领域事件
//!
//! 事件名统一为 `<entityKind>.<action>`，例如 `target.created`、`asset.discovered`。
//! 触发引擎订阅全部事件，按事件名在处理函数里做匹配。

use chrono::{DateTime, Utc};
use recon_core::{ReconError, ReconResult};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 常用事件名
pub mod topics {
    pub const TARGET_CREATED: &str = "target.created";
    pub const ASSET_DISCOVERED: &str = "asset.discovered";
    pub const ASSET_HTTP_PROBED: &str = "asset.http_probed";
    pub const ASSET_PORTS_SCANNED: &str = "asset.ports_scanned";
    pub const VULNERABILITY_DISCOVERED: &str = "vulnerability.discovered";
    pub const JOB_COMPLETED: &str = "job.completed";
    pub const JOB_FAILED: &str = "job.failed";
}

/// 把 `kind.action` 拆成两段，两段都不能为空
pub fn parse_topic(topic: &str) -> ReconResult<(&str, &str)> {
    match topic.split_once('.') {
        Some((kind, action)) if !kind.is_empty() && !action.is_empty() => Ok((kind, action)),
        _ => Err(ReconError::Validation(format!(
            "事件名必须是 <entityKind>.<action> 格式: {topic}"
        ))),
    }
}

/// 事件来源：由某个工作流中的某个任务产生
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EventSource {
    pub job_id: Uuid,
    pub workflow_id: Option<Uuid>,
    pub tool_name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct EventPayload {
    pub target_ids: Vec<Uuid>,
    pub asset_ids: Vec<Uuid>,
    pub workspace_id: Option<Uuid>,
    /// 变化的值（新子域名、主机等），作为下游任务的输入
    pub values: Vec<String>,
    pub source: Option<EventSource>,
}

/// 领域事件
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DomainEvent {
    pub id: Uuid,
    pub kind: String,
    pub action: String,
    pub payload: EventPayload,
    pub occurred_at: DateTime<Utc>,
}

impl DomainEvent {
    pub fn new(kind: &str, action: &str, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: kind.to_string(),
            action: action.to_string(),
            payload,
            occurred_at: Utc::now(),
        }
    }

    /// 由完整事件名构造
    pub fn from_topic(topic: &str, payload: EventPayload) -> ReconResult<Self> {
        let (kind, action) = parse_topic(topic)?;
        Ok(Self::new(kind, action, payload))
    }

    pub fn topic(&self) -> String {
        format!("{}.{}", self.kind, self.action)
    }

    /// 事件是否带有工作流上下文
    pub fn workflow_source(&self) -> Option<(Uuid, &str)> {
        self.payload
            .source
            .as_ref()
            .and_then(|s| s.workflow_id.map(|id| (id, s.tool_name.as_str())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_topic() {
        assert_eq!(parse_topic("target.created").unwrap(), ("target", "created"));
        assert_eq!(
            parse_topic("asset.http_probed").unwrap(),
            ("asset", "http_probed")
        );
        assert!(parse_topic("target").is_err());
        assert!(parse_topic(".created").is_err());
        assert!(parse_topic("target.").is_err());
    }

    #[test]
    fn test_topic_roundtrip() {
        let event = DomainEvent::from_topic(topics::ASSET_DISCOVERED, EventPayload::default())
            .unwrap();
        assert_eq!(event.kind, "asset");
        assert_eq!(event.action, "discovered");
        assert_eq!(event.topic(), "asset.discovered");
        assert!(event.workflow_source().is_none());
    }

    #[test]
    fn test_workflow_source_requires_workflow_id() {
        let job_id = Uuid::new_v4();
        let mut payload = EventPayload {
            source: Some(EventSource {
                job_id,
                workflow_id: None,
                tool_name: "subfinder".to_string(),
            }),
            ..Default::default()
        };
        let event = DomainEvent::new("asset", "discovered", payload.clone());
        assert!(event.workflow_source().is_none());

        let workflow_id = Uuid::new_v4();
        if let Some(source) = payload.source.as_mut() {
            source.workflow_id = Some(workflow_id);
        }
        let event = DomainEvent::new("asset", "discovered", payload);
        assert_eq!(event.workflow_source(), Some((workflow_id, "subfinder")));
    }
}
