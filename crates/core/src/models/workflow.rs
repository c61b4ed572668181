use chrono::{DateTime, Utc};
use serde::de::{MapAccess, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use uuid::Uuid;

/// 一个阶段：工具名 → 工具参数，同一阶段的工具并行执行
pub type WorkflowStage = BTreeMap<String, serde_json::Value>;

/// 存储的工作流文档
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    pub id: Uuid,
    pub name: String,
    pub content: WorkflowContent,
    pub file_path: Option<String>,
}

/// 工作流内容
///
/// `on` 声明触发条件：实体类型 → 动作列表，例如 `{"target": ["created"]}`。
/// `jobs` 是有序的阶段列表。文档里写成对象时，每个键按出现顺序各自成为一个阶段，
/// 第一个键就是第一阶段；写成数组时，数组的每个元素是一个阶段，元素内的工具并行执行。
/// 序列化时总是输出数组形式。
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct WorkflowContent {
    #[serde(default)]
    pub on: HashMap<String, Vec<String>>,
    #[serde(default, deserialize_with = "deserialize_stages")]
    pub jobs: Vec<WorkflowStage>,
}

struct StagesVisitor;

impl<'de> Visitor<'de> for StagesVisitor {
    type Value = Vec<WorkflowStage>;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a map of tool stages or an array of stage maps")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let mut stages = Vec::new();
        while let Some((tool, params)) = map.next_entry::<String, serde_json::Value>()? {
            stages.push(WorkflowStage::from([(tool, params)]));
        }
        Ok(stages)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        let mut stages = Vec::new();
        while let Some(stage) = seq.next_element::<WorkflowStage>()? {
            stages.push(stage);
        }
        Ok(stages)
    }

    fn visit_unit<E: serde::de::Error>(self) -> Result<Self::Value, E> {
        Ok(Vec::new())
    }
}

fn deserialize_stages<'de, D>(deserializer: D) -> Result<Vec<WorkflowStage>, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_any(StagesVisitor)
}

impl WorkflowContent {
    /// 是否声明了 `kind.action` 触发
    pub fn is_triggered_by(&self, kind: &str, action: &str) -> bool {
        self.on
            .get(kind)
            .map(|actions| actions.iter().any(|a| a == action))
            .unwrap_or(false)
    }

    /// 第一阶段的工具名
    pub fn first_stage_tools(&self) -> Vec<String> {
        self.stage_tools(0)
    }

    pub fn stage_tools(&self, index: usize) -> Vec<String> {
        self.jobs
            .get(index)
            .map(|stage| stage.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// 工具所在的阶段下标
    pub fn stage_index_of(&self, tool_name: &str) -> Option<usize> {
        self.jobs
            .iter()
            .position(|stage| stage.contains_key(tool_name))
    }
}

/// 资产组定时类别
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowSchedule {
    Hourly,
    Daily,
    Weekly,
    Monthly,
    /// 六段式cron表达式（含秒）
    Custom(String),
}

impl WorkflowSchedule {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_uppercase().as_str() {
            "HOURLY" => WorkflowSchedule::Hourly,
            "DAILY" => WorkflowSchedule::Daily,
            "WEEKLY" => WorkflowSchedule::Weekly,
            "MONTHLY" => WorkflowSchedule::Monthly,
            _ => WorkflowSchedule::Custom(value.trim().to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            WorkflowSchedule::Hourly => "HOURLY",
            WorkflowSchedule::Daily => "DAILY",
            WorkflowSchedule::Weekly => "WEEKLY",
            WorkflowSchedule::Monthly => "MONTHLY",
            WorkflowSchedule::Custom(expr) => expr,
        }
    }

    pub fn cron_expression(&self) -> &str {
        match self {
            WorkflowSchedule::Hourly => "0 0 * * * *",
            WorkflowSchedule::Daily => "0 0 0 * * *",
            WorkflowSchedule::Weekly => "0 0 0 * * Mon",
            WorkflowSchedule::Monthly => "0 0 0 1 * *",
            WorkflowSchedule::Custom(expr) => expr,
        }
    }
}

impl Serialize for WorkflowSchedule {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for WorkflowSchedule {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Ok(WorkflowSchedule::parse(&value))
    }
}

/// 资产组与工作流的定时绑定
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AssetGroupWorkflow {
    pub id: Uuid,
    pub name: String,
    pub asset_group_id: Uuid,
    pub workflow_id: Uuid,
    pub workspace_id: Option<Uuid>,
    /// None 表示只支持手动触发
    pub schedule: Option<WorkflowSchedule>,
    /// 最近一次调度产生的任务
    pub job_id: Option<Uuid>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_single_stage_document() {
        let content: WorkflowContent = serde_json::from_value(json!({
            "on": {"target": ["created"]},
            "jobs": {"subfinder": {}}
        }))
        .unwrap();

        assert!(content.is_triggered_by("target", "created"));
        assert!(!content.is_triggered_by("target", "updated"));
        assert!(!content.is_triggered_by("asset", "created"));
        assert_eq!(content.first_stage_tools(), vec!["subfinder".to_string()]);
    }

    #[test]
    fn test_object_keys_are_ordered_stages() {
        let content: WorkflowContent = serde_json::from_str(
            r#"{"on": {"target": ["created"]}, "jobs": {"subfinder": {}, "httpx": {"threads": 5}, "nuclei": {}}}"#,
        )
        .unwrap();

        assert_eq!(content.jobs.len(), 3);
        assert_eq!(content.first_stage_tools(), vec!["subfinder".to_string()]);
        assert_eq!(content.stage_tools(1), vec!["httpx".to_string()]);
        assert_eq!(content.stage_index_of("nuclei"), Some(2));
        assert_eq!(content.jobs[1]["httpx"], json!({"threads": 5}));

        let stored = serde_json::to_value(&content).unwrap();
        assert!(stored["jobs"].is_array());
        let reloaded: WorkflowContent = serde_json::from_value(stored).unwrap();
        assert_eq!(reloaded, content);
    }

    #[test]
    fn test_null_jobs_is_empty() {
        let content: WorkflowContent = serde_json::from_value(json!({"jobs": null})).unwrap();
        assert!(content.jobs.is_empty());
    }

    #[test]
    fn test_staged_document() {
        let content: WorkflowContent = serde_json::from_value(json!({
            "on": {"target": ["created", "updated"]},
            "jobs": [
                {"subfinder": {}},
                {"httpx": {}, "naabu": {"top": 100}},
                {"nuclei": {}}
            ]
        }))
        .unwrap();

        assert_eq!(content.jobs.len(), 3);
        assert_eq!(content.stage_index_of("naabu"), Some(1));
        assert_eq!(content.stage_index_of("nuclei"), Some(2));
        assert_eq!(content.stage_index_of("dnsx"), None);
        assert_eq!(
            content.stage_tools(1),
            vec!["httpx".to_string(), "naabu".to_string()]
        );
        assert!(content.stage_tools(3).is_empty());
    }

    #[test]
    fn test_missing_sections_default_to_empty() {
        let content: WorkflowContent = serde_json::from_value(json!({})).unwrap();
        assert!(content.on.is_empty());
        assert!(content.jobs.is_empty());
    }

    #[test]
    fn test_schedule_classes() {
        assert_eq!(WorkflowSchedule::parse("daily"), WorkflowSchedule::Daily);
        assert_eq!(
            WorkflowSchedule::parse("0 */5 * * * *"),
            WorkflowSchedule::Custom("0 */5 * * * *".to_string())
        );
        assert_eq!(WorkflowSchedule::Hourly.cron_expression(), "0 0 * * * *");

        let json = serde_json::to_string(&WorkflowSchedule::Weekly).unwrap();
        assert_eq!(json, "\"WEEKLY\"");
    }
}
