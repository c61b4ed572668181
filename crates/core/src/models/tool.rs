use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::job::priority;

/// 工具定义，运行期只读
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    pub id: Uuid,
    pub name: String,
    pub category: String,
    /// 命令模板，`{{value}}` 会被逐个输入值替换；不含占位符时输入值经stdin传入
    pub command: String,
    /// 输出解析器名称，见 normalizer
    pub parser: String,
    pub version: Option<String>,
    pub priority: Option<i32>,
    pub is_built_in: bool,
}

impl ToolDefinition {
    /// 实际生效的调度优先级
    pub fn effective_priority(&self) -> i32 {
        self.priority.unwrap_or(priority::BACKGROUND)
    }

    pub fn built_in(name: &str, category: &str, command: &str, parser: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            category: category.to_string(),
            command: command.to_string(),
            parser: parser.to_string(),
            version: None,
            priority: None,
            is_built_in: true,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }
}

/// 启动时按名称upsert的内置工具目录
pub fn built_in_tools() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition::built_in(
            "subfinder",
            "subdomains",
            "subfinder -silent -all | dnsx -silent -recon -resp",
            "subdomains",
        )
        .with_priority(priority::HIGH),
        ToolDefinition::built_in(
            "httpx",
            "http_probe",
            "httpx -silent -json -title -tech-detect -status-code -web-server",
            "http_probe",
        )
        .with_priority(priority::NORMAL),
        ToolDefinition::built_in(
            "naabu",
            "ports_scanner",
            "naabu -host {{value}} -silent -top-ports 1000",
            "ports_scanner",
        )
        .with_priority(priority::NORMAL),
        ToolDefinition::built_in(
            "nuclei",
            "vulnerabilities",
            "nuclei -silent -jsonl -severity low,medium,high,critical",
            "vulnerabilities",
        ),
    ]
}
