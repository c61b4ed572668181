use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 任务优先级分档，数值越小越先调度
pub mod priority {
    pub const CRITICAL: i32 = 0;
    pub const HIGH: i32 = 10;
    pub const NORMAL: i32 = 50;
    /// 未显式声明优先级的工具默认落入后台档
    pub const BACKGROUND: i32 = 100;
}

/// 扫描任务
///
/// 一个任务把一个工具绑定到一组目标/资产上，由任务注册中心驱动状态流转。
///
/// # 字段说明
///
/// - `tool_id` / `tool_name` / `category`: 创建时从工具目录快照，用于和Worker类型匹配
/// - `values`: 工具的输入值（域名、主机等），由触发事件或资产组提供
/// - `worker_id`: 当前持有该任务的Worker，仅在 ASSIGNED/RUNNING 期间有值
/// - `retry_count`: 超时回收次数
///
/// # 使用示例
///
/// ```rust
/// use recon_core::models::{Job, JobStatus};
/// use uuid::Uuid;
///
/// let job = Job::new(Uuid::new_v4(), "subfinder", "subdomains", 100);
/// assert_eq!(job.status, JobStatus::Pending);
/// assert!(job.worker_id.is_none());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: Uuid,
    pub tool_id: Uuid,
    pub tool_name: String,
    pub category: String,
    pub target_ids: Vec<Uuid>,
    pub asset_ids: Vec<Uuid>,
    pub values: Vec<String>,
    pub workspace_id: Option<Uuid>,
    pub workflow_id: Option<Uuid>,
    pub priority: i32,
    pub status: JobStatus,
    pub worker_id: Option<Uuid>,
    pub retry_count: i32,
    pub is_save_raw_result: bool,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// 创建一个处于 PENDING 状态的新任务
    pub fn new(tool_id: Uuid, tool_name: &str, category: &str, priority: i32) -> Self {
        Self {
            id: Uuid::new_v4(),
            tool_id,
            tool_name: tool_name.to_string(),
            category: category.to_string(),
            target_ids: Vec::new(),
            asset_ids: Vec::new(),
            values: Vec::new(),
            workspace_id: None,
            workflow_id: None,
            priority,
            status: JobStatus::Pending,
            worker_id: None,
            retry_count: 0,
            is_save_raw_result: false,
            error_message: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Worker类型是否可以执行该任务（类别或工具名任一匹配）
    pub fn matches_worker_type(&self, worker_type: &str) -> bool {
        self.category == worker_type || self.tool_name == worker_type
    }

    /// 任务当前是否归属指定Worker
    pub fn is_owned_by(&self, worker_id: Uuid) -> bool {
        self.worker_id == Some(worker_id) && self.status.is_in_flight()
    }

    /// 端口结果应写入的资产值
    ///
    /// 带主机的结果只属于该主机；不带主机时只有单值任务能确定归属，多值任务返回空。
    pub fn port_scan_hosts<'a>(&'a self, host: Option<&'a str>) -> Vec<&'a str> {
        match (host, self.values.as_slice()) {
            (Some(host), _) => vec![host],
            (None, [only]) => vec![only.as_str()],
            (None, _) => Vec::new(),
        }
    }

    /// 任务自分配以来经过的秒数
    pub fn elapsed_seconds(&self, now: DateTime<Utc>) -> Option<i64> {
        self.started_at.map(|started| (now - started).num_seconds())
    }
}

/// 任务状态
///
/// 状态只能前进：PENDING → ASSIGNED → RUNNING → {DONE, FAILED}。
/// 唯一的回退是超时回收把在途任务重新放回 PENDING。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum JobStatus {
    #[serde(rename = "PENDING")]
    Pending,
    #[serde(rename = "ASSIGNED")]
    Assigned,
    #[serde(rename = "RUNNING")]
    Running,
    #[serde(rename = "DONE")]
    Done,
    #[serde(rename = "FAILED")]
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Assigned => "ASSIGNED",
            JobStatus::Running => "RUNNING",
            JobStatus::Done => "DONE",
            JobStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed)
    }

    pub fn is_in_flight(&self) -> bool {
        matches!(self, JobStatus::Assigned | JobStatus::Running)
    }

    /// 正常流转是否合法（不包含超时回收）
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Pending, Assigned)
                | (Assigned, Running)
                | (Assigned, Done)
                | (Assigned, Failed)
                | (Running, Done)
                | (Running, Failed)
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(JobStatus::Pending),
            "ASSIGNED" => Ok(JobStatus::Assigned),
            "RUNNING" => Ok(JobStatus::Running),
            "DONE" => Ok(JobStatus::Done),
            "FAILED" => Ok(JobStatus::Failed),
            _ => Err(format!("Invalid job status: {s}")),
        }
    }
}

impl sqlx::Type<sqlx::Postgres> for JobStatus {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        sqlx::postgres::PgTypeInfo::with_name("VARCHAR")
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Postgres> for JobStatus {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        Ok(s.parse::<JobStatus>()?)
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Postgres> for JobStatus {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        <&str as sqlx::Encode<sqlx::Postgres>>::encode(self.as_str(), buf)
    }
}

/// 创建任务时的可选参数
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateJobOptions {
    pub workspace_id: Option<Uuid>,
    pub asset_ids: Vec<Uuid>,
    pub values: Vec<String>,
    pub workflow_id: Option<Uuid>,
    /// 覆盖工具自身的优先级
    pub priority: Option<i32>,
    pub is_save_raw_result: bool,
}
