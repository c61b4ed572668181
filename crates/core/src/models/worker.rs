use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 已注册的Worker
///
/// `name` 是Worker的工具类型标识（如 `subdomains`、`nuclei`），决定它能领取哪些任务。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Worker {
    pub id: Uuid,
    pub name: String,
    pub token: String,
    pub status: WorkerStatus,
    pub last_seen_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Worker状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum WorkerStatus {
    #[serde(rename = "ALIVE")]
    Alive,
    #[serde(rename = "DOWN")]
    Down,
}

impl WorkerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerStatus::Alive => "ALIVE",
            WorkerStatus::Down => "DOWN",
        }
    }
}

impl sqlx::Type<sqlx::Postgres> for WorkerStatus {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        sqlx::postgres::PgTypeInfo::with_name("VARCHAR")
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Postgres> for WorkerStatus {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        match s {
            "ALIVE" => Ok(WorkerStatus::Alive),
            "DOWN" => Ok(WorkerStatus::Down),
            _ => Err(format!("Invalid worker status: {s}").into()),
        }
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Postgres> for WorkerStatus {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        <&str as sqlx::Encode<sqlx::Postgres>>::encode(self.as_str(), buf)
    }
}

/// Alive流上的心跳帧
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatFrame {
    /// 正在执行的任务，空闲时为 None
    #[serde(default)]
    pub job_id: Option<Uuid>,
    pub sent_at: DateTime<Utc>,
}

/// 服务端对心跳帧的确认
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatAck {
    pub worker_id: Uuid,
    pub received_at: DateTime<Utc>,
}

impl Worker {
    /// 创建新的Worker记录
    pub fn new(name: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            token: String::new(),
            status: WorkerStatus::Alive,
            last_seen_at: now,
            created_at: now,
        }
    }

    /// 检查Worker是否存活
    pub fn is_alive(&self) -> bool {
        matches!(self.status, WorkerStatus::Alive)
    }

    /// 检查心跳是否超时
    pub fn is_heartbeat_expired(&self, now: DateTime<Utc>, timeout_seconds: i64) -> bool {
        (now - self.last_seen_at).num_seconds() > timeout_seconds
    }
}
