use thiserror::Error;
use uuid::Uuid;

/// 编排系统错误类型定义
#[derive(Debug, Error)]
pub enum ReconError {
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("数据库操作错误: {0}")]
    DatabaseOperation(String),

    #[error("缓存错误: {0}")]
    Cache(String),

    #[error("参数校验失败: {0}")]
    Validation(String),

    #[error("工具未找到: {name}")]
    ToolNotFound { name: String },

    #[error("任务未找到: {id}")]
    JobNotFound { id: Uuid },

    #[error("Worker未找到: {id}")]
    WorkerNotFound { id: Uuid },

    #[error("工作流未找到: {id}")]
    WorkflowNotFound { id: Uuid },

    #[error("认证失败: {0}")]
    Authentication(String),

    #[error("过期的任务结果: 任务 {job_id} 已不属于 Worker {worker_id}")]
    StaleResult { job_id: Uuid, worker_id: Uuid },

    #[error("工具输出解析错误: {0}")]
    Parse(String),

    #[error("无效的CRON表达式: {expr} - {message}")]
    InvalidCron { expr: String, message: String },

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("命令执行错误: {0}")]
    Execution(String),

    #[error("网络错误: {0}")]
    Network(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for ReconError {
    fn from(err: serde_json::Error) -> Self {
        ReconError::Serialization(err.to_string())
    }
}

impl ReconError {
    /// 是否属于调用方输入问题（而不是系统故障）
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ReconError::Validation(_)
                | ReconError::ToolNotFound { .. }
                | ReconError::JobNotFound { .. }
                | ReconError::WorkerNotFound { .. }
                | ReconError::WorkflowNotFound { .. }
                | ReconError::Authentication(_)
                | ReconError::StaleResult { .. }
                | ReconError::InvalidCron { .. }
        )
    }
}
