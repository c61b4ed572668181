//! Worker与任务注册中心之间的请求/响应载荷

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::job::{Job, JobStatus};
use super::result::NormalizedResult;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    /// Worker的工具类型
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JoinResponse {
    pub worker_id: Uuid,
    pub token: String,
}

/// `Next` 的响应；没有可领取的任务时 `job` 为 null
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NextJobResponse {
    pub job: Option<Job>,
}

/// `Result` 的请求体
///
/// `results` 是Worker端已标准化的记录；只给 `output` 时由注册中心用工具的解析器处理。
/// 带 `error` 表示执行失败，任务进入 FAILED。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JobResultPayload {
    pub output: Option<String>,
    pub results: Option<Vec<NormalizedResult>>,
    pub error: Option<String>,
}

impl JobResultPayload {
    pub fn success(results: Vec<NormalizedResult>, output: Option<String>) -> Self {
        Self {
            output,
            results: Some(results),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>, output: Option<String>) -> Self {
        Self {
            output,
            results: None,
            error: Some(error.into()),
        }
    }

    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }
}

/// `Result` 的确认
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResultAck {
    pub job_id: Uuid,
    pub status: JobStatus,
    /// 任务此前已经结束，本次提交未产生任何变更
    pub duplicate: bool,
}
