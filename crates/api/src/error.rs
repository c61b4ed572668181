use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use recon_core::ReconError;
use serde_json::json;
use tracing::error;

use crate::auth::AuthError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Recon(#[from] ReconError),

    #[error("认证错误: {0}")]
    Authentication(#[from] AuthError),

    #[error("请求参数错误: {0}")]
    BadRequest(String),

    #[error("请求冲突: {0}")]
    Conflict(String),
}

impl ApiError {
    fn status_and_type(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Recon(err) => match err {
                ReconError::Validation(_) | ReconError::InvalidCron { .. } => {
                    (StatusCode::BAD_REQUEST, "VALIDATION_ERROR")
                }
                ReconError::ToolNotFound { .. } => (StatusCode::BAD_REQUEST, "TOOL_NOT_FOUND"),
                ReconError::Authentication(_) => {
                    (StatusCode::UNAUTHORIZED, "AUTHENTICATION_ERROR")
                }
                ReconError::JobNotFound { .. } => (StatusCode::NOT_FOUND, "JOB_NOT_FOUND"),
                ReconError::WorkerNotFound { .. } => (StatusCode::NOT_FOUND, "WORKER_NOT_FOUND"),
                ReconError::WorkflowNotFound { .. } => {
                    (StatusCode::NOT_FOUND, "WORKFLOW_NOT_FOUND")
                }
                ReconError::StaleResult { .. } => (StatusCode::CONFLICT, "STALE_RESULT"),
                _ => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            },
            ApiError::Authentication(_) => (StatusCode::UNAUTHORIZED, "AUTHENTICATION_ERROR"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type) = self.status_and_type();

        // 系统故障不把内部细节返回给调用方
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("请求处理失败: {}", self);
            "系统内部错误".to_string()
        } else {
            self.to_string()
        };

        let body = Json(json!({
            "error": {
                "message": message,
                "type": error_type,
                "code": status.as_u16(),
                "timestamp": chrono::Utc::now().to_rfc3339(),
            }
        }));

        (status, body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn status_of(err: impl Into<ApiError>) -> StatusCode {
        err.into().into_response().status()
    }

    #[test]
    fn test_recon_error_status_mapping() {
        assert_eq!(
            status_of(ReconError::Validation("toolIds 不能为空".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(ReconError::Authentication("无效的API Key".into())),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            status_of(ReconError::JobNotFound { id: Uuid::new_v4() }),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(ReconError::StaleResult {
                job_id: Uuid::new_v4(),
                worker_id: Uuid::new_v4(),
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(ReconError::Cache("connection refused".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_auth_error_is_unauthorized() {
        assert_eq!(status_of(AuthError::MissingToken), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_conflict() {
        let error = ApiError::Conflict("资产组工作流正在执行".to_string());
        assert_eq!(error.into_response().status(), StatusCode::CONFLICT);
    }
}
