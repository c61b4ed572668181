use axum::{
    extract::{Path, State},
    Json,
};
use recon_dispatcher::ScheduledRun;
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult},
    routes::AppState,
};

/// 立即执行资产组工作流，忽略其调度周期
pub async fn run_asset_group_workflow(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ScheduledRun>> {
    match state.dispatcher.scheduler.run_now(id).await? {
        Some(run) => Ok(Json(run)),
        None => Err(ApiError::Conflict(format!(
            "资产组工作流 {id} 正在其他实例上执行"
        ))),
    }
}
