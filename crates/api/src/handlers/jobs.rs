use axum::{
    extract::{Path, State},
    Json,
};
use recon_core::models::{JobResultPayload, NextJobResponse, ResultAck};
use uuid::Uuid;

use crate::{auth::AuthenticatedWorker, error::ApiResult, routes::AppState};

/// 拉取下一个任务；没有可分配的任务时返回 `{"job": null}`
pub async fn next_job(
    State(state): State<AppState>,
    AuthenticatedWorker(worker): AuthenticatedWorker,
) -> ApiResult<Json<NextJobResponse>> {
    let job = state.dispatcher.registry.next(worker.worker_id).await?;
    Ok(Json(NextJobResponse { job }))
}

/// 提交任务结果
pub async fn submit_result(
    State(state): State<AppState>,
    AuthenticatedWorker(worker): AuthenticatedWorker,
    Path(job_id): Path<Uuid>,
    Json(payload): Json<JobResultPayload>,
) -> ApiResult<Json<ResultAck>> {
    let ack = state
        .dispatcher
        .registry
        .submit_result(job_id, worker.worker_id, payload)
        .await?;
    Ok(Json(ack))
}
