//! Workers服务：Join 与 Alive 流

use std::io;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header::CONTENT_TYPE, HeaderMap},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use futures::{future, StreamExt};
use recon_core::{
    models::{HeartbeatFrame, JoinRequest, JoinResponse},
    ReconError,
};
use recon_dispatcher::WorkerSessions;
use tokio::io::AsyncBufReadExt;
use tokio_stream::wrappers::LinesStream;
use tokio_util::io::StreamReader;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    auth::{extract_api_key, AuthenticatedWorker},
    error::ApiResult,
    routes::AppState,
};

pub const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

/// 用API Key换取Worker身份和令牌
pub async fn join(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<JoinRequest>,
) -> ApiResult<Json<JoinResponse>> {
    let api_key = extract_api_key(&headers)?;
    let joined = state.dispatcher.sessions.join(api_key, &request.name).await?;
    Ok(Json(joined))
}

/// Alive流
///
/// 请求体是逐行的心跳帧（NDJSON），响应体对每一帧回一行确认。无法解析的帧被跳过；
/// Worker记录不存在时结束响应流，客户端应重新Join。
pub async fn alive(
    State(state): State<AppState>,
    AuthenticatedWorker(worker): AuthenticatedWorker,
    body: Body,
) -> Response {
    info!(worker.id = %worker.worker_id, worker.name = %worker.name, "Alive流已建立");

    let frames = body
        .into_data_stream()
        .map(|chunk| chunk.map_err(io::Error::other));
    let reader = StreamReader::new(frames);
    let sessions = state.dispatcher.sessions.clone();
    let worker_id = worker.worker_id;

    let acks = LinesStream::new(reader.lines())
        .then(move |line| heartbeat_line(sessions.clone(), worker_id, line))
        .filter_map(future::ready);

    ([(CONTENT_TYPE, NDJSON_CONTENT_TYPE)], Body::from_stream(acks)).into_response()
}

async fn heartbeat_line(
    sessions: Arc<WorkerSessions>,
    worker_id: Uuid,
    line: io::Result<String>,
) -> Option<io::Result<String>> {
    let line = match line {
        Ok(line) => line,
        Err(e) => {
            debug!(worker.id = %worker_id, "Alive流读取结束: {}", e);
            return Some(Err(e));
        }
    };
    if line.trim().is_empty() {
        return None;
    }

    let frame: HeartbeatFrame = match serde_json::from_str(&line) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(worker.id = %worker_id, "忽略无法解析的心跳帧: {}", e);
            return None;
        }
    };

    match sessions.heartbeat(worker_id, &frame, Utc::now()).await {
        Ok(ack) => match serde_json::to_string(&ack) {
            Ok(mut encoded) => {
                encoded.push('\n');
                Some(Ok(encoded))
            }
            Err(e) => Some(Err(io::Error::other(e))),
        },
        Err(e @ ReconError::WorkerNotFound { .. }) => {
            warn!(worker.id = %worker_id, "Worker记录不存在，关闭Alive流");
            Some(Err(io::Error::other(e)))
        }
        Err(e) => {
            warn!(worker.id = %worker_id, "处理心跳失败: {}", e);
            None
        }
    }
}
