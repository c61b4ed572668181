//! 编排核心的HTTP客户端

use std::io;

use futures::{Stream, StreamExt};
use recon_core::{
    models::{
        HeartbeatAck, HeartbeatFrame, Job, JobResultPayload, JoinRequest, JoinResponse,
        NextJobResponse, ResultAck,
    },
    ReconError, ReconResult,
};
use reqwest::{header::CONTENT_TYPE, Response, StatusCode};
use tokio::io::AsyncBufReadExt;
use tokio_stream::wrappers::LinesStream;
use tokio_util::io::StreamReader;
use tracing::{debug, warn};
use uuid::Uuid;

pub const API_KEY_HEADER: &str = "X-API-Key";
const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

#[derive(Debug, Clone)]
pub struct DispatcherClient {
    base_url: String,
    http_client: reqwest::Client,
}

impl DispatcherClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http_client: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn join(&self, api_key: &str, name: &str) -> ReconResult<JoinResponse> {
        let response = self
            .http_client
            .post(self.url("/api/v1/workers/join"))
            .header(API_KEY_HEADER, api_key)
            .json(&JoinRequest {
                name: name.to_string(),
            })
            .send()
            .await
            .map_err(network_error)?;

        let response = check_status(response, None).await?;
        response.json().await.map_err(network_error)
    }

    pub async fn next(&self, token: &str) -> ReconResult<Option<Job>> {
        let response = self
            .http_client
            .post(self.url("/api/v1/jobs/next"))
            .bearer_auth(token)
            .send()
            .await
            .map_err(network_error)?;

        let response = check_status(response, None).await?;
        let body: NextJobResponse = response.json().await.map_err(network_error)?;
        Ok(body.job)
    }

    pub async fn submit_result(
        &self,
        token: &str,
        worker_id: Uuid,
        job_id: Uuid,
        payload: &JobResultPayload,
    ) -> ReconResult<ResultAck> {
        let response = self
            .http_client
            .post(self.url(&format!("/api/v1/jobs/{job_id}/result")))
            .bearer_auth(token)
            .json(payload)
            .send()
            .await
            .map_err(network_error)?;

        let response = check_status(response, Some((job_id, worker_id))).await?;
        response.json().await.map_err(network_error)
    }

    /// 打开Alive流：`frames` 逐行写入请求体，返回服务端确认流
    pub async fn open_alive<S>(
        &self,
        token: &str,
        frames: S,
    ) -> ReconResult<impl Stream<Item = ReconResult<HeartbeatAck>>>
    where
        S: Stream<Item = HeartbeatFrame> + Send + 'static,
    {
        let body = reqwest::Body::wrap_stream(frames.map(|frame| {
            serde_json::to_string(&frame).map(|mut line| {
                line.push('\n');
                line
            })
        }));

        let response = self
            .http_client
            .post(self.url("/api/v1/workers/alive"))
            .bearer_auth(token)
            .header(CONTENT_TYPE, NDJSON_CONTENT_TYPE)
            .body(body)
            .send()
            .await
            .map_err(network_error)?;
        let response = check_status(response, None).await?;

        let chunks = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(io::Error::other));
        let reader = StreamReader::new(chunks);
        let acks = LinesStream::new(reader.lines()).filter_map(|line| async move {
            match line {
                Ok(line) if line.trim().is_empty() => None,
                Ok(line) => match serde_json::from_str::<HeartbeatAck>(&line) {
                    Ok(ack) => Some(Ok(ack)),
                    Err(e) => {
                        warn!("忽略无法解析的心跳确认: {}", e);
                        None
                    }
                },
                Err(e) => Some(Err(ReconError::Network(format!("Alive流中断: {e}")))),
            }
        });
        Ok(acks)
    }
}

fn network_error(err: reqwest::Error) -> ReconError {
    ReconError::Network(err.to_string())
}

/// 把非2xx响应转换为对应的错误
async fn check_status(response: Response, job: Option<(Uuid, Uuid)>) -> ReconResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    debug!("Dispatcher返回错误: HTTP {} - {}", status, body);
    Err(match (status, job) {
        (StatusCode::UNAUTHORIZED, _) => ReconError::Authentication(body),
        (StatusCode::CONFLICT, Some((job_id, worker_id))) => {
            ReconError::StaleResult { job_id, worker_id }
        }
        (StatusCode::BAD_REQUEST, _) => ReconError::Validation(body),
        _ => ReconError::Network(format!("HTTP {status} - {body}")),
    })
}
