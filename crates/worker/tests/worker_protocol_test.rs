//! 用内存中的模拟编排核心验证Worker端协议

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use chrono::Utc;
use futures::StreamExt;
use recon_core::models::{
    HeartbeatAck, HeartbeatFrame, Job, JobResultPayload, JobStatus, JoinRequest, JoinResponse,
    NextJobResponse, ResultAck, ToolDefinition,
};
use recon_core::ReconError;
use recon_worker::{
    Backoff, CommandExecutor, DispatcherClient, JobPoller, PollOutcome, SessionState,
    WorkerSession,
};
use serde_json::json;
use tokio::sync::watch;
use uuid::Uuid;

const API_KEY: &str = "worker-key";

#[derive(Default)]
struct MockState {
    worker_id: Uuid,
    joins: u32,
    /// 该令牌在 Next 上被当作已过期
    expired_token: Option<String>,
    pending: VecDeque<Job>,
    results: Vec<(Uuid, JobResultPayload)>,
}

type Shared = Arc<Mutex<MockState>>;

fn bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string)
}

async fn join(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(_request): Json<JoinRequest>,
) -> impl IntoResponse {
    if headers.get("X-API-Key").and_then(|v| v.to_str().ok()) != Some(API_KEY) {
        return (StatusCode::UNAUTHORIZED, "bad key").into_response();
    }
    let mut state = state.lock().unwrap();
    state.joins += 1;
    let response = JoinResponse {
        worker_id: state.worker_id,
        token: format!("token-{}", state.joins),
    };
    Json(response).into_response()
}

async fn next(State(state): State<Shared>, headers: HeaderMap) -> impl IntoResponse {
    let mut state = state.lock().unwrap();
    let token = bearer(&headers);
    if token.is_none() || token == state.expired_token {
        return (StatusCode::UNAUTHORIZED, "expired").into_response();
    }
    Json(NextJobResponse {
        job: state.pending.pop_front(),
    })
    .into_response()
}

async fn result(
    State(state): State<Shared>,
    Path(job_id): Path<Uuid>,
    Json(payload): Json<JobResultPayload>,
) -> impl IntoResponse {
    let status = if payload.is_failure() {
        JobStatus::Failed
    } else {
        JobStatus::Done
    };
    state.lock().unwrap().results.push((job_id, payload));
    Json(ResultAck {
        job_id,
        status,
        duplicate: false,
    })
}

async fn alive(State(state): State<Shared>, body: String) -> impl IntoResponse {
    let worker_id = state.lock().unwrap().worker_id;
    body.lines()
        .filter_map(|line| serde_json::from_str::<HeartbeatFrame>(line).ok())
        .map(|_| {
            let ack = HeartbeatAck {
                worker_id,
                received_at: Utc::now(),
            };
            format!("{}\n", serde_json::to_string(&ack).unwrap())
        })
        .collect::<String>()
}

async fn start_mock(state: Shared) -> String {
    let app = Router::new()
        .route("/api/v1/workers/join", post(join))
        .route("/api/v1/workers/alive", post(alive))
        .route("/api/v1/jobs/next", post(next))
        .route("/api/v1/jobs/{id}/result", post(result))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{address}")
}

fn subfinder() -> ToolDefinition {
    ToolDefinition::built_in("subfinder", "subdomains", "cat", "subdomains")
}

fn poller_for(session: Arc<WorkerSession>) -> (JobPoller, watch::Receiver<Option<Uuid>>) {
    let executor = CommandExecutor::new(vec![subfinder()], Duration::from_secs(5)).unwrap();
    let (tx, rx) = watch::channel(None);
    let poller = JobPoller::new(
        session,
        Arc::new(executor),
        tx,
        Backoff::new(Duration::from_millis(10), Duration::from_millis(100)),
    );
    (poller, rx)
}

#[tokio::test]
async fn test_join_with_wrong_key_is_authentication_error() {
    let state = Shared::default();
    let url = start_mock(state.clone()).await;

    let client = DispatcherClient::new(&url);
    let error = client.join("wrong", "subdomains").await.unwrap_err();
    assert!(matches!(error, ReconError::Authentication(_)));

    let joined = client.join(API_KEY, "subdomains").await.unwrap();
    assert_eq!(joined.token, "token-1");
}

#[cfg(unix)]
#[tokio::test]
async fn test_poll_executes_job_and_submits_result() {
    let state = Shared::default();
    let tool = subfinder();
    let mut job = Job::new(tool.id, &tool.name, &tool.category, 10);
    job.values = vec!["a.example.com".to_string(), "b.example.com".to_string()];
    state.lock().unwrap().pending.push_back(job.clone());

    let url = start_mock(state.clone()).await;
    let session = WorkerSession::new(DispatcherClient::new(&url), API_KEY, "subdomains");
    let (poller, current_job) = poller_for(session.clone());

    match poller.poll_once().await.unwrap() {
        PollOutcome::Completed(ack) => {
            assert_eq!(ack.job_id, job.id);
            assert_eq!(ack.status, JobStatus::Done);
        }
        other => panic!("expected completed job, got {other:?}"),
    }
    assert_eq!(*current_job.borrow(), None);
    assert_eq!(session.state().await, SessionState::Alive);

    {
        let state = state.lock().unwrap();
        assert_eq!(state.results.len(), 1);
        let (job_id, payload) = &state.results[0];
        assert_eq!(*job_id, job.id);
        assert_eq!(payload.results.as_ref().map(Vec::len), Some(2));
        assert!(payload.output.is_none());
    }

    assert_eq!(poller.poll_once().await.unwrap(), PollOutcome::Idle);
    assert_eq!(state.lock().unwrap().joins, 1);
}

#[tokio::test]
async fn test_expired_token_triggers_rejoin() {
    let state = Shared::default();
    state.lock().unwrap().expired_token = Some("token-1".to_string());

    let url = start_mock(state.clone()).await;
    let session = WorkerSession::new(DispatcherClient::new(&url), API_KEY, "subdomains");
    let (poller, _current_job) = poller_for(session.clone());

    let error = poller.poll_once().await.unwrap_err();
    assert!(matches!(error, ReconError::Authentication(_)));
    assert!(session.credentials().await.is_none());
    assert_eq!(session.state().await, SessionState::Unregistered);

    assert_eq!(poller.poll_once().await.unwrap(), PollOutcome::Idle);
    let credentials = session.credentials().await.unwrap();
    assert_eq!(credentials.token, "token-2");
    assert_eq!(state.lock().unwrap().joins, 2);
}

#[tokio::test]
async fn test_alive_stream_yields_acknowledgements() {
    let state = Shared::default();
    let worker_id = Uuid::new_v4();
    state.lock().unwrap().worker_id = worker_id;

    let url = start_mock(state).await;
    let client = DispatcherClient::new(&url);
    let joined = client.join(API_KEY, "subdomains").await.unwrap();

    let frames = futures::stream::iter(vec![
        HeartbeatFrame {
            job_id: None,
            sent_at: Utc::now(),
        },
        HeartbeatFrame {
            job_id: Some(Uuid::new_v4()),
            sent_at: Utc::now(),
        },
    ]);
    let acks = client.open_alive(&joined.token, frames).await.unwrap();
    let acks: Vec<_> = acks.collect().await;

    assert_eq!(acks.len(), 2);
    for ack in acks {
        assert_eq!(ack.unwrap().worker_id, worker_id);
    }
}

#[tokio::test]
async fn test_alive_rejected_without_valid_token() {
    let app = Router::new().route(
        "/api/v1/workers/alive",
        post(|| async { (StatusCode::UNAUTHORIZED, Json(json!({"error": "expired"}))) }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let client = DispatcherClient::new(&format!("http://{address}"));
    let result = client
        .open_alive("stale", futures::stream::empty::<HeartbeatFrame>())
        .await;
    assert!(matches!(result, Err(ReconError::Authentication(_))));
}
