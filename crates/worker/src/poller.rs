//! 任务拉取循环
//!
//! `Next` 返回空时按指数退避等待，不做忙等；拿到任务就执行并提交结果，随后立即再次拉取。

use std::sync::Arc;

use recon_core::{models::ResultAck, ReconError, ReconResult};
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::backoff::Backoff;
use crate::executor::CommandExecutor;
use crate::session::{Credentials, SessionState, WorkerSession};

#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// 没有可领取的任务
    Idle,
    Completed(ResultAck),
}

pub struct JobPoller {
    session: Arc<WorkerSession>,
    executor: Arc<CommandExecutor>,
    current_job: watch::Sender<Option<Uuid>>,
    backoff: Backoff,
}

impl JobPoller {
    pub fn new(
        session: Arc<WorkerSession>,
        executor: Arc<CommandExecutor>,
        current_job: watch::Sender<Option<Uuid>>,
        backoff: Backoff,
    ) -> Self {
        Self {
            session,
            executor,
            current_job,
            backoff,
        }
    }

    /// 拉取并执行一个任务
    pub async fn poll_once(&self) -> ReconResult<PollOutcome> {
        let credentials = self.session.ensure_joined().await?;

        self.session.transition(SessionState::Polling).await;
        let result = self.poll_with(&credentials).await;
        self.session.transition(SessionState::Alive).await;

        if let Err(ReconError::Authentication(_)) = &result {
            self.session.invalidate(&credentials.token).await;
        }
        result
    }

    async fn poll_with(&self, credentials: &Credentials) -> ReconResult<PollOutcome> {
        let client = self.session.client();
        let Some(job) = client.next(&credentials.token).await? else {
            return Ok(PollOutcome::Idle);
        };

        info!(
            job.id = %job.id,
            tool = %job.tool_name,
            values = job.values.len(),
            retry = job.retry_count,
            "领取到任务"
        );
        self.current_job.send_replace(Some(job.id));

        let payload = self.executor.execute(&job).await;
        let ack = client
            .submit_result(&credentials.token, credentials.worker_id, job.id, &payload)
            .await;
        self.current_job.send_replace(None);

        let ack = ack?;
        debug!(job.id = %ack.job_id, status = %ack.status, duplicate = ack.duplicate, "结果已提交");
        Ok(PollOutcome::Completed(ack))
    }

    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        info!(worker.name = %self.session.name(), "任务拉取循环已启动");

        loop {
            let outcome = tokio::select! {
                outcome = self.poll_once() => outcome,
                _ = shutdown.recv() => break,
            };

            let delay = match outcome {
                Ok(PollOutcome::Completed(_)) => {
                    self.backoff.reset();
                    continue;
                }
                Ok(PollOutcome::Idle) => self.backoff.next_delay(),
                Err(ReconError::StaleResult { job_id, .. }) => {
                    warn!(job.id = %job_id, "任务已被回收并重新分配，丢弃本次结果");
                    self.backoff.reset();
                    continue;
                }
                Err(e) => {
                    warn!("拉取任务失败: {}", e);
                    self.backoff.next_delay()
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.recv() => break,
            }
        }

        self.current_job.send_replace(None);
        info!("任务拉取循环已停止");
    }
}
