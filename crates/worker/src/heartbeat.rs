//! Alive心跳流
//!
//! 按固定间隔发送心跳帧（附带当前执行的任务），消费服务端确认。连接断开后按指数退避重连，
//! 令牌被拒绝时作废凭证并重新Join。

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::{Stream, StreamExt};
use recon_core::{models::HeartbeatFrame, ReconError, ReconResult};
use tokio::sync::{broadcast, watch};
use tokio_stream::wrappers::IntervalStream;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::backoff::Backoff;
use crate::session::WorkerSession;

pub struct AliveLoop {
    session: Arc<WorkerSession>,
    interval: Duration,
    current_job: watch::Receiver<Option<Uuid>>,
    backoff: Backoff,
}

impl AliveLoop {
    pub fn new(
        session: Arc<WorkerSession>,
        interval: Duration,
        current_job: watch::Receiver<Option<Uuid>>,
        backoff: Backoff,
    ) -> Self {
        Self {
            session,
            interval,
            current_job,
            backoff,
        }
    }

    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        info!(worker.name = %self.session.name(), "心跳循环已启动");

        loop {
            let result = tokio::select! {
                result = self.stream_once() => result,
                _ = shutdown.recv() => break,
            };

            match result {
                Ok(()) => debug!("Alive流被服务端关闭，准备重连"),
                Err(e) => warn!("Alive流中断: {}", e),
            }

            let delay = self.backoff.next_delay();
            debug!("{}ms 后重连Alive流", delay.as_millis());
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.recv() => break,
            }
        }

        info!("心跳循环已停止");
    }

    /// 建立一次Alive流并持续消费确认，直到流结束或出错
    async fn stream_once(&mut self) -> ReconResult<()> {
        let session = self.session.clone();
        let credentials = session.ensure_joined().await?;

        let frames = heartbeat_frames(self.interval, self.current_job.clone());
        let acks = match session.client().open_alive(&credentials.token, frames).await {
            Ok(acks) => acks,
            Err(e @ ReconError::Authentication(_)) => {
                session.invalidate(&credentials.token).await;
                return Err(e);
            }
            Err(e) => return Err(e),
        };
        let mut acks = std::pin::pin!(acks);

        while let Some(ack) = acks.next().await {
            let ack = ack?;
            self.backoff.reset();
            debug!(worker.id = %ack.worker_id, received_at = %ack.received_at, "收到心跳确认");
        }
        Ok(())
    }
}

/// 心跳帧流，首帧立即发出
pub fn heartbeat_frames(
    period: Duration,
    current_job: watch::Receiver<Option<Uuid>>,
) -> impl Stream<Item = HeartbeatFrame> + Send + 'static {
    IntervalStream::new(tokio::time::interval(period)).map(move |_| HeartbeatFrame {
        job_id: *current_job.borrow(),
        sent_at: Utc::now(),
    })
}
