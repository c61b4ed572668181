use std::sync::Arc;
use std::time::Duration;

use recon_core::{
    config::WorkerConfig,
    models::{built_in_tools, ToolDefinition},
    ReconError, ReconResult,
};
use tokio::sync::{broadcast, watch};
use tracing::{error, info};

use crate::backoff::Backoff;
use crate::client::DispatcherClient;
use crate::executor::CommandExecutor;
use crate::heartbeat::AliveLoop;
use crate::poller::JobPoller;
use crate::session::WorkerSession;

/// 心跳重连的最大退避
const MAX_RECONNECT_BACKOFF: Duration = Duration::from_secs(30);

/// Worker进程：心跳流与任务拉取循环相互独立地运行
pub struct WorkerService {
    config: WorkerConfig,
    session: Arc<WorkerSession>,
    executor: Arc<CommandExecutor>,
}

impl WorkerService {
    pub fn new(config: WorkerConfig) -> ReconResult<Self> {
        Self::with_tools(config, built_in_tools())
    }

    pub fn with_tools(config: WorkerConfig, tools: Vec<ToolDefinition>) -> ReconResult<Self> {
        config
            .validate()
            .map_err(|e| ReconError::Configuration(e.to_string()))?;

        let client = DispatcherClient::new(&config.dispatcher_url);
        let session = WorkerSession::new(client, &config.api_key, &config.name);
        let executor = CommandExecutor::new(
            tools,
            Duration::from_secs(config.command_timeout_seconds),
        )?;

        Ok(Self {
            config,
            session,
            executor: Arc::new(executor),
        })
    }

    pub fn session(&self) -> Arc<WorkerSession> {
        self.session.clone()
    }

    /// 运行直到收到关闭信号
    pub async fn run(&self, shutdown: &broadcast::Sender<()>) -> ReconResult<()> {
        let host = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "unknown".to_string());
        info!(
            worker.name = %self.config.name,
            host = %host,
            dispatcher = %self.config.dispatcher_url,
            "Worker启动"
        );

        let (current_job_tx, current_job_rx) = watch::channel(None);
        let heartbeat_interval = Duration::from_secs(self.config.heartbeat_interval_seconds);

        let alive = AliveLoop::new(
            self.session.clone(),
            heartbeat_interval,
            current_job_rx,
            Backoff::new(heartbeat_interval, MAX_RECONNECT_BACKOFF),
        );
        let poller = JobPoller::new(
            self.session.clone(),
            self.executor.clone(),
            current_job_tx,
            Backoff::new(
                Duration::from_millis(self.config.poll_interval_ms),
                Duration::from_millis(self.config.max_poll_backoff_ms),
            ),
        );

        let alive_handle = tokio::spawn(alive.run(shutdown.subscribe()));
        let poller_handle = tokio::spawn(poller.run(shutdown.subscribe()));

        let (alive_result, poller_result) = tokio::join!(alive_handle, poller_handle);
        for (name, result) in [("心跳循环", alive_result), ("任务拉取循环", poller_result)] {
            if let Err(e) = result {
                error!("{}异常退出: {}", name, e);
            }
        }

        self.session.disconnect().await;
        info!(worker.name = %self.config.name, "Worker已停止");
        Ok(())
    }
}
