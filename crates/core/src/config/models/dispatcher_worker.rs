use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    pub enabled: bool,
    /// 超时回收扫描间隔
    pub reclaim_interval_seconds: u64,
    /// 任务执行超时，超过即回收（与心跳超时相互独立）
    pub job_timeout_seconds: i64,
    /// 心跳超时，超过即认为Worker已失联
    pub heartbeat_timeout_seconds: i64,
    /// 回收重试上限，超过后任务进入FAILED
    pub max_retries: i32,
    /// 资产组定时工作流检查间隔
    pub schedule_interval_seconds: u64,
    pub next_lock_ttl_ms: u64,
    pub schedule_lock_ttl_ms: u64,
    /// 自动删除长期离线且不持有在途任务的Worker
    pub auto_cleanup_offline_workers: bool,
    /// 离线超过该时长（秒，按最近心跳计）才会被删除
    pub offline_cleanup_threshold_seconds: i64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            reclaim_interval_seconds: 5,
            job_timeout_seconds: 3600,
            heartbeat_timeout_seconds: 10,
            max_retries: 3,
            schedule_interval_seconds: 60,
            next_lock_ttl_ms: 5_000,
            schedule_lock_ttl_ms: 30_000,
            auto_cleanup_offline_workers: true,
            offline_cleanup_threshold_seconds: 300,
        }
    }
}

impl DispatcherConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.reclaim_interval_seconds == 0 {
            return Err(anyhow::anyhow!("回收扫描间隔必须大于0"));
        }

        if self.heartbeat_timeout_seconds <= 0 {
            return Err(anyhow::anyhow!("心跳超时时间必须大于0"));
        }

        if self.job_timeout_seconds <= self.heartbeat_timeout_seconds {
            return Err(anyhow::anyhow!(
                "任务超时时间({})必须大于心跳超时时间({})",
                self.job_timeout_seconds,
                self.heartbeat_timeout_seconds
            ));
        }

        if self.max_retries < 0 {
            return Err(anyhow::anyhow!("重试上限不能为负数"));
        }

        if self.schedule_interval_seconds == 0 {
            return Err(anyhow::anyhow!("调度间隔必须大于0"));
        }

        if self.next_lock_ttl_ms == 0 || self.schedule_lock_ttl_ms == 0 {
            return Err(anyhow::anyhow!("锁TTL必须大于0"));
        }

        if self.auto_cleanup_offline_workers
            && self.offline_cleanup_threshold_seconds <= self.heartbeat_timeout_seconds
        {
            return Err(anyhow::anyhow!(
                "离线清理阈值({})必须大于心跳超时时间({})",
                self.offline_cleanup_threshold_seconds,
                self.heartbeat_timeout_seconds
            ));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub enabled: bool,
    pub dispatcher_url: String,
    pub api_key: String,
    /// Worker类型标识，对应工具类别或工具名
    pub name: String,
    pub poll_interval_ms: u64,
    pub max_poll_backoff_ms: u64,
    pub heartbeat_interval_seconds: u64,
    pub command_timeout_seconds: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            dispatcher_url: "http://127.0.0.1:8080".to_string(),
            api_key: String::new(),
            name: "subdomains".to_string(),
            poll_interval_ms: 1_000,
            max_poll_backoff_ms: 30_000,
            heartbeat_interval_seconds: 3,
            command_timeout_seconds: 1800,
        }
    }
}

impl WorkerConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.dispatcher_url.is_empty() {
            return Err(anyhow::anyhow!("Dispatcher地址不能为空"));
        }

        if !self.dispatcher_url.starts_with("http://") && !self.dispatcher_url.starts_with("https://")
        {
            return Err(anyhow::anyhow!("Dispatcher地址格式无效: {}", self.dispatcher_url));
        }

        if self.name.is_empty() {
            return Err(anyhow::anyhow!("Worker类型不能为空"));
        }

        if self.poll_interval_ms == 0 {
            return Err(anyhow::anyhow!("轮询间隔必须大于0"));
        }

        if self.max_poll_backoff_ms < self.poll_interval_ms {
            return Err(anyhow::anyhow!("最大轮询退避不能小于轮询间隔"));
        }

        if self.heartbeat_interval_seconds == 0 {
            return Err(anyhow::anyhow!("心跳间隔必须大于0"));
        }

        if self.command_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("命令超时时间必须大于0"));
        }

        Ok(())
    }
}
