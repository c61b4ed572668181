//! Worker进程
//!
//! 向编排核心注册，保持Alive心跳流，按工具类型拉取任务、执行命令并提交标准化结果。

pub mod backoff;
pub mod client;
pub mod executor;
pub mod heartbeat;
pub mod poller;
pub mod service;
pub mod session;

pub use backoff::Backoff;
pub use client::DispatcherClient;
pub use executor::CommandExecutor;
pub use heartbeat::AliveLoop;
pub use poller::{JobPoller, PollOutcome};
pub use service::WorkerService;
pub use session::{Credentials, SessionState, WorkerSession};
