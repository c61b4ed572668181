//! Worker会话状态机
//!
//! `Unregistered → Joining → Alive ⇄ Polling → Disconnected`
//!
//! 凭证（Worker id + 令牌）在Alive流和拉取循环之间共享。任一方遇到401都会作废当前凭证，
//! 下一次使用时重新Join。

use std::fmt;
use std::sync::Arc;

use recon_core::ReconResult;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::client::DispatcherClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unregistered,
    Joining,
    Alive,
    Polling,
    Disconnected,
}

impl SessionState {
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Unregistered, Joining)
                | (Joining, Alive)
                | (Joining, Unregistered)
                | (Alive, Polling)
                | (Polling, Alive)
                | (Alive, Unregistered)
                | (Polling, Unregistered)
                | (_, Disconnected)
        ) && self != Disconnected
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Unregistered => "UNREGISTERED",
            SessionState::Joining => "JOINING",
            SessionState::Alive => "ALIVE",
            SessionState::Polling => "POLLING",
            SessionState::Disconnected => "DISCONNECTED",
        };
        f.write_str(name)
    }
}

/// Join换来的身份
#[derive(Debug, Clone, PartialEq)]
pub struct Credentials {
    pub worker_id: Uuid,
    pub token: String,
}

#[derive(Debug)]
struct SessionInner {
    state: SessionState,
    credentials: Option<Credentials>,
}

pub struct WorkerSession {
    client: DispatcherClient,
    api_key: String,
    name: String,
    inner: RwLock<SessionInner>,
    // 串行化Join，避免心跳和拉取同时重新注册
    join_lock: Mutex<()>,
}

impl WorkerSession {
    pub fn new(client: DispatcherClient, api_key: &str, name: &str) -> Arc<Self> {
        Arc::new(Self {
            client,
            api_key: api_key.to_string(),
            name: name.to_string(),
            inner: RwLock::new(SessionInner {
                state: SessionState::Unregistered,
                credentials: None,
            }),
            join_lock: Mutex::new(()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn client(&self) -> &DispatcherClient {
        &self.client
    }

    pub async fn state(&self) -> SessionState {
        self.inner.read().await.state
    }

    pub async fn credentials(&self) -> Option<Credentials> {
        self.inner.read().await.credentials.clone()
    }

    /// 状态迁移；非法迁移被忽略并返回 false
    pub async fn transition(&self, next: SessionState) -> bool {
        let mut inner = self.inner.write().await;
        if inner.state == next {
            return true;
        }
        if !inner.state.can_transition_to(next) {
            debug!("忽略非法的会话状态迁移: {} -> {}", inner.state, next);
            return false;
        }
        debug!("会话状态: {} -> {}", inner.state, next);
        inner.state = next;
        true
    }

    /// 返回当前凭证，没有时先Join
    pub async fn ensure_joined(&self) -> ReconResult<Credentials> {
        if let Some(credentials) = self.credentials().await {
            return Ok(credentials);
        }

        let _guard = self.join_lock.lock().await;
        if let Some(credentials) = self.credentials().await {
            return Ok(credentials);
        }

        self.transition(SessionState::Joining).await;
        match self.client.join(&self.api_key, &self.name).await {
            Ok(joined) => {
                let credentials = Credentials {
                    worker_id: joined.worker_id,
                    token: joined.token,
                };
                let mut inner = self.inner.write().await;
                inner.credentials = Some(credentials.clone());
                inner.state = SessionState::Alive;
                info!(worker.id = %credentials.worker_id, worker.name = %self.name, "Worker已注册");
                Ok(credentials)
            }
            Err(e) => {
                self.transition(SessionState::Unregistered).await;
                Err(e)
            }
        }
    }

    /// 令牌被拒绝后作废凭证；只作废仍是同一令牌的凭证
    pub async fn invalidate(&self, token: &str) {
        let mut inner = self.inner.write().await;
        if inner.state == SessionState::Disconnected {
            return;
        }
        if inner.credentials.as_ref().is_some_and(|c| c.token == token) {
            warn!(worker.name = %self.name, "Worker令牌失效，需要重新注册");
            inner.credentials = None;
            inner.state = SessionState::Unregistered;
        }
    }

    pub async fn disconnect(&self) {
        let mut inner = self.inner.write().await;
        inner.state = SessionState::Disconnected;
        info!(worker.name = %self.name, "Worker会话已断开");
    }
}
