use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use recon_core::ReconResult;
use recon_domain::{DomainEvent, EventBus, EventReceiver};
use tokio::sync::mpsc;
use tracing::debug;

/// 进程内事件总线：每个订阅方一条无界队列
///
/// 处理慢的订阅方只会积压，不会丢事件；接收端被丢弃的订阅在下次发布时移除。
#[derive(Debug, Clone, Default)]
pub struct InMemoryEventBus {
    subscribers: Arc<Mutex<Vec<mpsc::UnboundedSender<DomainEvent>>>>,
}

impl InMemoryEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn publish(&self, event: DomainEvent) -> ReconResult<()> {
        let topic = event.topic();
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        debug!(topic = %topic, receivers = subscribers.len(), "事件已发布");
        Ok(())
    }

    fn subscribe_all(&self) -> EventReceiver {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }
}
