use async_trait::async_trait;
use recon_core::ReconResult;
use tokio::sync::mpsc;

use crate::events::DomainEvent;

/// 订阅方的事件队列；总线不会因为订阅方处理慢而丢弃事件
pub type EventReceiver = mpsc::UnboundedReceiver<DomainEvent>;

/// 进程内领域事件总线
///
/// 发布方无需注册；订阅方通过 `subscribe_all` 收到全部事件，自行按事件名过滤。
#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, event: DomainEvent) -> ReconResult<()>;

    fn subscribe_all(&self) -> EventReceiver;
}
