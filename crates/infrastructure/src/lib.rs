pub mod cache;
pub mod database;
pub mod event_bus;
pub mod memory;
pub mod observability;

pub use cache::{InMemoryLockStore, RedisLockStore};
pub use database::*;
pub use event_bus::InMemoryEventBus;
pub use observability::{MetricsCollector, StructuredLogger};
