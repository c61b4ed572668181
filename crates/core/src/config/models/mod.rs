pub mod api_observability;
pub mod app_config;
pub mod cache_auth;
pub mod database;
pub mod dispatcher_worker;

pub use api_observability::{ApiConfig, ObservabilityConfig};
pub use app_config::AppConfig;
pub use cache_auth::{AuthConfig, CacheConfig, LockBackend};
pub use database::DatabaseConfig;
pub use dispatcher_worker::{DispatcherConfig, WorkerConfig};
