//! Observability module
//!
//! 任务生命周期的结构化日志与 Prometheus 指标。

pub mod metrics_collector;
pub mod structured_logger;

pub use metrics_collector::{init_metrics_exporter, MetricsCollector};
pub use structured_logger::StructuredLogger;
