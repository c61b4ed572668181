//! Metrics collector
//!
//! 使用 `metrics` 门面记录指标，可选安装 Prometheus HTTP exporter。

use anyhow::{Context, Result};
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

/// 安装 Prometheus exporter，监听 `bind_address`
pub fn init_metrics_exporter(bind_address: &str) -> Result<()> {
    let addr: SocketAddr = bind_address
        .parse()
        .with_context(|| format!("无效的指标监听地址: {bind_address}"))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("安装Prometheus exporter失败")?;

    info!("Prometheus指标导出已启动: {}", addr);
    Ok(())
}

/// 编排核心的指标
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsCollector;

impl MetricsCollector {
    pub fn new() -> Self {
        Self
    }

    pub fn record_jobs_created(&self, tool: &str, count: usize) {
        counter!("recon_jobs_created_total", "tool" => tool.to_string()).increment(count as u64);
    }

    pub fn record_job_assigned(&self, worker_type: &str) {
        counter!("recon_jobs_assigned_total", "worker_type" => worker_type.to_string())
            .increment(1);
    }

    pub fn record_job_finished(&self, tool: &str, success: bool, duration_seconds: Option<f64>) {
        let status = if success { "done" } else { "failed" };
        counter!("recon_jobs_finished_total", "tool" => tool.to_string(), "status" => status)
            .increment(1);
        if let Some(duration) = duration_seconds {
            histogram!("recon_job_duration_seconds", "tool" => tool.to_string()).record(duration);
        }
    }

    pub fn record_job_reclaimed(&self, tool: &str, exhausted: bool) {
        let outcome = if exhausted { "failed" } else { "requeued" };
        counter!("recon_jobs_reclaimed_total", "tool" => tool.to_string(), "outcome" => outcome)
            .increment(1);
    }

    pub fn record_lock_busy(&self, key_prefix: &str) {
        counter!("recon_lock_busy_total", "lock" => key_prefix.to_string()).increment(1);
    }

    pub fn record_workflow_triggered(&self, topic: &str) {
        counter!("recon_workflow_triggers_total", "topic" => topic.to_string()).increment(1);
    }

    pub fn update_alive_workers(&self, count: f64) {
        gauge!("recon_alive_workers").set(count);
    }
}
