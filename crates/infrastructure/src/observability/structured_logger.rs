//! Structured logging utilities
//!
//! 任务与Worker生命周期事件统一用 `event = "..."` 字段标识，方便按事件检索。

use recon_core::models::Job;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Structured logging utilities
pub struct StructuredLogger;

impl StructuredLogger {
    pub fn log_job_created(job: &Job) {
        info!(
            event = "job_created",
            job.id = %job.id,
            tool.name = %job.tool_name,
            job.priority = job.priority,
            job.workflow_id = ?job.workflow_id,
            job.targets = job.target_ids.len(),
            "Job created"
        );
    }

    pub fn log_job_assigned(job: &Job, worker_id: Uuid, worker_type: &str) {
        info!(
            event = "job_assigned",
            job.id = %job.id,
            tool.name = %job.tool_name,
            worker.id = %worker_id,
            worker.name = worker_type,
            "Job assigned to worker"
        );
    }

    pub fn log_job_completed(job: &Job, worker_id: Uuid, success: bool, error_message: Option<&str>) {
        if success {
            info!(
                event = "job_completed",
                job.id = %job.id,
                tool.name = %job.tool_name,
                worker.id = %worker_id,
                "Job completed"
            );
        } else {
            error!(
                event = "job_failed",
                job.id = %job.id,
                tool.name = %job.tool_name,
                worker.id = %worker_id,
                job.error = error_message.unwrap_or("Unknown error"),
                "Job failed"
            );
        }
    }

    pub fn log_job_reclaimed(job: &Job, reason: &str, exhausted: bool) {
        let event = if exhausted {
            "job_retry_exhausted"
        } else {
            "job_reclaimed"
        };
        warn!(
            event = event,
            job.id = %job.id,
            tool.name = %job.tool_name,
            worker.id = ?job.worker_id,
            job.retry_count = job.retry_count,
            job.reclaim_reason = reason,
            "Job reclaimed by timeout sweep"
        );
    }

    pub fn log_worker_joined(worker_id: Uuid, worker_type: &str) {
        info!(
            event = "worker_joined",
            worker.id = %worker_id,
            worker.name = worker_type,
            "Worker joined"
        );
    }

    pub fn log_worker_down(worker_id: Uuid, worker_type: &str, silent_seconds: i64) {
        warn!(
            event = "worker_down",
            worker.id = %worker_id,
            worker.name = worker_type,
            worker.silent_seconds = silent_seconds,
            "Worker heartbeat timed out"
        );
    }
}
