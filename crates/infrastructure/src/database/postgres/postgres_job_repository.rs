use async_trait::async_trait;
use chrono::{DateTime, Utc};
use recon_core::{
    models::{Job, JobStatus},
    traits::JobRepository,
    ReconError, ReconResult,
};
use sqlx::{PgPool, Row};
use tracing::debug;
use uuid::Uuid;

const JOB_COLUMNS: &str = "id, tool_id, tool_name, category, target_ids, asset_ids, input_values, \
     workspace_id, workflow_id, priority, status, worker_id, retry_count, is_save_raw_result, \
     error_message, created_at, started_at, completed_at";

/// PostgreSQL 任务仓储实现
///
/// 所有状态变更都是带前置条件的 UPDATE，以受影响行数判断是否成功。
pub struct PostgresJobRepository {
    pool: PgPool,
}

impl PostgresJobRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_job(row: &sqlx::postgres::PgRow) -> ReconResult<Job> {
        Ok(Job {
            id: row.try_get("id")?,
            tool_id: row.try_get("tool_id")?,
            tool_name: row.try_get("tool_name")?,
            category: row.try_get("category")?,
            target_ids: row.try_get("target_ids")?,
            asset_ids: row.try_get("asset_ids")?,
            values: row.try_get("input_values")?,
            workspace_id: row.try_get("workspace_id")?,
            workflow_id: row.try_get("workflow_id")?,
            priority: row.try_get("priority")?,
            status: row.try_get("status")?,
            worker_id: row.try_get("worker_id")?,
            retry_count: row.try_get("retry_count")?,
            is_save_raw_result: row.try_get("is_save_raw_result")?,
            error_message: row.try_get("error_message")?,
            created_at: row.try_get("created_at")?,
            started_at: row.try_get("started_at")?,
            completed_at: row.try_get("completed_at")?,
        })
    }
}

#[async_trait]
impl JobRepository for PostgresJobRepository {
    async fn create_many(&self, jobs: &[Job]) -> ReconResult<()> {
        let mut tx = self.pool.begin().await.map_err(ReconError::Database)?;

        for job in jobs {
            sqlx::query(
                r#"
                INSERT INTO jobs (id, tool_id, tool_name, category, target_ids, asset_ids, input_values,
                                  workspace_id, workflow_id, priority, status, retry_count,
                                  is_save_raw_result, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
                "#,
            )
            .bind(job.id)
            .bind(job.tool_id)
            .bind(&job.tool_name)
            .bind(&job.category)
            .bind(&job.target_ids)
            .bind(&job.asset_ids)
            .bind(&job.values)
            .bind(job.workspace_id)
            .bind(job.workflow_id)
            .bind(job.priority)
            .bind(job.status)
            .bind(job.retry_count)
            .bind(job.is_save_raw_result)
            .bind(job.created_at)
            .execute(&mut *tx)
            .await
            .map_err(ReconError::Database)?;
        }

        tx.commit().await.map_err(ReconError::Database)?;
        debug!("批量创建任务成功: {} 个", jobs.len());
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> ReconResult<Option<Job>> {
        let row = sqlx::query(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(ReconError::Database)?;

        row.as_ref().map(Self::row_to_job).transpose()
    }

    async fn find_next_pending(&self, worker_type: &str) -> ReconResult<Option<Job>> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {JOB_COLUMNS} FROM jobs
            WHERE status = 'PENDING' AND (category = $1 OR tool_name = $1)
            ORDER BY priority ASC, created_at ASC
            LIMIT 1
            "#
        ))
        .bind(worker_type)
        .fetch_optional(&self.pool)
        .await
        .map_err(ReconError::Database)?;

        row.as_ref().map(Self::row_to_job).transpose()
    }

    async fn claim(&self, job_id: Uuid, worker_id: Uuid, now: DateTime<Utc>) -> ReconResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE jobs SET status = $3, worker_id = $2, started_at = $4
            WHERE id = $1 AND status = 'PENDING'
            "#,
        )
        .bind(job_id)
        .bind(worker_id)
        .bind(JobStatus::Assigned)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(ReconError::Database)?;

        Ok(result.rows_affected() == 1)
    }

    async fn mark_running(&self, job_id: Uuid, worker_id: Uuid) -> ReconResult<bool> {
        let result = sqlx::query(
            "UPDATE jobs SET status = $3 WHERE id = $1 AND worker_id = $2 AND status = 'ASSIGNED'",
        )
        .bind(job_id)
        .bind(worker_id)
        .bind(JobStatus::Running)
        .execute(&self.pool)
        .await
        .map_err(ReconError::Database)?;

        Ok(result.rows_affected() == 1)
    }

    async fn complete(
        &self,
        job_id: Uuid,
        worker_id: Uuid,
        status: JobStatus,
        error_message: Option<&str>,
        now: DateTime<Utc>,
    ) -> ReconResult<bool> {
        if !status.is_terminal() {
            return Err(ReconError::Validation(format!(
                "任务只能完成为 DONE 或 FAILED，收到 {status}"
            )));
        }

        let result = sqlx::query(
            r#"
            UPDATE jobs SET status = $3, error_message = $4, completed_at = $5
            WHERE id = $1 AND worker_id = $2 AND status IN ('ASSIGNED', 'RUNNING')
            "#,
        )
        .bind(job_id)
        .bind(worker_id)
        .bind(status)
        .bind(error_message)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(ReconError::Database)?;

        Ok(result.rows_affected() == 1)
    }

    async fn find_in_flight(&self) -> ReconResult<Vec<Job>> {
        let rows = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE status IN ('ASSIGNED', 'RUNNING') ORDER BY started_at"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(ReconError::Database)?;

        rows.iter().map(Self::row_to_job).collect()
    }

    async fn requeue(&self, job_id: Uuid, expected_worker: Uuid) -> ReconResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'PENDING', worker_id = NULL, started_at = NULL, retry_count = retry_count + 1
            WHERE id = $1 AND worker_id = $2 AND status IN ('ASSIGNED', 'RUNNING')
            "#,
        )
        .bind(job_id)
        .bind(expected_worker)
        .execute(&self.pool)
        .await
        .map_err(ReconError::Database)?;

        Ok(result.rows_affected() == 1)
    }

    async fn fail_in_flight(
        &self,
        job_id: Uuid,
        expected_worker: Uuid,
        reason: &str,
        now: DateTime<Utc>,
    ) -> ReconResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE jobs SET status = 'FAILED', error_message = $3, completed_at = $4
            WHERE id = $1 AND worker_id = $2 AND status IN ('ASSIGNED', 'RUNNING')
            "#,
        )
        .bind(job_id)
        .bind(expected_worker)
        .bind(reason)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(ReconError::Database)?;

        Ok(result.rows_affected() == 1)
    }
}
