use async_trait::async_trait;
use chrono::{DateTime, Utc};
use recon_core::{
    models::{Worker, WorkerStatus},
    traits::WorkerRepository,
    ReconError, ReconResult,
};
use sqlx::{PgPool, Row};
use tracing::debug;
use uuid::Uuid;

/// PostgreSQL Worker仓储实现
pub struct PostgresWorkerRepository {
    pool: PgPool,
}

impl PostgresWorkerRepository {
    /// 创建新的PostgreSQL Worker仓储
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_worker(row: &sqlx::postgres::PgRow) -> ReconResult<Worker> {
        Ok(Worker {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            token: row.try_get("token")?,
            status: row.try_get("status")?,
            last_seen_at: row.try_get("last_seen_at")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[async_trait]
impl WorkerRepository for PostgresWorkerRepository {
    /// 注册新的Worker
    async fn register(&self, worker: &Worker) -> ReconResult<()> {
        sqlx::query(
            r#"
            INSERT INTO workers (id, name, token, status, last_seen_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE SET
                token = EXCLUDED.token,
                status = EXCLUDED.status,
                last_seen_at = EXCLUDED.last_seen_at
            "#,
        )
        .bind(worker.id)
        .bind(&worker.name)
        .bind(&worker.token)
        .bind(worker.status)
        .bind(worker.last_seen_at)
        .bind(worker.created_at)
        .execute(&self.pool)
        .await
        .map_err(ReconError::Database)?;

        debug!("注册Worker成功: {} ({})", worker.id, worker.name);
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> ReconResult<Option<Worker>> {
        let row = sqlx::query(
            "SELECT id, name, token, status, last_seen_at, created_at FROM workers WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(ReconError::Database)?;

        row.as_ref().map(Self::row_to_worker).transpose()
    }

    async fn touch(&self, id: Uuid, now: DateTime<Utc>) -> ReconResult<bool> {
        let result = sqlx::query("UPDATE workers SET last_seen_at = $2, status = $3 WHERE id = $1")
            .bind(id)
            .bind(now)
            .bind(WorkerStatus::Alive)
            .execute(&self.pool)
            .await
            .map_err(ReconError::Database)?;

        Ok(result.rows_affected() == 1)
    }

    async fn find_stale(&self, seen_before: DateTime<Utc>) -> ReconResult<Vec<Worker>> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, token, status, last_seen_at, created_at FROM workers
            WHERE status = 'ALIVE' AND last_seen_at < $1
            "#,
        )
        .bind(seen_before)
        .fetch_all(&self.pool)
        .await
        .map_err(ReconError::Database)?;

        rows.iter().map(Self::row_to_worker).collect()
    }

    async fn mark_down(&self, id: Uuid) -> ReconResult<bool> {
        let result = sqlx::query("UPDATE workers SET status = $2 WHERE id = $1 AND status = 'ALIVE'")
            .bind(id)
            .bind(WorkerStatus::Down)
            .execute(&self.pool)
            .await
            .map_err(ReconError::Database)?;

        Ok(result.rows_affected() == 1)
    }

    async fn find_down_before(&self, seen_before: DateTime<Utc>) -> ReconResult<Vec<Worker>> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, token, status, last_seen_at, created_at FROM workers
            WHERE status = 'DOWN' AND last_seen_at < $1
            "#,
        )
        .bind(seen_before)
        .fetch_all(&self.pool)
        .await
        .map_err(ReconError::Database)?;

        rows.iter().map(Self::row_to_worker).collect()
    }

    async fn delete_offline(&self, id: Uuid, seen_before: DateTime<Utc>) -> ReconResult<bool> {
        let result = sqlx::query(
            r#"
            DELETE FROM workers w
            WHERE w.id = $1 AND w.status = 'DOWN' AND w.last_seen_at < $2
              AND NOT EXISTS (
                  SELECT 1 FROM jobs j
                  WHERE j.worker_id = w.id AND j.status IN ('ASSIGNED', 'RUNNING')
              )
            "#,
        )
        .bind(id)
        .bind(seen_before)
        .execute(&self.pool)
        .await
        .map_err(ReconError::Database)?;

        if result.rows_affected() == 1 {
            debug!("删除离线Worker: {}", id);
        }
        Ok(result.rows_affected() == 1)
    }

    async fn count_alive(&self) -> ReconResult<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM workers WHERE status = 'ALIVE'")
            .fetch_one(&self.pool)
            .await
            .map_err(ReconError::Database)
    }
}
