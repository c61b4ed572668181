use async_trait::async_trait;
use chrono::{DateTime, Utc};
use recon_core::{
    models::{AssetGroupWorkflow, GroupAsset, Workflow, WorkflowContent, WorkflowSchedule},
    traits::{AssetGroupWorkflowRepository, WorkflowRepository},
    ReconError, ReconResult,
};
use sqlx::{types::Json, PgPool, Row};
use uuid::Uuid;

/// PostgreSQL 工作流只读仓储
pub struct PostgresWorkflowRepository {
    pool: PgPool,
}

impl PostgresWorkflowRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_workflow(row: &sqlx::postgres::PgRow) -> ReconResult<Workflow> {
        let content: Json<WorkflowContent> = row.try_get("content")?;
        Ok(Workflow {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            content: content.0,
            file_path: row.try_get("file_path")?,
        })
    }
}

#[async_trait]
impl WorkflowRepository for PostgresWorkflowRepository {
    async fn find_triggered_by(&self, kind: &str, action: &str) -> ReconResult<Vec<Workflow>> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, content, file_path FROM workflows
            WHERE triggers @> jsonb_build_object($1::text, jsonb_build_array($2::text))
            ORDER BY created_at
            "#,
        )
        .bind(kind)
        .bind(action)
        .fetch_all(&self.pool)
        .await
        .map_err(ReconError::Database)?;

        rows.iter().map(Self::row_to_workflow).collect()
    }

    async fn get_by_id(&self, id: Uuid) -> ReconResult<Option<Workflow>> {
        let row = sqlx::query("SELECT id, name, content, file_path FROM workflows WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(ReconError::Database)?;

        row.as_ref().map(Self::row_to_workflow).transpose()
    }
}

/// PostgreSQL 资产组定时工作流仓储
pub struct PostgresAssetGroupWorkflowRepository {
    pool: PgPool,
}

impl PostgresAssetGroupWorkflowRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_binding(row: &sqlx::postgres::PgRow) -> ReconResult<AssetGroupWorkflow> {
        let schedule: Option<String> = row.try_get("schedule")?;
        Ok(AssetGroupWorkflow {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            asset_group_id: row.try_get("asset_group_id")?,
            workflow_id: row.try_get("workflow_id")?,
            workspace_id: row.try_get("workspace_id")?,
            schedule: schedule
                .filter(|s| !s.trim().is_empty())
                .map(|s| WorkflowSchedule::parse(&s)),
            job_id: row.try_get("job_id")?,
            last_run_at: row.try_get("last_run_at")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

const BINDING_COLUMNS: &str =
    "id, name, asset_group_id, workflow_id, workspace_id, schedule, job_id, last_run_at, created_at";

#[async_trait]
impl AssetGroupWorkflowRepository for PostgresAssetGroupWorkflowRepository {
    async fn list_scheduled(&self) -> ReconResult<Vec<AssetGroupWorkflow>> {
        let rows = sqlx::query(&format!(
            "SELECT {BINDING_COLUMNS} FROM asset_group_workflows WHERE schedule IS NOT NULL"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(ReconError::Database)?;

        rows.iter().map(Self::row_to_binding).collect()
    }

    async fn get_by_id(&self, id: Uuid) -> ReconResult<Option<AssetGroupWorkflow>> {
        let row = sqlx::query(&format!(
            "SELECT {BINDING_COLUMNS} FROM asset_group_workflows WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(ReconError::Database)?;

        row.as_ref().map(Self::row_to_binding).transpose()
    }

    async fn list_group_assets(&self, asset_group_id: Uuid) -> ReconResult<Vec<GroupAsset>> {
        let rows = sqlx::query(
            "SELECT id, value, target_id FROM assets WHERE asset_group_id = $1 ORDER BY value",
        )
        .bind(asset_group_id)
        .fetch_all(&self.pool)
        .await
        .map_err(ReconError::Database)?;

        rows.iter()
            .map(|row| {
                Ok(GroupAsset {
                    id: row.try_get("id")?,
                    value: row.try_get("value")?,
                    target_id: row.try_get("target_id")?,
                })
            })
            .collect()
    }

    async fn record_run(
        &self,
        id: Uuid,
        job_id: Option<Uuid>,
        ran_at: DateTime<Utc>,
    ) -> ReconResult<()> {
        sqlx::query(
            "UPDATE asset_group_workflows SET job_id = COALESCE($2, job_id), last_run_at = $3 WHERE id = $1",
        )
        .bind(id)
        .bind(job_id)
        .bind(ran_at)
        .execute(&self.pool)
        .await
        .map_err(ReconError::Database)?;

        Ok(())
    }
}
