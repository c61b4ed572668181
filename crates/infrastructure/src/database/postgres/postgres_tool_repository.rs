use async_trait::async_trait;
use recon_core::{
    models::ToolDefinition, traits::ToolRepository, ReconError, ReconResult,
};
use sqlx::{PgPool, Row};
use tracing::debug;
use uuid::Uuid;

const TOOL_COLUMNS: &str =
    "id, name, category, command, parser, version, priority, is_built_in";

/// PostgreSQL 工具目录实现
pub struct PostgresToolRepository {
    pool: PgPool,
}

impl PostgresToolRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_tool(row: &sqlx::postgres::PgRow) -> ReconResult<ToolDefinition> {
        Ok(ToolDefinition {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            category: row.try_get("category")?,
            command: row.try_get("command")?,
            parser: row.try_get("parser")?,
            version: row.try_get("version")?,
            priority: row.try_get("priority")?,
            is_built_in: row.try_get("is_built_in")?,
        })
    }
}

#[async_trait]
impl ToolRepository for PostgresToolRepository {
    async fn get_by_names(&self, names: &[String]) -> ReconResult<Vec<ToolDefinition>> {
        let rows = sqlx::query(&format!(
            "SELECT {TOOL_COLUMNS} FROM tools WHERE name = ANY($1) ORDER BY name"
        ))
        .bind(names)
        .fetch_all(&self.pool)
        .await
        .map_err(ReconError::Database)?;

        rows.iter().map(Self::row_to_tool).collect()
    }

    async fn get_by_ids(&self, ids: &[Uuid]) -> ReconResult<Vec<ToolDefinition>> {
        let rows = sqlx::query(&format!(
            "SELECT {TOOL_COLUMNS} FROM tools WHERE id = ANY($1) ORDER BY name"
        ))
        .bind(ids)
        .fetch_all(&self.pool)
        .await
        .map_err(ReconError::Database)?;

        rows.iter().map(Self::row_to_tool).collect()
    }

    async fn get_built_in_by_category(
        &self,
        category: &str,
    ) -> ReconResult<Option<ToolDefinition>> {
        let row = sqlx::query(&format!(
            "SELECT {TOOL_COLUMNS} FROM tools WHERE category = $1 AND is_built_in ORDER BY name LIMIT 1"
        ))
        .bind(category)
        .fetch_optional(&self.pool)
        .await
        .map_err(ReconError::Database)?;

        row.as_ref().map(Self::row_to_tool).transpose()
    }

    async fn upsert_by_name(&self, tool: &ToolDefinition) -> ReconResult<ToolDefinition> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO tools (id, name, category, command, parser, version, priority, is_built_in)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (name) DO UPDATE SET
                category = EXCLUDED.category,
                command = EXCLUDED.command,
                parser = EXCLUDED.parser,
                version = EXCLUDED.version,
                priority = EXCLUDED.priority,
                is_built_in = EXCLUDED.is_built_in,
                updated_at = NOW()
            RETURNING {TOOL_COLUMNS}
            "#
        ))
        .bind(tool.id)
        .bind(&tool.name)
        .bind(&tool.category)
        .bind(&tool.command)
        .bind(&tool.parser)
        .bind(&tool.version)
        .bind(tool.priority)
        .bind(tool.is_built_in)
        .fetch_one(&self.pool)
        .await
        .map_err(ReconError::Database)?;

        debug!("工具已写入目录: {}", tool.name);
        Self::row_to_tool(&row)
    }
}
