use async_trait::async_trait;
use chrono::{DateTime, Utc};
use recon_core::{
    models::{AssetRef, Job, JobStatus, NormalizedResult, StoredChanges},
    traits::ResultRepository,
    ReconError, ReconResult,
};
use sqlx::{types::Json, PgPool, Postgres, Row, Transaction};
use tracing::debug;
use uuid::Uuid;

/// PostgreSQL 结果仓储
///
/// 任务完成与结果写入在同一个事务里：先按持有者条件更新任务状态，更新不到就回滚，
/// 被回收任务的过期结果因此不会留下任何记录。
pub struct PostgresResultRepository {
    pool: PgPool,
}

struct UpsertedAsset {
    asset: AssetRef,
    inserted: bool,
}

impl PostgresResultRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn upsert_asset(
        tx: &mut Transaction<'_, Postgres>,
        job: &Job,
        value: &str,
        dns_records: Option<serde_json::Value>,
        http_response: Option<serde_json::Value>,
        ports: &[i32],
    ) -> ReconResult<UpsertedAsset> {
        let row = sqlx::query(
            r#"
            INSERT INTO assets (id, workspace_id, target_id, value, dns_records, http_response, ports)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT ON CONSTRAINT uq_assets_workspace_value DO UPDATE SET
                dns_records = CASE
                    WHEN EXCLUDED.dns_records IS NULL THEN assets.dns_records
                    ELSE COALESCE(assets.dns_records, '{}'::jsonb) || EXCLUDED.dns_records
                END,
                http_response = COALESCE(EXCLUDED.http_response, assets.http_response),
                ports = ARRAY(SELECT DISTINCT p FROM unnest(assets.ports || EXCLUDED.ports) AS p ORDER BY p),
                updated_at = NOW()
            RETURNING id, value, (xmax = 0) AS inserted
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(job.workspace_id)
        .bind(job.target_ids.first().copied())
        .bind(value)
        .bind(dns_records)
        .bind(http_response)
        .bind(ports)
        .fetch_one(&mut **tx)
        .await
        .map_err(ReconError::Database)?;

        Ok(UpsertedAsset {
            asset: AssetRef {
                id: row.try_get("id")?,
                value: row.try_get("value")?,
            },
            inserted: row.try_get("inserted")?,
        })
    }
}

#[async_trait]
impl ResultRepository for PostgresResultRepository {
    async fn complete_with_results(
        &self,
        job: &Job,
        worker_id: Uuid,
        results: &[NormalizedResult],
        raw_output: Option<&str>,
        completed_at: DateTime<Utc>,
    ) -> ReconResult<Option<StoredChanges>> {
        let mut tx = self.pool.begin().await.map_err(ReconError::Database)?;

        let completed = sqlx::query(
            r#"
            UPDATE jobs SET status = $3, error_message = NULL, completed_at = $4
            WHERE id = $1 AND worker_id = $2 AND status IN ('ASSIGNED', 'RUNNING')
            "#,
        )
        .bind(job.id)
        .bind(worker_id)
        .bind(JobStatus::Done)
        .bind(completed_at)
        .execute(&mut *tx)
        .await
        .map_err(ReconError::Database)?;

        if completed.rows_affected() == 0 {
            tx.rollback().await.map_err(ReconError::Database)?;
            debug!("任务 {} 已不属于Worker {}，结果未写入", job.id, worker_id);
            return Ok(None);
        }

        sqlx::query(
            r#"
            INSERT INTO job_results (job_id, worker_id, results, raw_output, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(job.id)
        .bind(worker_id)
        .bind(Json(results))
        .bind(raw_output)
        .bind(completed_at)
        .execute(&mut *tx)
        .await
        .map_err(ReconError::Database)?;

        let mut changes = StoredChanges::default();

        for result in results {
            match result {
                NormalizedResult::Asset(asset) => {
                    let dns = serde_json::to_value(&asset.dns_records)?;
                    let upserted =
                        Self::upsert_asset(&mut tx, job, &asset.value, Some(dns), None, &[])
                            .await?;
                    if upserted.inserted {
                        changes.new_assets.push(upserted.asset);
                    }
                }
                NormalizedResult::HttpResponse(record) => {
                    let Some(value) = record.asset_value() else {
                        continue;
                    };
                    let http = serde_json::to_value(record)?;
                    let upserted =
                        Self::upsert_asset(&mut tx, job, value, None, Some(http), &[]).await?;
                    changes.probed_assets.push(upserted.asset);
                }
                NormalizedResult::Ports { host, ports } => {
                    let ports_i32: Vec<i32> = ports.iter().map(|p| i32::from(*p)).collect();
                    for value in job.port_scan_hosts(host.as_deref()) {
                        let upserted =
                            Self::upsert_asset(&mut tx, job, value, None, None, &ports_i32)
                                .await?;
                        changes.port_assets.push(upserted.asset);
                    }
                    changes.ports.extend(ports.iter().copied());
                }
                NormalizedResult::Vulnerability(vulnerability) => {
                    sqlx::query(
                        r#"
                        INSERT INTO vulnerabilities (id, workspace_id, job_id, name, severity, data)
                        VALUES ($1, $2, $3, $4, $5, $6)
                        "#,
                    )
                    .bind(vulnerability.id)
                    .bind(job.workspace_id)
                    .bind(job.id)
                    .bind(&vulnerability.name)
                    .bind(&vulnerability.severity)
                    .bind(Json(vulnerability))
                    .execute(&mut *tx)
                    .await
                    .map_err(ReconError::Database)?;
                    changes.vulnerability_ids.push(vulnerability.id);
                }
            }
        }

        tx.commit().await.map_err(ReconError::Database)?;

        changes.ports.sort_unstable();
        changes.ports.dedup();
        debug!(
            "任务 {} 结果写入完成: 新资产 {}，漏洞 {}",
            job.id,
            changes.new_assets.len(),
            changes.vulnerability_ids.len()
        );
        Ok(Some(changes))
    }
}
