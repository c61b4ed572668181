use async_trait::async_trait;
use chrono::{DateTime, Utc};
use recon_core::{
    models::{
        AssetRef, DnsRecordType, HttpProbeRecord, Job, JobStatus, NormalizedResult,
        StoredChanges, Vulnerability,
    },
    traits::{JobRepository, ResultRepository},
    ReconResult,
};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::InMemoryJobRepository;

/// 内存中保存的资产
#[derive(Debug, Clone, Default)]
pub struct StoredAsset {
    pub id: Uuid,
    pub workspace_id: Option<Uuid>,
    pub value: String,
    pub dns_records: BTreeMap<DnsRecordType, Vec<String>>,
    pub http_response: Option<HttpProbeRecord>,
    pub ports: BTreeSet<u16>,
}

#[derive(Debug, Default)]
struct ResultState {
    raw_outputs: HashMap<Uuid, Option<String>>,
    assets: HashMap<(Option<Uuid>, String), StoredAsset>,
    vulnerabilities: Vec<(Uuid, Vulnerability)>,
}

impl ResultState {
    /// 返回资产引用以及是否新建
    fn asset_mut(&mut self, workspace_id: Option<Uuid>, value: &str) -> (&mut StoredAsset, bool) {
        let key = (workspace_id, value.to_string());
        let inserted = !self.assets.contains_key(&key);
        let asset = self.assets.entry(key).or_insert_with(|| StoredAsset {
            id: Uuid::new_v4(),
            workspace_id,
            value: value.to_string(),
            ..Default::default()
        });
        (asset, inserted)
    }
}

/// 内存结果仓储；与任务仓储共享状态，完成任务与写入结果在同一把锁内进行
#[derive(Debug, Clone)]
pub struct InMemoryResultRepository {
    jobs: InMemoryJobRepository,
    state: Arc<Mutex<ResultState>>,
}

impl InMemoryResultRepository {
    pub fn new(jobs: InMemoryJobRepository) -> Self {
        Self {
            jobs,
            state: Arc::new(Mutex::new(ResultState::default())),
        }
    }

    /// 任务是否写入过结果
    pub async fn has_results(&self, job_id: Uuid) -> bool {
        self.state.lock().await.raw_outputs.contains_key(&job_id)
    }

    pub async fn asset(&self, workspace_id: Option<Uuid>, value: &str) -> Option<StoredAsset> {
        self.state
            .lock()
            .await
            .assets
            .get(&(workspace_id, value.to_string()))
            .cloned()
    }

    pub async fn asset_count(&self) -> usize {
        self.state.lock().await.assets.len()
    }

    pub async fn vulnerability_count(&self) -> usize {
        self.state.lock().await.vulnerabilities.len()
    }
}

#[async_trait]
impl ResultRepository for InMemoryResultRepository {
    async fn complete_with_results(
        &self,
        job: &Job,
        worker_id: Uuid,
        results: &[NormalizedResult],
        raw_output: Option<&str>,
        completed_at: DateTime<Utc>,
    ) -> ReconResult<Option<StoredChanges>> {
        let mut state = self.state.lock().await;
        if !self
            .jobs
            .complete(job.id, worker_id, JobStatus::Done, None, completed_at)
            .await?
        {
            return Ok(None);
        }
        state
            .raw_outputs
            .insert(job.id, raw_output.map(str::to_string));

        let mut changes = StoredChanges::default();
        for result in results {
            match result {
                NormalizedResult::Asset(discovered) => {
                    let (asset, inserted) = state.asset_mut(job.workspace_id, &discovered.value);
                    for (record_type, values) in &discovered.dns_records {
                        asset.dns_records.insert(*record_type, values.clone());
                    }
                    let asset_ref = AssetRef {
                        id: asset.id,
                        value: asset.value.clone(),
                    };
                    if inserted {
                        changes.new_assets.push(asset_ref);
                    }
                }
                NormalizedResult::HttpResponse(record) => {
                    let Some(value) = record.asset_value() else {
                        continue;
                    };
                    let (asset, _) = state.asset_mut(job.workspace_id, value);
                    asset.http_response = Some(record.clone());
                    changes.probed_assets.push(AssetRef {
                        id: asset.id,
                        value: asset.value.clone(),
                    });
                }
                NormalizedResult::Ports { host, ports } => {
                    for value in job.port_scan_hosts(host.as_deref()) {
                        let (asset, _) = state.asset_mut(job.workspace_id, value);
                        asset.ports.extend(ports.iter().copied());
                        changes.port_assets.push(AssetRef {
                            id: asset.id,
                            value: asset.value.clone(),
                        });
                    }
                    changes.ports.extend(ports.iter().copied());
                }
                NormalizedResult::Vulnerability(vulnerability) => {
                    state.vulnerabilities.push((job.id, vulnerability.clone()));
                    changes.vulnerability_ids.push(vulnerability.id);
                }
            }
        }

        changes.ports.sort_unstable();
        changes.ports.dedup();
        Ok(Some(changes))
    }
}
