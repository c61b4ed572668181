use async_trait::async_trait;
use chrono::{DateTime, Utc};
use recon_core::{
    models::{AssetGroupWorkflow, GroupAsset, ToolDefinition, Workflow},
    traits::{AssetGroupWorkflowRepository, ToolRepository, WorkflowRepository},
    ReconResult,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// 内存工具目录，按名称唯一
#[derive(Debug, Clone, Default)]
pub struct InMemoryToolRepository {
    tools: Arc<RwLock<HashMap<String, ToolDefinition>>>,
}

impl InMemoryToolRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ToolRepository for InMemoryToolRepository {
    async fn get_by_names(&self, names: &[String]) -> ReconResult<Vec<ToolDefinition>> {
        let tools = self.tools.read().await;
        Ok(names.iter().filter_map(|n| tools.get(n).cloned()).collect())
    }

    async fn get_by_ids(&self, ids: &[Uuid]) -> ReconResult<Vec<ToolDefinition>> {
        let tools = self.tools.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| tools.values().find(|t| t.id == *id).cloned())
            .collect())
    }

    async fn get_built_in_by_category(
        &self,
        category: &str,
    ) -> ReconResult<Option<ToolDefinition>> {
        let tools = self.tools.read().await;
        let mut candidates: Vec<_> = tools
            .values()
            .filter(|t| t.is_built_in && t.category == category)
            .collect();
        candidates.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(candidates.first().map(|t| (*t).clone()))
    }

    async fn upsert_by_name(&self, tool: &ToolDefinition) -> ReconResult<ToolDefinition> {
        let mut tools = self.tools.write().await;
        let mut stored = tool.clone();
        if let Some(existing) = tools.get(&tool.name) {
            stored.id = existing.id;
        }
        tools.insert(stored.name.clone(), stored.clone());
        Ok(stored)
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryWorkflowRepository {
    workflows: Arc<RwLock<Vec<Workflow>>>,
}

impl InMemoryWorkflowRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, workflow: Workflow) {
        self.workflows.write().await.push(workflow);
    }
}

#[async_trait]
impl WorkflowRepository for InMemoryWorkflowRepository {
    async fn find_triggered_by(&self, kind: &str, action: &str) -> ReconResult<Vec<Workflow>> {
        Ok(self
            .workflows
            .read()
            .await
            .iter()
            .filter(|w| w.content.is_triggered_by(kind, action))
            .cloned()
            .collect())
    }

    async fn get_by_id(&self, id: Uuid) -> ReconResult<Option<Workflow>> {
        Ok(self
            .workflows
            .read()
            .await
            .iter()
            .find(|w| w.id == id)
            .cloned())
    }
}

#[derive(Debug, Default)]
struct AssetGroupState {
    bindings: HashMap<Uuid, AssetGroupWorkflow>,
    members: HashMap<Uuid, Vec<GroupAsset>>,
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryAssetGroupWorkflowRepository {
    state: Arc<RwLock<AssetGroupState>>,
}

impl InMemoryAssetGroupWorkflowRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, binding: AssetGroupWorkflow) {
        self.state
            .write()
            .await
            .bindings
            .insert(binding.id, binding);
    }

    pub async fn add_group_asset(&self, asset_group_id: Uuid, asset: GroupAsset) {
        self.state
            .write()
            .await
            .members
            .entry(asset_group_id)
            .or_default()
            .push(asset);
    }
}

#[async_trait]
impl AssetGroupWorkflowRepository for InMemoryAssetGroupWorkflowRepository {
    async fn list_scheduled(&self) -> ReconResult<Vec<AssetGroupWorkflow>> {
        Ok(self
            .state
            .read()
            .await
            .bindings
            .values()
            .filter(|b| b.schedule.is_some())
            .cloned()
            .collect())
    }

    async fn get_by_id(&self, id: Uuid) -> ReconResult<Option<AssetGroupWorkflow>> {
        Ok(self.state.read().await.bindings.get(&id).cloned())
    }

    async fn list_group_assets(&self, asset_group_id: Uuid) -> ReconResult<Vec<GroupAsset>> {
        Ok(self
            .state
            .read()
            .await
            .members
            .get(&asset_group_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn record_run(
        &self,
        id: Uuid,
        job_id: Option<Uuid>,
        ran_at: DateTime<Utc>,
    ) -> ReconResult<()> {
        if let Some(binding) = self.state.write().await.bindings.get_mut(&id) {
            if job_id.is_some() {
                binding.job_id = job_id;
            }
            binding.last_run_at = Some(ran_at);
        }
        Ok(())
    }
}
