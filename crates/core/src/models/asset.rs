use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 资产组成员，定时工作流按成员逐个创建任务
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GroupAsset {
    pub id: Uuid,
    pub value: String,
    pub target_id: Option<Uuid>,
}
