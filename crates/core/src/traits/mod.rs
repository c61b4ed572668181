pub mod lock;
pub mod repository;

pub use lock::LockStore;
pub use repository::{
    AssetGroupWorkflowRepository, JobRepository, ResultRepository, ToolRepository,
    WorkerRepository, WorkflowRepository,
};
