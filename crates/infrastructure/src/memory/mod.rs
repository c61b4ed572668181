//! 内存实现：单进程部署与测试使用

mod catalog;
mod job_repository;
mod result_repository;
mod worker_repository;

pub use catalog::{
    InMemoryAssetGroupWorkflowRepository, InMemoryToolRepository, InMemoryWorkflowRepository,
};
pub use job_repository::InMemoryJobRepository;
pub use result_repository::{InMemoryResultRepository, StoredAsset};
pub use worker_repository::InMemoryWorkerRepository;
