pub mod postgres;

pub use postgres::{
    DatabaseManager, DbPool, PostgresAssetGroupWorkflowRepository, PostgresJobRepository,
    PostgresResultRepository, PostgresToolRepository, PostgresWorkerRepository,
    PostgresWorkflowRepository,
};
