pub mod asset;
pub mod job;
pub mod protocol;
pub mod result;
pub mod tool;
pub mod worker;
pub mod workflow;

pub use asset::GroupAsset;
pub use job::{priority, CreateJobOptions, Job, JobStatus};
pub use protocol::{JobResultPayload, JoinRequest, JoinResponse, NextJobResponse, ResultAck};
pub use result::{
    AssetRef, DiscoveredAsset, DnsRecordType, HttpProbeRecord, NormalizedResult, StoredChanges,
    Vulnerability,
};
pub use tool::{built_in_tools, ToolDefinition};
pub use worker::{HeartbeatAck, HeartbeatFrame, Worker, WorkerStatus};
pub use workflow::{AssetGroupWorkflow, Workflow, WorkflowContent, WorkflowSchedule, WorkflowStage};
