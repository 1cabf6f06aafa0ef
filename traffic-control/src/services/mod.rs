//! External collaborators and the processing pipeline

pub mod orchestrator;
pub mod storage_client;
pub mod sync_client;
pub mod upstream;

pub use orchestrator::{
    PipelineError, PipelineStage, ProcessError, ProcessOutcome, ProcessingPipeline, RetryPolicy,
};
pub use storage_client::{DownloadRequest, HttpStorageClient, StorageService, StorageUpload};
pub use sync_client::{HttpOptimizationClient, OptimizationService};
pub use upstream::UpstreamError;
