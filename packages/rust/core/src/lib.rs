//! Orchestration layer: the ingestion pipeline, the job registry, and the
//! rendered-result cache.

pub mod cache;
pub mod jobs;
pub mod pipeline;

pub use cache::{RenderCache, cache_key};
pub use jobs::{JobProgress, JobRegistry, JobSnapshot, JobState};
pub use pipeline::{
    MAX_CSV_FILES, PipelineConfig, ProgressReporter, SilentProgress, run_ingestion,
};
