//! In-memory job registry with a strict lifecycle state machine.
//!
//! States: `Queued → InProgress → {Complete | Failed}`. Terminal states are
//! immutable; every transition happens exactly once. Each job carries a
//! cancellation token observed by the running pipeline.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{RwLock, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use kaggleingest_shared::{IngestError, IngestRequest, IngestionResult, JobId, Result};
use kaggleingest_source::NotebookSource;

use crate::pipeline::{PipelineConfig, ProgressReporter, run_ingestion};

// ---------------------------------------------------------------------------
// Job state
// ---------------------------------------------------------------------------

/// Lifecycle state of one ingestion job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    InProgress,
    Complete,
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Queued => "queued",
            Self::InProgress => "in_progress",
            Self::Complete => "complete",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Monotonic fetch progress for one job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct JobProgress {
    pub processed: usize,
    pub total: usize,
}

impl JobProgress {
    /// Completion percentage, rounded down. Zero-total jobs report 0.
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            0
        } else {
            ((self.processed * 100) / self.total).min(100) as u8
        }
    }
}

/// Point-in-time view of a job, safe to hand to callers.
#[derive(Debug, Clone, Serialize)]
pub struct JobSnapshot {
    pub id: JobId,
    pub state: JobState,
    pub progress: JobProgress,
    /// Failure reason, set only in the `Failed` state.
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

struct JobEntry {
    request: IngestRequest,
    state: JobState,
    progress: JobProgress,
    error: Option<String>,
    result: Option<IngestionResult>,
    created_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    cancel: CancellationToken,
}

// ---------------------------------------------------------------------------
// JobRegistry
// ---------------------------------------------------------------------------

/// Tracks all jobs known to this process.
#[derive(Default)]
pub struct JobRegistry {
    jobs: RwLock<HashMap<JobId, Arc<RwLock<JobEntry>>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a job and spawn its orchestration task. Returns the id
    /// immediately; callers follow the run through [`Self::snapshot`] and
    /// collect output with [`Self::result`].
    pub async fn submit(
        self: Arc<Self>,
        request: IngestRequest,
        source: Arc<dyn NotebookSource>,
        config: PipelineConfig,
    ) -> JobId {
        let id = self.create(request.clone()).await;
        tokio::spawn(async move {
            self.drive(id, request, source, config).await;
        });
        id
    }

    /// Run one job to a terminal state. The task has no caller to return to,
    /// so registry errors are logged rather than propagated.
    async fn drive(
        self: Arc<Self>,
        id: JobId,
        request: IngestRequest,
        source: Arc<dyn NotebookSource>,
        config: PipelineConfig,
    ) {
        let cancel = match self.cancel_token(id).await {
            Ok(token) => token,
            Err(e) => {
                warn!(job_id = %id, error = %e, "job vanished before starting");
                return;
            }
        };
        if let Err(e) = self.start(id).await {
            warn!(job_id = %id, error = %e, "job could not start");
            return;
        }

        // ProgressReporter is sync while registry updates are async, so
        // progress flows through an unbounded channel drained alongside
        // the pipeline run.
        let (tx, mut rx) = mpsc::unbounded_channel();
        let drain_registry = Arc::clone(&self);
        let drain = tokio::spawn(async move {
            while let Some((processed, total)) = rx.recv().await {
                let _ = drain_registry.update_progress(id, processed, total).await;
            }
        });

        let reporter = RegistryProgress { tx };
        let outcome = run_ingestion(source, &request, &config, &reporter, &cancel).await;
        drop(reporter);
        let _ = drain.await;

        let transition = match outcome {
            Ok(result) => self.complete(id, result).await,
            Err(e) => self.fail(id, e.to_string()).await,
        };
        if let Err(e) = transition {
            warn!(job_id = %id, error = %e, "terminal transition rejected");
        }
    }

    /// Register a new queued job and return its id.
    pub async fn create(&self, request: IngestRequest) -> JobId {
        let id = JobId::new();
        let entry = JobEntry {
            request,
            state: JobState::Queued,
            progress: JobProgress::default(),
            error: None,
            result: None,
            created_at: Utc::now(),
            finished_at: None,
            cancel: CancellationToken::new(),
        };
        self.jobs.write().await.insert(id, Arc::new(RwLock::new(entry)));
        info!(job_id = %id, "job created");
        id
    }

    async fn entry(&self, id: JobId) -> Result<Arc<RwLock<JobEntry>>> {
        self.jobs
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| IngestError::JobNotFound(id.to_string()))
    }

    /// The cancellation token observed by this job's pipeline run.
    pub async fn cancel_token(&self, id: JobId) -> Result<CancellationToken> {
        let entry = self.entry(id).await?;
        let token = entry.read().await.cancel.clone();
        Ok(token)
    }

    /// The request this job was created with.
    pub async fn request(&self, id: JobId) -> Result<IngestRequest> {
        let entry = self.entry(id).await?;
        let request = entry.read().await.request.clone();
        Ok(request)
    }

    /// Transition `Queued → InProgress`.
    pub async fn start(&self, id: JobId) -> Result<()> {
        let entry = self.entry(id).await?;
        let mut job = entry.write().await;
        if job.state != JobState::Queued {
            return Err(IngestError::job_state(format!(
                "job {id} cannot start from state {}",
                job.state
            )));
        }
        job.state = JobState::InProgress;
        debug!(job_id = %id, "job started");
        Ok(())
    }

    /// Record fetch progress. Only applied while in progress; updates against
    /// any other state are logged and dropped, and a stale update with a
    /// lower `processed` count is ignored rather than rolled back.
    pub async fn update_progress(&self, id: JobId, processed: usize, total: usize) -> Result<()> {
        let entry = self.entry(id).await?;
        let mut job = entry.write().await;
        if job.state != JobState::InProgress {
            warn!(job_id = %id, state = %job.state, "progress update ignored");
            return Ok(());
        }
        if processed >= job.progress.processed {
            job.progress = JobProgress { processed, total };
        }
        Ok(())
    }

    /// Transition `InProgress → Complete`, storing the result.
    pub async fn complete(&self, id: JobId, result: IngestionResult) -> Result<()> {
        let entry = self.entry(id).await?;
        let mut job = entry.write().await;
        if job.state != JobState::InProgress {
            return Err(IngestError::job_state(format!(
                "job {id} cannot complete from state {}",
                job.state
            )));
        }
        job.state = JobState::Complete;
        job.result = Some(result);
        job.finished_at = Some(Utc::now());
        info!(job_id = %id, "job complete");
        Ok(())
    }

    /// Transition `Queued | InProgress → Failed` with a reason.
    pub async fn fail(&self, id: JobId, reason: impl Into<String>) -> Result<()> {
        let entry = self.entry(id).await?;
        let mut job = entry.write().await;
        if job.state.is_terminal() {
            return Err(IngestError::job_state(format!(
                "job {id} is already {}",
                job.state
            )));
        }
        let reason = reason.into();
        info!(job_id = %id, %reason, "job failed");
        job.state = JobState::Failed;
        job.error = Some(reason);
        job.finished_at = Some(Utc::now());
        Ok(())
    }

    /// Request cancellation. The state transition to `Failed` happens when
    /// the pipeline observes the token and reports back via [`Self::fail`].
    pub async fn cancel(&self, id: JobId) -> Result<()> {
        let entry = self.entry(id).await?;
        let job = entry.read().await;
        if job.state.is_terminal() {
            return Err(IngestError::job_state(format!(
                "job {id} is already {}",
                job.state
            )));
        }
        info!(job_id = %id, "job cancellation requested");
        job.cancel.cancel();
        Ok(())
    }

    /// Point-in-time snapshot of a job's state.
    pub async fn snapshot(&self, id: JobId) -> Result<JobSnapshot> {
        let entry = self.entry(id).await?;
        let job = entry.read().await;
        Ok(JobSnapshot {
            id,
            state: job.state,
            progress: job.progress,
            error: job.error.clone(),
            created_at: job.created_at,
            finished_at: job.finished_at,
        })
    }

    /// Take the stored result of a completed job.
    pub async fn result(&self, id: JobId) -> Result<IngestionResult> {
        let entry = self.entry(id).await?;
        let job = entry.read().await;
        match job.state {
            JobState::Complete => job
                .result
                .clone()
                .ok_or_else(|| IngestError::job_state(format!("job {id} has no stored result"))),
            state => Err(IngestError::job_state(format!(
                "job {id} is {state}, result only available when complete"
            ))),
        }
    }
}

/// Forwards pipeline progress into the registry.
struct RegistryProgress {
    tx: mpsc::UnboundedSender<(usize, usize)>,
}

impl ProgressReporter for RegistryProgress {
    fn phase(&self, name: &str) {
        debug!(phase = name, "pipeline phase");
    }

    fn notebook_done(&self, completed: usize, total: usize) {
        let _ = self.tx.send((completed, total));
    }
}
