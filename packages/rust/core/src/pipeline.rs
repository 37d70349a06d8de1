//! End-to-end ingestion pipeline: URL → metadata → schema samples → ranked
//! notebooks → per-notebook content.
//!
//! Individual notebook failures never abort the run; they become failure
//! descriptors in the result. Cancellation aborts the whole run.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use kaggleingest_ranking::Ranker;
use kaggleingest_shared::{
    DatasetFileSchema, FetchFailure, IngestError, IngestRequest, IngestionResult, IngestionStats,
    NotebookContent, NotebookOutcome, RankingConfig, Result,
};
use kaggleingest_source::NotebookSource;

/// Maximum dataset files sampled per run.
pub const MAX_CSV_FILES: usize = 3;

/// Candidate pool multiplier: fetch more references than requested so that
/// ranking has slack to reorder, capped upstream-friendly.
const FETCH_OVERSAMPLE: usize = 3;

/// Hard cap on the candidate listing size.
const FETCH_LIMIT_CAP: usize = 100;

/// Tunables for one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Maximum concurrent notebook downloads.
    pub concurrency: usize,
    /// Ranking tunables.
    pub ranking: RankingConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            ranking: RankingConfig::default(),
        }
    }
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called after each notebook fetch finishes, success or failure.
    fn notebook_done(&self, completed: usize, total: usize);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn notebook_done(&self, _completed: usize, _total: usize) {}
}

/// Number of candidate references to list for a given `top_n`.
fn fetch_limit(top_n: usize) -> usize {
    (top_n * FETCH_OVERSAMPLE).min(FETCH_LIMIT_CAP)
}

/// Run the full ingestion pipeline.
///
/// 1. Fetch resource metadata (dry runs stop here)
/// 2. Sample attached CSV files
/// 3. List and rank candidate notebooks
/// 4. Fetch notebook content concurrently
#[instrument(skip_all, fields(resource = %request.resource, top_n = request.top_n, dry_run = request.dry_run))]
pub async fn run_ingestion(
    source: Arc<dyn NotebookSource>,
    request: &IngestRequest,
    config: &PipelineConfig,
    progress: &dyn ProgressReporter,
    cancel: &CancellationToken,
) -> Result<IngestionResult> {
    request.validate()?;
    let start = Instant::now();
    let started_at = Utc::now();

    info!(resource = %request.resource, "starting ingestion");

    // --- Phase 1: Resource metadata ---
    progress.phase("Fetching resource metadata");
    let metadata = tokio::select! {
        _ = cancel.cancelled() => return Err(cancelled(request)),
        meta = source.resource_metadata(&request.resource) => meta?,
    };

    if request.dry_run {
        info!("dry run: metadata validated, stopping before content fetch");
        return Ok(IngestionResult {
            metadata,
            schemas: vec![],
            notebooks: vec![],
            stats: IngestionStats {
                requested: 0,
                successful: 0,
                failed: 0,
                failures: vec![],
                duration_seconds: start.elapsed().as_secs_f64(),
                dry_run: true,
                started_at,
            },
        });
    }

    // --- Phase 2: Dataset schema samples ---
    progress.phase("Sampling dataset files");
    let schemas = sample_csv_files(source.clone(), request, cancel).await?;

    // --- Phase 3: List and rank candidates ---
    progress.phase("Listing notebooks");
    let limit = fetch_limit(request.top_n);
    let candidates = tokio::select! {
        _ = cancel.cancelled() => return Err(cancelled(request)),
        list = source.list_notebooks(&request.resource, limit) => list?,
    };

    let mut ranked = Ranker::new(&config.ranking).rank(candidates);
    ranked.truncate(request.top_n);
    let requested = ranked.len();

    if ranked.is_empty() {
        warn!(resource = %request.resource, "no notebooks found");
    }

    // --- Phase 4: Concurrent notebook fetch ---
    progress.phase("Fetching notebook content");
    let semaphore = Arc::new(Semaphore::new(config.concurrency.max(1)));
    let mut set: JoinSet<(usize, kaggleingest_shared::NotebookMeta, Result<NotebookContent>)> =
        JoinSet::new();

    for (i, notebook) in ranked.into_iter().enumerate() {
        let source = source.clone();
        let sem = semaphore.clone();
        let cancel = cancel.clone();
        let meta = notebook.meta;

        set.spawn(async move {
            let _permit = sem.acquire().await.expect("semaphore closed");
            let content = tokio::select! {
                _ = cancel.cancelled() => Err(IngestError::Cancelled(meta.reference.clone())),
                fetched = source.fetch_notebook(&meta.reference) => fetched,
            };
            (i + 1, meta, content)
        });
    }

    let mut indexed: Vec<(usize, NotebookOutcome)> = Vec::with_capacity(requested);
    let mut failures: Vec<FetchFailure> = Vec::new();
    let mut completed = 0usize;

    while let Some(joined) = set.join_next().await {
        let (index, meta, outcome) = joined
            .map_err(|e| IngestError::Source(format!("notebook fetch task failed: {e}")))?;
        completed += 1;
        progress.notebook_done(completed, requested);

        match outcome {
            Ok(content) => {
                indexed.push((index, NotebookOutcome::Success { index, meta, content }));
            }
            Err(e) => {
                warn!(reference = %meta.reference, error = %e, "notebook fetch failed");
                let failure = FetchFailure {
                    reference: meta.reference.clone(),
                    title: meta.title.clone(),
                    reason: e.to_string(),
                };
                failures.push(failure.clone());
                indexed.push((index, NotebookOutcome::Failure(failure)));
            }
        }
    }

    if cancel.is_cancelled() {
        return Err(cancelled(request));
    }

    // Join order is completion order; restore rank order.
    indexed.sort_by_key(|(i, _)| *i);
    failures.sort_by(|a, b| a.reference.cmp(&b.reference));
    let notebooks: Vec<NotebookOutcome> = indexed.into_iter().map(|(_, o)| o).collect();

    let successful = notebooks.iter().filter(|n| n.is_success()).count();
    let result = IngestionResult {
        metadata,
        schemas,
        notebooks,
        stats: IngestionStats {
            requested,
            successful,
            failed: failures.len(),
            failures,
            duration_seconds: start.elapsed().as_secs_f64(),
            dry_run: false,
            started_at,
        },
    };

    info!(
        requested = result.stats.requested,
        successful = result.stats.successful,
        failed = result.stats.failed,
        duration_ms = start.elapsed().as_millis(),
        "ingestion complete"
    );

    Ok(result)
}

fn cancelled(request: &IngestRequest) -> IngestError {
    IngestError::Cancelled(request.resource.to_string())
}

/// Sample up to [`MAX_CSV_FILES`] attached CSV files concurrently. Sampling
/// is best-effort: per-file errors are logged and skipped, but a failure to
/// even list the files aborts the run.
async fn sample_csv_files(
    source: Arc<dyn NotebookSource>,
    request: &IngestRequest,
    cancel: &CancellationToken,
) -> Result<Vec<DatasetFileSchema>> {
    let files = tokio::select! {
        _ = cancel.cancelled() => return Err(cancelled(request)),
        list = source.list_data_files(&request.resource) => list?,
    };

    let csv_files: Vec<String> = files
        .into_iter()
        .filter(|f| f.to_ascii_lowercase().ends_with(".csv"))
        .take(MAX_CSV_FILES)
        .collect();

    let mut set: JoinSet<(usize, Result<DatasetFileSchema>)> = JoinSet::new();
    for (i, filename) in csv_files.into_iter().enumerate() {
        let source = source.clone();
        let resource = request.resource.clone();
        set.spawn(async move {
            let sample = source.fetch_data_sample(&resource, &filename).await;
            (i, sample)
        });
    }

    let mut samples: Vec<(usize, DatasetFileSchema)> = Vec::new();
    while let Some(joined) = set.join_next().await {
        let (i, outcome) =
            joined.map_err(|e| IngestError::Source(format!("sample task failed: {e}")))?;
        match outcome {
            Ok(schema) => samples.push((i, schema)),
            Err(e) => warn!(error = %e, "schema sample failed, skipping file"),
        }
    }

    samples.sort_by_key(|(i, _)| *i);
    Ok(samples.into_iter().map(|(_, s)| s).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use kaggleingest_shared::{
        ColumnInfo, NotebookMeta, OutputFormat, ResourceKind, ResourceMetadata, ResourceRef,
    };

    /// In-process source with scriptable failures.
    struct MockSource {
        notebooks: Vec<NotebookMeta>,
        files: Vec<String>,
        failing_refs: HashSet<String>,
        list_limits: Mutex<Vec<usize>>,
        fetch_calls: AtomicUsize,
    }

    impl MockSource {
        fn new(notebooks: Vec<NotebookMeta>) -> Self {
            Self {
                notebooks,
                files: vec!["train.csv".into()],
                failing_refs: HashSet::new(),
                list_limits: Mutex::new(vec![]),
                fetch_calls: AtomicUsize::new(0),
            }
        }

        fn failing(mut self, reference: &str) -> Self {
            self.failing_refs.insert(reference.to_string());
            self
        }

        fn with_files(mut self, files: Vec<&str>) -> Self {
            self.files = files.into_iter().map(String::from).collect();
            self
        }
    }

    #[async_trait]
    impl NotebookSource for MockSource {
        async fn resource_metadata(&self, resource: &ResourceRef) -> Result<ResourceMetadata> {
            Ok(ResourceMetadata {
                title: "Titanic".into(),
                url: "https://www.kaggle.com/c/titanic".into(),
                kind: resource.kind,
                description: String::new(),
                category: None,
                prize: None,
                evaluation_metric: None,
                deadline: None,
            })
        }

        async fn list_notebooks(
            &self,
            _resource: &ResourceRef,
            limit: usize,
        ) -> Result<Vec<NotebookMeta>> {
            self.list_limits.lock().unwrap().push(limit);
            Ok(self.notebooks.iter().take(limit).cloned().collect())
        }

        async fn fetch_notebook(&self, reference: &str) -> Result<NotebookContent> {
            self.fetch_calls.fetch_add(1, Ordering::SeqCst);
            if self.failing_refs.contains(reference) {
                return Err(IngestError::Source(format!("{reference}: HTTP 404")));
            }
            Ok(NotebookContent {
                markdown: vec![format!("notes for {reference}")],
                code: vec!["print(1)".into()],
            })
        }

        async fn list_data_files(&self, _resource: &ResourceRef) -> Result<Vec<String>> {
            Ok(self.files.clone())
        }

        async fn fetch_data_sample(
            &self,
            _resource: &ResourceRef,
            filename: &str,
        ) -> Result<DatasetFileSchema> {
            Ok(DatasetFileSchema {
                filename: filename.to_string(),
                columns: vec![ColumnInfo {
                    name: "id".into(),
                    dtype: "integer".into(),
                }],
                sample_rows: vec![vec!["1".into()]],
            })
        }
    }

    fn meta(reference: &str, votes: i64) -> NotebookMeta {
        NotebookMeta {
            reference: reference.into(),
            title: reference.into(),
            author: "tester".into(),
            votes,
            url: format!("https://www.kaggle.com/code/{reference}"),
            last_updated: Some(Utc::now()),
        }
    }

    fn request(top_n: usize) -> IngestRequest {
        IngestRequest {
            resource: ResourceRef {
                kind: ResourceKind::Competition,
                id: "titanic".into(),
            },
            top_n,
            format: OutputFormat::Toon,
            dry_run: false,
        }
    }

    #[test]
    fn fetch_limit_oversamples_with_cap() {
        assert_eq!(fetch_limit(10), 30);
        assert_eq!(fetch_limit(1), 3);
        assert_eq!(fetch_limit(50), 100);
    }

    #[tokio::test]
    async fn happy_path_orders_by_rank_index() {
        let source = Arc::new(MockSource::new(vec![
            meta("a/low", 5),
            meta("b/high", 500),
            meta("c/mid", 50),
        ]));
        let result = run_ingestion(
            source,
            &request(3),
            &PipelineConfig::default(),
            &SilentProgress,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(result.stats.requested, 3);
        assert_eq!(result.stats.successful, 3);
        assert_eq!(result.stats.failed, 0);
        assert_eq!(result.schemas.len(), 1);

        let indices: Vec<usize> = result
            .notebooks
            .iter()
            .filter_map(|n| match n {
                NotebookOutcome::Success { index, .. } => Some(*index),
                _ => None,
            })
            .collect();
        assert_eq!(indices, vec![1, 2, 3]);

        // Rank 1 must be the most-voted notebook.
        match &result.notebooks[0] {
            NotebookOutcome::Success { meta, .. } => assert_eq!(meta.reference, "b/high"),
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn partial_failures_become_descriptors() {
        let source = Arc::new(
            MockSource::new(vec![meta("a/ok", 100), meta("b/broken", 50)]).failing("b/broken"),
        );
        let result = run_ingestion(
            source,
            &request(2),
            &PipelineConfig::default(),
            &SilentProgress,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(result.stats.successful, 1);
        assert_eq!(result.stats.failed, 1);
        assert_eq!(result.stats.failures.len(), 1);
        assert_eq!(result.stats.failures[0].reference, "b/broken");
        assert!(result.stats.failures[0].reason.contains("HTTP 404"));
        assert_eq!(result.notebooks.len(), 2);
    }

    #[tokio::test]
    async fn dry_run_stops_after_metadata() {
        let source = Arc::new(MockSource::new(vec![meta("a/nb", 10)]));
        let mut req = request(5);
        req.dry_run = true;

        let result = run_ingestion(
            source.clone(),
            &req,
            &PipelineConfig::default(),
            &SilentProgress,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert!(result.stats.dry_run);
        assert!(result.notebooks.is_empty());
        assert!(result.schemas.is_empty());
        assert_eq!(source.fetch_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn listing_uses_oversampled_limit() {
        let source = Arc::new(MockSource::new(vec![meta("a/nb", 10)]));
        run_ingestion(
            source.clone(),
            &request(10),
            &PipelineConfig::default(),
            &SilentProgress,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(*source.list_limits.lock().unwrap(), vec![30]);
    }

    #[tokio::test]
    async fn only_csv_files_are_sampled_and_capped() {
        let source = Arc::new(MockSource::new(vec![meta("a/nb", 10)]).with_files(vec![
            "a.csv",
            "model.bin",
            "B.CSV",
            "c.csv",
            "d.csv",
            "readme.md",
        ]));
        let result = run_ingestion(
            source,
            &request(1),
            &PipelineConfig::default(),
            &SilentProgress,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        let names: Vec<&str> = result.schemas.iter().map(|s| s.filename.as_str()).collect();
        assert_eq!(names, vec!["a.csv", "B.CSV", "c.csv"]);
    }

    #[tokio::test]
    async fn cancellation_aborts_the_run() {
        let source = Arc::new(MockSource::new(vec![meta("a/nb", 10)]));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = run_ingestion(
            source,
            &request(1),
            &PipelineConfig::default(),
            &SilentProgress,
            &cancel,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, IngestError::Cancelled(_)));
    }

    #[tokio::test]
    async fn invalid_request_fails_fast() {
        let source = Arc::new(MockSource::new(vec![]));
        let err = run_ingestion(
            source,
            &request(0),
            &PipelineConfig::default(),
            &SilentProgress,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, IngestError::Validation { .. }));
    }

    #[tokio::test]
    async fn progress_reports_every_notebook() {
        struct CountingProgress(AtomicUsize);
        impl ProgressReporter for CountingProgress {
            fn phase(&self, _name: &str) {}
            fn notebook_done(&self, completed: usize, total: usize) {
                self.0.fetch_add(1, Ordering::SeqCst);
                assert!(completed <= total);
            }
        }

        let source = Arc::new(MockSource::new(vec![
            meta("a/one", 1),
            meta("b/two", 2),
            meta("c/three", 3),
        ]));
        let progress = CountingProgress(AtomicUsize::new(0));
        run_ingestion(
            source,
            &request(3),
            &PipelineConfig::default(),
            &progress,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(progress.0.load(Ordering::SeqCst), 3);
    }
}
