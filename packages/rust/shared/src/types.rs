//! Core domain types for KaggleIngest jobs and results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use crate::error::{IngestError, Result};

/// Smallest number of notebooks a request may ask for.
pub const MIN_NOTEBOOKS: usize = 1;
/// Largest number of notebooks a request may ask for.
pub const MAX_NOTEBOOKS: usize = 50;
/// Default notebook count when the caller does not specify one.
pub const DEFAULT_NOTEBOOKS: usize = 10;

// ---------------------------------------------------------------------------
// JobId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for ingestion job identifiers (time-sortable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl JobId {
    /// Generate a new time-sortable job identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// ResourceRef
// ---------------------------------------------------------------------------

/// Kind of Kaggle resource being ingested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Competition,
    Dataset,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Competition => write!(f, "competition"),
            Self::Dataset => write!(f, "dataset"),
        }
    }
}

/// Identifier for a Kaggle resource, extracted from a kaggle.com URL.
///
/// Competitions use a single slug (`titanic`); datasets use an
/// `owner/slug` pair (`heptapod/titanic`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRef {
    pub kind: ResourceKind,
    pub id: String,
}

impl ResourceRef {
    /// Parse a Kaggle URL into a resource reference.
    ///
    /// Accepts `/competitions/<slug>`, the short `/c/<slug>`, and
    /// `/datasets/<owner>/<slug>` paths. Query strings, fragments, and
    /// trailing path segments are ignored.
    pub fn from_url(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(IngestError::validation("URL cannot be empty"));
        }

        let url = Url::parse(trimmed)
            .map_err(|e| IngestError::validation(format!("invalid URL {trimmed:?}: {e}")))?;

        let host = url.host_str().unwrap_or("");
        if !host.eq_ignore_ascii_case("kaggle.com") && !host.to_ascii_lowercase().ends_with(".kaggle.com") {
            return Err(IngestError::validation(format!(
                "URL must point at kaggle.com, got host {host:?}"
            )));
        }

        let segments: Vec<&str> = url
            .path_segments()
            .map(|s| s.filter(|p| !p.is_empty()).collect())
            .unwrap_or_default();

        match segments.as_slice() {
            ["datasets", owner, slug, ..] => Ok(Self {
                kind: ResourceKind::Dataset,
                id: format!("{owner}/{slug}"),
            }),
            ["competitions", slug, ..] | ["c", slug, ..] => Ok(Self {
                kind: ResourceKind::Competition,
                id: (*slug).to_string(),
            }),
            _ => Err(IngestError::validation(format!(
                "unrecognized Kaggle URL format: {trimmed}"
            ))),
        }
    }
}

impl std::fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

// ---------------------------------------------------------------------------
// OutputFormat
// ---------------------------------------------------------------------------

/// Requested rendering format for the ingestion result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Token-optimized section-based format.
    Toon,
    /// Plain text.
    Txt,
    /// Markdown.
    Md,
}

impl OutputFormat {
    /// File extension for this format (no leading dot).
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Toon => "toon",
            Self::Txt => "txt",
            Self::Md => "md",
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "toon" => Ok(Self::Toon),
            "txt" | "text" => Ok(Self::Txt),
            "md" | "markdown" => Ok(Self::Md),
            other => Err(IngestError::validation(format!(
                "unsupported output format {other:?} (expected toon, txt, or md)"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// IngestRequest
// ---------------------------------------------------------------------------

/// A validated ingestion request, as handed to the job registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestRequest {
    /// The resource to ingest.
    pub resource: ResourceRef,
    /// Maximum number of notebooks to fetch content for.
    pub top_n: usize,
    /// Requested output format.
    pub format: OutputFormat,
    /// Metadata-only validation pass; no notebook content is fetched.
    pub dry_run: bool,
}

impl IngestRequest {
    /// Check request parameters before any orchestration work starts.
    pub fn validate(&self) -> Result<()> {
        if !(MIN_NOTEBOOKS..=MAX_NOTEBOOKS).contains(&self.top_n) {
            return Err(IngestError::validation(format!(
                "top_n must be between {MIN_NOTEBOOKS} and {MAX_NOTEBOOKS}, got {}",
                self.top_n
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Notebook metadata and content
// ---------------------------------------------------------------------------

/// Raw notebook metadata as reported by the data source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotebookMeta {
    /// Notebook reference (`username/notebook-slug`).
    pub reference: String,
    /// Notebook title.
    pub title: String,
    /// Author username.
    pub author: String,
    /// Upvote count. May be negative or garbage upstream; ranking clamps it.
    pub votes: i64,
    /// Full URL to the notebook.
    pub url: String,
    /// Last-run timestamp, if the source reported one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
}

/// Parsed cell content from a notebook.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotebookContent {
    /// Markdown cell bodies, in document order.
    pub markdown: Vec<String>,
    /// Code cell bodies, in document order.
    pub code: Vec<String>,
}

impl NotebookContent {
    /// True when no cell survived parsing/cleaning.
    pub fn is_empty(&self) -> bool {
        self.markdown.is_empty() && self.code.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Dataset schema samples
// ---------------------------------------------------------------------------

/// Name and inferred type of one dataset column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub dtype: String,
}

/// Schema and sample rows for one attached dataset file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetFileSchema {
    pub filename: String,
    pub columns: Vec<ColumnInfo>,
    pub sample_rows: Vec<Vec<String>>,
}

// ---------------------------------------------------------------------------
// Resource metadata
// ---------------------------------------------------------------------------

/// Metadata describing the ingested resource itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceMetadata {
    pub title: String,
    pub url: String,
    pub kind: ResourceKind,
    #[serde(default)]
    pub description: String,
    /// Competition category, when applicable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Prize information, when applicable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prize: Option<String>,
    /// Evaluation metric, when applicable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation_metric: Option<String>,
    /// Submission deadline, when applicable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<String>,
}

// ---------------------------------------------------------------------------
// Per-notebook outcomes
// ---------------------------------------------------------------------------

/// Descriptor for a notebook fetch that failed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchFailure {
    /// Notebook reference that failed.
    pub reference: String,
    /// Title if it was known before the failure; falls back to the reference.
    pub title: String,
    /// Human-readable failure reason.
    pub reason: String,
}

/// Outcome of one notebook fetch. Renderers match both arms exhaustively.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum NotebookOutcome {
    Success {
        /// 1-based rank position of this notebook in the result.
        index: usize,
        meta: NotebookMeta,
        content: NotebookContent,
    },
    Failure(FetchFailure),
}

impl NotebookOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

// ---------------------------------------------------------------------------
// Aggregated result
// ---------------------------------------------------------------------------

/// Aggregate statistics for one ingestion run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionStats {
    /// Notebooks the caller asked for.
    pub requested: usize,
    /// Notebooks fetched and parsed successfully.
    pub successful: usize,
    /// Notebooks that failed.
    pub failed: usize,
    /// One descriptor per failed notebook.
    pub failures: Vec<FetchFailure>,
    /// Wall-clock duration of the run, in seconds.
    pub duration_seconds: f64,
    /// Whether this was a metadata-only dry run.
    pub dry_run: bool,
    /// When orchestration started.
    pub started_at: DateTime<Utc>,
}

/// The complete output of one ingestion job, consumed by all renderers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionResult {
    pub metadata: ResourceMetadata,
    /// Schema samples for attached dataset files (may be empty).
    #[serde(default)]
    pub schemas: Vec<DatasetFileSchema>,
    /// Per-notebook outcomes, ordered by rank index.
    #[serde(default)]
    pub notebooks: Vec<NotebookOutcome>,
    pub stats: IngestionStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_id_roundtrip() {
        let id = JobId::new();
        let s = id.to_string();
        let parsed: JobId = s.parse().expect("parse JobId");
        assert_eq!(id, parsed);
    }

    #[test]
    fn parses_competition_urls() {
        let long = ResourceRef::from_url("https://www.kaggle.com/competitions/titanic").unwrap();
        assert_eq!(long.kind, ResourceKind::Competition);
        assert_eq!(long.id, "titanic");

        let short = ResourceRef::from_url("https://kaggle.com/c/spaceship-titanic/overview").unwrap();
        assert_eq!(short.kind, ResourceKind::Competition);
        assert_eq!(short.id, "spaceship-titanic");
    }

    #[test]
    fn parses_dataset_urls() {
        let r =
            ResourceRef::from_url("https://www.kaggle.com/datasets/heptapod/titanic?select=a.csv")
                .unwrap();
        assert_eq!(r.kind, ResourceKind::Dataset);
        assert_eq!(r.id, "heptapod/titanic");
    }

    #[test]
    fn rejects_non_kaggle_and_malformed_urls() {
        assert!(ResourceRef::from_url("").is_err());
        assert!(ResourceRef::from_url("https://example.com/competitions/titanic").is_err());
        assert!(ResourceRef::from_url("https://kaggle.com/profile/someone").is_err());
        assert!(ResourceRef::from_url("not a url").is_err());
    }

    #[test]
    fn output_format_parsing() {
        assert_eq!("toon".parse::<OutputFormat>().unwrap(), OutputFormat::Toon);
        assert_eq!("TXT".parse::<OutputFormat>().unwrap(), OutputFormat::Txt);
        assert_eq!("markdown".parse::<OutputFormat>().unwrap(), OutputFormat::Md);
        assert!("yaml".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn request_validation_bounds() {
        let mut req = IngestRequest {
            resource: ResourceRef {
                kind: ResourceKind::Competition,
                id: "titanic".into(),
            },
            top_n: 10,
            format: OutputFormat::Toon,
            dry_run: false,
        };
        assert!(req.validate().is_ok());

        req.top_n = 0;
        assert!(req.validate().is_err());
        req.top_n = 51;
        assert!(req.validate().is_err());
        req.top_n = 50;
        assert!(req.validate().is_ok());
    }

    #[test]
    fn outcome_serializes_tagged() {
        let outcome = NotebookOutcome::Failure(FetchFailure {
            reference: "user/broken-notebook".into(),
            title: "Broken".into(),
            reason: "HTTP 404".into(),
        });
        let json = serde_json::to_string(&outcome).expect("serialize");
        assert!(json.contains(r#""outcome":"failure""#));

        let parsed: NotebookOutcome = serde_json::from_str(&json).expect("deserialize");
        assert!(!parsed.is_success());
    }
}
