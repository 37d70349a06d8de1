//! Kaggle data-source client.
//!
//! [`NotebookSource`] is the seam the orchestrator works against; the
//! production implementation is [`KaggleClient`], a thin wrapper over the
//! Kaggle REST API with basic-auth credentials pulled from the environment.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use kaggleingest_shared::{
    IngestError, KaggleConfig, NotebookContent, NotebookMeta, Result, ResourceKind,
    ResourceMetadata, ResourceRef,
};

pub mod csv;
pub mod notebook;

pub use csv::{MAX_SAMPLE_ROWS, parse_csv_sample};
pub use notebook::parse_notebook;

/// User-Agent string for API requests.
const USER_AGENT: &str = concat!("KaggleIngest/", env!("CARGO_PKG_VERSION"));

/// Per-request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// NotebookSource
// ---------------------------------------------------------------------------

/// Abstraction over the upstream notebook provider.
///
/// The orchestrator and tests depend on this trait, never on the concrete
/// HTTP client.
#[async_trait]
pub trait NotebookSource: Send + Sync {
    /// Fetch metadata describing the resource itself.
    async fn resource_metadata(&self, resource: &ResourceRef) -> Result<ResourceMetadata>;

    /// List candidate notebooks for a resource, most-voted first, up to
    /// `limit` entries.
    async fn list_notebooks(&self, resource: &ResourceRef, limit: usize)
    -> Result<Vec<NotebookMeta>>;

    /// Fetch and parse the content of one notebook by reference.
    async fn fetch_notebook(&self, reference: &str) -> Result<NotebookContent>;

    /// List data file names attached to the resource.
    async fn list_data_files(&self, resource: &ResourceRef) -> Result<Vec<String>>;

    /// Download the head of one data file and extract its schema sample.
    async fn fetch_data_sample(
        &self,
        resource: &ResourceRef,
        filename: &str,
    ) -> Result<kaggleingest_shared::DatasetFileSchema>;
}

// ---------------------------------------------------------------------------
// Kaggle API wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompetitionItem {
    #[serde(rename = "ref")]
    reference: String,
    title: Option<String>,
    url: Option<String>,
    description: Option<String>,
    category: Option<String>,
    reward: Option<String>,
    evaluation_metric: Option<String>,
    deadline: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DatasetView {
    title: Option<String>,
    subtitle: Option<String>,
    description: Option<String>,
    url: Option<String>,
    #[serde(default)]
    files: Vec<DataFileEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DataFileEntry {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KernelItem {
    #[serde(rename = "ref")]
    reference: String,
    title: Option<String>,
    author: Option<String>,
    total_votes: Option<i64>,
    last_run_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct KernelPull {
    blob: Option<KernelBlob>,
}

#[derive(Debug, Deserialize)]
struct KernelBlob {
    source: Option<String>,
}

// ---------------------------------------------------------------------------
// KaggleClient
// ---------------------------------------------------------------------------

/// HTTP client for the Kaggle REST API.
pub struct KaggleClient {
    client: Client,
    api_base: String,
    username: String,
    key: String,
}

impl KaggleClient {
    /// Build a client from config. Credentials come from the env vars the
    /// config names; their values are read once here and never logged.
    pub fn new(config: &KaggleConfig) -> Result<Self> {
        let username = read_env(&config.username_env)?;
        let key = read_env(&config.key_env)?;

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| IngestError::Source(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            username,
            key,
        })
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let response = self
            .client
            .get(url)
            .query(query)
            .basic_auth(&self.username, Some(&self.key))
            .send()
            .await
            .map_err(|e| IngestError::Source(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(IngestError::Source(format!("{url}: HTTP {status}")));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| IngestError::Source(format!("{url}: invalid response body: {e}")))
    }

    async fn get_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .basic_auth(&self.username, Some(&self.key))
            .send()
            .await
            .map_err(|e| IngestError::Source(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(IngestError::Source(format!("{url}: HTTP {status}")));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| IngestError::Source(format!("{url}: body read failed: {e}")))?;
        Ok(bytes.to_vec())
    }

    async fn competition_metadata(&self, slug: &str) -> Result<ResourceMetadata> {
        let url = format!("{}/competitions/list", self.api_base);
        let items: Vec<CompetitionItem> =
            self.get_json(&url, &[("search", slug.to_string())]).await?;

        let item = items
            .into_iter()
            .find(|c| c.reference == slug || c.reference.ends_with(&format!("/{slug}")))
            .ok_or_else(|| IngestError::Source(format!("competition {slug:?} not found")))?;

        Ok(ResourceMetadata {
            title: item.title.unwrap_or_else(|| slug.to_string()),
            url: item
                .url
                .unwrap_or_else(|| format!("https://www.kaggle.com/competitions/{slug}")),
            kind: ResourceKind::Competition,
            description: item.description.unwrap_or_default(),
            category: item.category,
            prize: item.reward,
            evaluation_metric: item.evaluation_metric,
            deadline: item.deadline,
        })
    }

    async fn dataset_view(&self, id: &str) -> Result<DatasetView> {
        let url = format!("{}/datasets/view/{id}", self.api_base);
        self.get_json(&url, &[]).await
    }
}

fn read_env(var_name: &str) -> Result<String> {
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(IngestError::config(format!(
            "Kaggle credentials not found. Set the {var_name} environment variable."
        ))),
    }
}

#[async_trait]
impl NotebookSource for KaggleClient {
    #[instrument(skip_all, fields(resource = %resource))]
    async fn resource_metadata(&self, resource: &ResourceRef) -> Result<ResourceMetadata> {
        match resource.kind {
            ResourceKind::Competition => self.competition_metadata(&resource.id).await,
            ResourceKind::Dataset => {
                let view = self.dataset_view(&resource.id).await?;
                let description = match (view.subtitle, view.description) {
                    (Some(sub), Some(desc)) if !desc.is_empty() => format!("{sub}\n{desc}"),
                    (Some(sub), _) => sub,
                    (None, Some(desc)) => desc,
                    (None, None) => String::new(),
                };
                Ok(ResourceMetadata {
                    title: view.title.unwrap_or_else(|| resource.id.clone()),
                    url: view
                        .url
                        .unwrap_or_else(|| format!("https://www.kaggle.com/datasets/{}", resource.id)),
                    kind: ResourceKind::Dataset,
                    description,
                    category: None,
                    prize: None,
                    evaluation_metric: None,
                    deadline: None,
                })
            }
        }
    }

    #[instrument(skip_all, fields(resource = %resource, limit = limit))]
    async fn list_notebooks(
        &self,
        resource: &ResourceRef,
        limit: usize,
    ) -> Result<Vec<NotebookMeta>> {
        let filter = match resource.kind {
            ResourceKind::Competition => "competition",
            ResourceKind::Dataset => "dataset",
        };
        let url = format!("{}/kernels/list", self.api_base);
        let items: Vec<KernelItem> = self
            .get_json(
                &url,
                &[
                    (filter, resource.id.clone()),
                    ("sortBy", "voteCount".to_string()),
                    ("pageSize", limit.to_string()),
                ],
            )
            .await?;

        debug!(count = items.len(), "listed notebooks");

        Ok(items
            .into_iter()
            .take(limit)
            .map(|item| {
                let author = item
                    .author
                    .unwrap_or_else(|| item.reference.split('/').next().unwrap_or("").to_string());
                NotebookMeta {
                    title: item.title.unwrap_or_else(|| item.reference.clone()),
                    author,
                    votes: item.total_votes.unwrap_or(0),
                    url: format!("https://www.kaggle.com/code/{}", item.reference),
                    last_updated: item.last_run_time,
                    reference: item.reference,
                }
            })
            .collect())
    }

    #[instrument(skip_all, fields(reference = %reference))]
    async fn fetch_notebook(&self, reference: &str) -> Result<NotebookContent> {
        let (user, slug) = reference.split_once('/').ok_or_else(|| {
            IngestError::Source(format!("malformed notebook reference {reference:?}"))
        })?;

        let url = format!("{}/kernels/pull", self.api_base);
        let pull: KernelPull = self
            .get_json(
                &url,
                &[
                    ("userName", user.to_string()),
                    ("kernelSlug", slug.to_string()),
                ],
            )
            .await?;

        let source = pull
            .blob
            .and_then(|b| b.source)
            .ok_or_else(|| IngestError::Source(format!("{reference}: empty notebook blob")))?;

        notebook::parse_notebook(&source)
    }

    #[instrument(skip_all, fields(resource = %resource))]
    async fn list_data_files(&self, resource: &ResourceRef) -> Result<Vec<String>> {
        match resource.kind {
            ResourceKind::Competition => {
                let url = format!("{}/competitions/data/list/{}", self.api_base, resource.id);
                let files: Vec<DataFileEntry> = self.get_json(&url, &[]).await?;
                Ok(files.into_iter().map(|f| f.name).collect())
            }
            ResourceKind::Dataset => {
                let view = self.dataset_view(&resource.id).await?;
                Ok(view.files.into_iter().map(|f| f.name).collect())
            }
        }
    }

    #[instrument(skip_all, fields(resource = %resource, filename = %filename))]
    async fn fetch_data_sample(
        &self,
        resource: &ResourceRef,
        filename: &str,
    ) -> Result<kaggleingest_shared::DatasetFileSchema> {
        let url = match resource.kind {
            ResourceKind::Competition => format!(
                "{}/competitions/data/download/{}/{filename}",
                self.api_base, resource.id
            ),
            ResourceKind::Dataset => format!(
                "{}/datasets/download/{}/{filename}",
                self.api_base, resource.id
            ),
        };

        let bytes = self.get_bytes(&url).await?;
        if bytes.is_empty() {
            warn!(filename, "downloaded file is empty");
        }
        csv::parse_csv_sample(filename, &bytes)
    }
}
