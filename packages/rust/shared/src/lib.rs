//! Shared types, error model, and configuration for KaggleIngest.
//!
//! This crate is the foundation depended on by all other KaggleIngest crates.
//! It provides:
//! - [`IngestError`], the unified error type
//! - Domain types ([`IngestRequest`], [`IngestionResult`], [`NotebookMeta`], [`JobId`])
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CacheConfig, DefaultsConfig, KaggleConfig, RankingConfig, config_dir,
    config_file_path, init_config, load_config, load_config_from, validate_credentials,
};
pub use error::{IngestError, Result};
pub use types::{
    ColumnInfo, DEFAULT_NOTEBOOKS, DatasetFileSchema, FetchFailure, IngestRequest,
    IngestionResult, IngestionStats, JobId, MAX_NOTEBOOKS, MIN_NOTEBOOKS, NotebookContent,
    NotebookMeta, NotebookOutcome, OutputFormat, ResourceKind, ResourceMetadata, ResourceRef,
};
