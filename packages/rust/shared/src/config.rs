//! Application configuration for KaggleIngest.
//!
//! User config lives at `~/.kaggleingest/kaggleingest.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{IngestError, Result};
use crate::types::DEFAULT_NOTEBOOKS;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "kaggleingest.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".kaggleingest";

// ---------------------------------------------------------------------------
// Config structs (matching kaggleingest.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Ranking tunables.
    #[serde(default)]
    pub ranking: RankingConfig,

    /// Result cache settings.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Kaggle API settings.
    #[serde(default)]
    pub kaggle: KaggleConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Default number of notebooks to ingest.
    #[serde(default = "default_top_n")]
    pub top_n: usize,

    /// Default output format.
    #[serde(default = "default_format")]
    pub format: String,

    /// Maximum concurrent notebook downloads.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            top_n: default_top_n(),
            format: default_format(),
            concurrency: default_concurrency(),
        }
    }
}

fn default_top_n() -> usize {
    DEFAULT_NOTEBOOKS
}
fn default_format() -> String {
    "toon".into()
}
fn default_concurrency() -> usize {
    4
}

/// `[ranking]` section.
///
/// The decay curve is a tunable, not a contract: recent content should
/// outrank stale content, and the half-life controls how aggressively.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankingConfig {
    /// Days after which a notebook's recency weight halves.
    #[serde(default = "default_half_life_days")]
    pub half_life_days: f64,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            half_life_days: default_half_life_days(),
        }
    }
}

fn default_half_life_days() -> f64 {
    90.0
}

/// `[cache]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Seconds a rendered result stays servable.
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,

    /// Seconds between background sweeps of expired entries.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

fn default_ttl_secs() -> u64 {
    3600
}
fn default_sweep_interval_secs() -> u64 {
    1800
}

/// `[kaggle]` section.
///
/// Only env var *names* are stored, never the credentials themselves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KaggleConfig {
    /// Base URL of the Kaggle REST API.
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Name of the env var holding the Kaggle username.
    #[serde(default = "default_username_env")]
    pub username_env: String,

    /// Name of the env var holding the Kaggle API key.
    #[serde(default = "default_key_env")]
    pub key_env: String,
}

impl Default for KaggleConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            username_env: default_username_env(),
            key_env: default_key_env(),
        }
    }
}

fn default_api_base() -> String {
    "https://www.kaggle.com/api/v1".into()
}
fn default_username_env() -> String {
    "KAGGLE_USERNAME".into()
}
fn default_key_env() -> String {
    "KAGGLE_KEY".into()
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.kaggleingest/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| IngestError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.kaggleingest/kaggleingest.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| IngestError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| IngestError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| IngestError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| IngestError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| IngestError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Check that both Kaggle credential env vars are set and non-empty.
pub fn validate_credentials(config: &AppConfig) -> Result<()> {
    for var_name in [&config.kaggle.username_env, &config.kaggle.key_env] {
        match std::env::var(var_name) {
            Ok(val) if !val.is_empty() => {}
            _ => {
                return Err(IngestError::config(format!(
                    "Kaggle credentials not found. Set the {var_name} environment variable.\n\
                     Create an API token at https://www.kaggle.com/settings"
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("top_n"));
        assert!(toml_str.contains("KAGGLE_USERNAME"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.defaults.top_n, 10);
        assert_eq!(parsed.defaults.concurrency, 4);
        assert_eq!(parsed.cache.ttl_secs, 3600);
        assert_eq!(parsed.ranking.half_life_days, 90.0);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[defaults]
top_n = 5

[cache]
ttl_secs = 120
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.defaults.top_n, 5);
        assert_eq!(config.defaults.concurrency, 4);
        assert_eq!(config.cache.ttl_secs, 120);
        assert_eq!(config.cache.sweep_interval_secs, 1800);
        assert_eq!(config.kaggle.api_base, "https://www.kaggle.com/api/v1");
    }

    #[test]
    fn cache_durations() {
        let cache = CacheConfig {
            ttl_secs: 60,
            sweep_interval_secs: 30,
        };
        assert_eq!(cache.ttl(), Duration::from_secs(60));
        assert_eq!(cache.sweep_interval(), Duration::from_secs(30));
    }

    #[test]
    fn credential_validation() {
        let mut config = AppConfig::default();
        // Use a unique env var name to avoid interfering with other tests
        config.kaggle.username_env = "KI_TEST_NONEXISTENT_USER_12345".into();
        let result = validate_credentials(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("credentials not found"));
    }
}
