//! Configuration management for cheereading
//!
//! Loads the TOML configuration file, applies `CHEEREADING_SECTION__KEY`
//! environment overrides and validates the result.

use crate::error::{CheerError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

mod validator;

pub use validator::ConfigValidator;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "_meta")]
    pub meta: MetaConfig,
    pub storage: StorageConfig,
    pub embedding: EmbeddingConfig,
    pub indexing: IndexingConfig,
    pub recommendation: RecommendationConfig,
}

/// Metadata about the configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaConfig {
    pub schema_version: String,
    #[serde(default = "current_timestamp")]
    pub created_at: String,
    #[serde(default = "current_timestamp")]
    pub last_modified: String,
}

fn current_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub model: String,
    pub batch_size: usize,
}

/// Similarity index configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingConfig {
    /// File name of the persisted index, relative to `<data_dir>/store/vectors`
    pub index_file: String,
}

/// Recommendation pipeline tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationConfig {
    /// Result size when the caller does not ask for one
    pub default_k: usize,
    /// Number of most recent interactions folded into the query vector
    pub history_window: usize,
    /// Candidates fetched from the index per requested result
    pub overfetch_factor: usize,
    /// Sample size the consumer substitutes for an empty recommendation
    pub fallback_size: usize,
    /// Categories hidden until the user has read something tagged with one of them
    pub gatekeeper_categories: Vec<String>,
}

impl Default for RecommendationConfig {
    fn default() -> Self {
        Self {
            default_k: 30,
            history_window: 20,
            overfetch_factor: 5,
            fallback_size: 10,
            // children, kids, toddlers
            gatekeeper_categories: vec![
                "아동".to_string(),
                "어린이".to_string(),
                "유아".to_string(),
            ],
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        Self::load_with_vars(path, std::env::vars())
    }

    /// Load configuration from a file, falling back to validated defaults
    /// when the file does not exist
    pub fn load_or_default(path: &Path) -> Result<Self> {
        Self::load_or_default_with_vars(path, std::env::vars())
    }

    fn load_or_default_with_vars<I>(path: &Path, vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        if path.exists() {
            return Self::load_with_vars(path, vars);
        }

        tracing::warn!(
            "Config file not found, using defaults. Run 'cheereading config init' to create one."
        );
        let mut config = Config::default();
        config.apply_overrides(vars);
        ConfigValidator::validate(&config)?;
        Ok(config)
    }

    fn load_with_vars<I>(path: &Path, vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        if !path.exists() {
            return Err(CheerError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| CheerError::Io {
            source: e,
            context: format!("Failed to read config file: {:?}", path),
        })?;
        let mut config: Config = toml::from_str(&content)?;

        config.apply_overrides(vars);

        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| CheerError::Io {
            source: e,
            context: format!("Failed to write config file: {:?}", path),
        })?;
        Ok(())
    }

    /// Apply environment variable overrides
    /// Environment variables in format: CHEEREADING_SECTION__KEY=value
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(std::env::vars());
    }

    fn apply_overrides<I>(&mut self, vars: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            if let Some(config_key) = key.strip_prefix("CHEEREADING_") {
                if let Err(e) = self.set_value_from_env(config_key, &value) {
                    tracing::warn!("Failed to apply env override {}: {}", key, e);
                }
            }
        }
    }

    fn set_value_from_env(&mut self, path: &str, value: &str) -> Result<()> {
        match path {
            "STORAGE__DATA_DIR" => {
                self.storage.data_dir = PathBuf::from(value);
            }
            "EMBEDDING__MODEL" => {
                self.embedding.model = value.to_string();
            }
            "EMBEDDING__BATCH_SIZE" => {
                self.embedding.batch_size = parse_usize(path, value)?;
            }
            "INDEXING__INDEX_FILE" => {
                self.indexing.index_file = value.to_string();
            }
            "RECOMMENDATION__DEFAULT_K" => {
                self.recommendation.default_k = parse_usize(path, value)?;
            }
            "RECOMMENDATION__HISTORY_WINDOW" => {
                self.recommendation.history_window = parse_usize(path, value)?;
            }
            "RECOMMENDATION__OVERFETCH_FACTOR" => {
                self.recommendation.overfetch_factor = parse_usize(path, value)?;
            }
            "RECOMMENDATION__FALLBACK_SIZE" => {
                self.recommendation.fallback_size = parse_usize(path, value)?;
            }
            "RECOMMENDATION__GATEKEEPER_CATEGORIES" => {
                self.recommendation.gatekeeper_categories = value
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect();
            }
            _ => {
                tracing::debug!("Unknown env config key: {}", path);
            }
        }
        Ok(())
    }

    /// Data directory with a leading `~/` expanded
    pub fn data_dir(&self) -> Result<PathBuf> {
        expand_path(&self.storage.data_dir)
    }

    /// Get the default configuration file path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| CheerError::Config("Cannot determine config directory".to_string()))?;

        Ok(config_dir.join("cheereading").join("config.toml"))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            meta: MetaConfig {
                schema_version: "1.0.0".to_string(),
                created_at: current_timestamp(),
                last_modified: current_timestamp(),
            },
            storage: StorageConfig {
                data_dir: PathBuf::from("~/.cheereading"),
            },
            embedding: EmbeddingConfig {
                model: "paraphrase-multilingual-mpnet-base-v2".to_string(),
                batch_size: 32,
            },
            indexing: IndexingConfig {
                index_file: "items.index".to_string(),
            },
            recommendation: RecommendationConfig::default(),
        }
    }
}

fn parse_usize(path: &str, value: &str) -> Result<usize> {
    value.parse().map_err(|_| CheerError::InvalidConfigValue {
        path: path.to_string(),
        message: format!("Cannot parse '{}' as an unsigned integer", value),
    })
}

/// Expand a leading `~/` to the home directory
pub fn expand_path(path: &Path) -> Result<PathBuf> {
    let path_str = path
        .to_str()
        .ok_or_else(|| CheerError::Config("Invalid path encoding".to_string()))?;

    if let Some(stripped) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| CheerError::Config("Cannot determine home directory".to_string()))?;
        Ok(home.join(stripped))
    } else {
        Ok(path.to_path_buf())
    }
}
