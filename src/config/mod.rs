//! Configuration management for chunkvault
//!
//! Handles loading, saving, and validating configuration from TOML files.
//! Relative paths in the file are resolved against the config file's directory.

mod defaults;

pub use defaults::*;

use crate::ann::Metric;
use crate::error::{Error, Result};
use crate::text::TextOptions;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// SQLite database file
    #[serde(default = "default_database")]
    pub database: PathBuf,

    /// Directory of per-model ANN save files
    #[serde(default = "default_index_dir")]
    pub index_dir: PathBuf,

    /// SQLite busy timeout
    #[serde(default = "default_busy_timeout_secs")]
    pub busy_timeout_secs: u64,

    /// Tokenizer and normalizer settings
    #[serde(default = "default_text_options")]
    pub text: TextOptions,

    /// Search settings
    #[serde(default)]
    pub search: SearchConfig,

    /// ANN graph settings
    #[serde(default)]
    pub ann: AnnConfig,

    /// Embedding models, one ANN graph each
    #[serde(default)]
    pub embedding_models: Vec<EmbeddingModelConfig>,

    /// Optional summarization model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation_model: Option<GenerationModelConfig>,

    /// Resolved paths (internal, not user-editable)
    #[serde(skip)]
    pub paths: PathsConfig,
}

/// Search configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Limit used when a request gives none or an invalid one
    #[serde(default = "default_search_limit")]
    pub default_limit: usize,

    /// Largest limit honored
    #[serde(default = "default_search_max_limit")]
    pub max_limit: usize,
}

/// ANN graph configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnConfig {
    #[serde(default = "default_ann_metric")]
    pub metric: Metric,

    /// Lower bound on the candidate list size during search
    #[serde(default = "default_ann_ef_search")]
    pub ef_search: usize,

    /// Rebuild a graph once tombstones exceed this share of its nodes
    #[serde(default = "default_ann_compaction_ratio")]
    pub compaction_ratio: f64,
}

/// One configured embedding model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingModelConfig {
    /// Model id used in search requests and as the ANN file stem
    pub id: String,

    /// Provider family tag, e.g. `ollama`
    pub provider: String,

    #[serde(default = "default_provider_timeout_secs")]
    pub timeout_secs: u64,

    /// Provider-specific settings
    #[serde(default)]
    pub options: toml::Table,
}

/// Summarization model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationModelConfig {
    /// Provider family tag, `ollama` or `openai`
    pub provider: String,

    #[serde(default = "default_provider_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub options: toml::Table,
}

/// Internal paths configuration
#[derive(Debug, Clone, Default)]
pub struct PathsConfig {
    /// Directory the config file lives in
    pub base_dir: PathBuf,

    /// Path to config file
    pub config_file: PathBuf,

    /// Resolved SQLite database path
    pub db_file: PathBuf,

    /// Resolved ANN save-file directory
    pub index_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: default_database(),
            index_dir: default_index_dir(),
            busy_timeout_secs: default_busy_timeout_secs(),
            text: default_text_options(),
            search: SearchConfig::default(),
            ann: AnnConfig::default(),
            embedding_models: Vec::new(),
            generation_model: None,
            paths: PathsConfig::default(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: default_search_limit(),
            max_limit: default_search_max_limit(),
        }
    }
}

impl Default for AnnConfig {
    fn default() -> Self {
        Self {
            metric: default_ann_metric(),
            ef_search: default_ann_ef_search(),
            compaction_ratio: default_ann_compaction_ratio(),
        }
    }
}

impl Config {
    /// Get the default base directory for chunkvault (~/.chunkvault)
    pub fn default_base_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".chunkvault")
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        Self::default_base_dir().join("config.toml")
    }

    /// Resolve `paths` for a config that lives in `base_dir`
    pub fn init_paths(&mut self, base_dir: PathBuf, config_file: PathBuf) {
        self.paths = PathsConfig {
            db_file: resolve_path(&base_dir, &self.database),
            index_dir: resolve_path(&base_dir, &self.index_dir),
            config_file,
            base_dir,
        };
    }

    /// Load configuration from a specific file path
    pub fn load(config_path: &Path) -> Result<Self> {
        debug!("Loading config from {:?}", config_path);

        if !config_path.exists() {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                config_path.display()
            )));
        }

        let content = std::fs::read_to_string(config_path)?;
        let mut config: Config = toml::from_str(&content)?;

        let base = config_path.parent().unwrap_or(Path::new(".")).to_path_buf();
        config.init_paths(base, config_path.to_path_buf());

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to `paths.config_file`
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.paths.config_file.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&self.paths.config_file, content)?;
        info!("Saved config to {:?}", self.paths.config_file);
        Ok(())
    }

    /// Path of the ANN save file for a model
    pub fn index_file(&self, model_id: &str) -> PathBuf {
        self.paths.index_dir.join(format!("{}.ann", model_id))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.search.default_limit == 0 {
            return Err(Error::Config(
                "search.default_limit must be positive".to_string(),
            ));
        }

        if self.search.default_limit > self.search.max_limit {
            return Err(Error::Config(
                "search.default_limit must be <= search.max_limit".to_string(),
            ));
        }

        if self.ann.ef_search == 0 {
            return Err(Error::Config("ann.ef_search must be positive".to_string()));
        }

        if !(self.ann.compaction_ratio > 0.0 && self.ann.compaction_ratio <= 1.0) {
            return Err(Error::Config(
                "ann.compaction_ratio must be in (0.0, 1.0]".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for model in &self.embedding_models {
            validate_model_id(&model.id)?;
            if !seen.insert(model.id.as_str()) {
                return Err(Error::Config(format!(
                    "duplicate embedding model id: {}",
                    model.id
                )));
            }
        }

        Ok(())
    }
}

fn validate_model_id(id: &str) -> Result<()> {
    if id.trim().is_empty() {
        return Err(Error::Config("embedding model id must not be empty".to_string()));
    }

    if id.eq_ignore_ascii_case(LEXICAL_MODEL_ID) {
        return Err(Error::Config(format!(
            "embedding model id '{}' is reserved for lexical search",
            id
        )));
    }

    // The id doubles as a file stem under index_dir
    if id.contains(['/', '\\']) || id == "." || id == ".." {
        return Err(Error::Config(format!(
            "embedding model id '{}' must be usable as a file name",
            id
        )));
    }

    Ok(())
}

/// Expand `~` and anchor relative paths at `base`
fn resolve_path(base: &Path, path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }

    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// Commented example appended to freshly generated config files
pub const EXAMPLE_MODELS_TOML: &str = r#"
# Embedding models. Each one gets its own ANN graph at <index_dir>/<id>.ann.
#
# [[embedding_models]]
# id = "nomic-embed-text"
# provider = "ollama"
# timeout_secs = 60
# [embedding_models.options]
# endpoint = "http://127.0.0.1:11434"
# model = "nomic-embed-text"
#
# Optional summarization model used by `add --summarize`.
#
# [generation_model]
# provider = "openai"
# [generation_model.options]
# endpoint = "https://api.openai.com/v1"
# model = "gpt-4o-mini"
# token_env = "OPENAI_API_KEY"
"#;

/// Render a config for writing to disk
pub fn render_config_toml(config: &Config) -> Result<String> {
    let mut out = toml::to_string_pretty(config)?;
    if config.embedding_models.is_empty() {
        out.push_str(EXAMPLE_MODELS_TOML);
    }
    Ok(out)
}
