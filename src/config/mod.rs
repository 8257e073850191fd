//! Configuration management for sqlingo
//!
//! Handles loading, saving, and validating configuration from TOML files.

mod defaults;

pub use defaults::*;

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Qdrant connection URL
    #[serde(default = "default_qdrant_url")]
    pub qdrant_url: String,

    /// Environment variable name for Qdrant API key
    #[serde(default = "default_qdrant_api_key_env")]
    pub qdrant_api_key_env: String,

    /// Vector index configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Embedding model configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Retrieval and prompt composition
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Generation service configuration
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Relational source connection settings
    #[serde(default)]
    pub source: SourceConfig,

    /// Example corpus configuration
    #[serde(default)]
    pub examples: ExamplesConfig,

    /// Paths configuration (internal, not user-editable)
    #[serde(skip)]
    pub paths: PathsConfig,
}

/// Vector index configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Index backend: "qdrant" or "memory"
    #[serde(default = "default_store_backend")]
    pub backend: String,

    /// Name of the shared example collection (must carry the reserved prefix)
    #[serde(default = "default_example_collection")]
    pub example_collection: String,
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Backend: "fastembed", "http" or "hashing"
    #[serde(default = "default_embedding_backend")]
    pub backend: String,

    /// Model name/identifier
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Embedding dimension (must match model)
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    /// Batch size for embedding
    #[serde(default = "default_embedding_batch_size")]
    pub batch_size: usize,

    /// Base URL of the HTTP embedding backend
    #[serde(default = "default_embedding_backend_url")]
    pub backend_url: String,
}

/// Lookup the expected embedding dimension for a known model
pub fn embedding_dimension_for_model(model: &str) -> Option<usize> {
    match model {
        "BAAI/bge-small-en-v1.5" => Some(384),
        "BAAI/bge-base-en-v1.5" => Some(768),
        "BAAI/bge-large-en-v1.5" => Some(1024),
        "sentence-transformers/all-MiniLM-L6-v2" => Some(384),
        _ => None,
    }
}

impl EmbeddingConfig {
    /// Resolve the effective embedding dimension based on the configured model
    pub fn resolved_dimension(&self) -> usize {
        if self.backend == "hashing" {
            return self.dimension;
        }
        if let Some(expected) = embedding_dimension_for_model(&self.model) {
            if expected != self.dimension {
                warn!(
                    "Embedding dimension {} does not match model '{}' ({}); using {}",
                    self.dimension, self.model, expected, expected
                );
            }
            expected
        } else {
            self.dimension
        }
    }
}

/// Retrieval configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Chunks fetched from each index per question
    #[serde(default = "default_retrieval_top_k")]
    pub top_k: usize,

    /// Byte budget for each retrieved chunk set in the prompt
    #[serde(default = "default_max_context_bytes")]
    pub max_context_bytes: usize,
}

/// Generation service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Model identifier sent with each request
    #[serde(default = "default_generation_model")]
    pub model: String,

    /// Environment variable holding the API key
    #[serde(default = "default_generation_api_key_env")]
    pub api_key_env: String,

    /// Service base URL
    #[serde(default = "default_generation_base_url")]
    pub base_url: String,

    /// Request timeout in seconds
    #[serde(default = "default_generation_timeout")]
    pub timeout_secs: u64,
}

/// Relational source connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Connect/acquire timeout in seconds
    #[serde(default = "default_source_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Pool size used while reflecting
    #[serde(default = "default_source_max_connections")]
    pub max_connections: u32,
}

/// Example corpus configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExamplesConfig {
    /// Path to the JSON corpus (defaults to `<base>/sql_train.json`)
    #[serde(default)]
    pub corpus_path: Option<PathBuf>,
}

/// Internal paths configuration
#[derive(Debug, Clone, Default)]
pub struct PathsConfig {
    /// Base directory for sqlingo data
    pub base_dir: PathBuf,

    /// Path to config file
    pub config_file: PathBuf,

    /// Path to SQLite metadata database
    pub db_file: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            qdrant_url: default_qdrant_url(),
            qdrant_api_key_env: default_qdrant_api_key_env(),
            store: StoreConfig::default(),
            embedding: EmbeddingConfig::default(),
            retrieval: RetrievalConfig::default(),
            generation: GenerationConfig::default(),
            source: SourceConfig::default(),
            examples: ExamplesConfig::default(),
            paths: PathsConfig::default(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            example_collection: default_example_collection(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: default_embedding_backend(),
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
            batch_size: default_embedding_batch_size(),
            backend_url: default_embedding_backend_url(),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_retrieval_top_k(),
            max_context_bytes: default_max_context_bytes(),
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: default_generation_model(),
            api_key_env: default_generation_api_key_env(),
            base_url: default_generation_base_url(),
            timeout_secs: default_generation_timeout(),
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_source_connect_timeout(),
            max_connections: default_source_max_connections(),
        }
    }
}

impl Config {
    /// Get the default base directory for sqlingo (~/.sqlingo)
    pub fn default_base_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".sqlingo")
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        Self::default_base_dir().join("config.toml")
    }

    /// Initialize paths configuration
    pub fn init_paths(&mut self, base_dir: Option<PathBuf>) {
        let base = base_dir.unwrap_or_else(Self::default_base_dir);
        self.paths = PathsConfig {
            config_file: base.join("config.toml"),
            db_file: base.join("metadata.db"),
            base_dir: base,
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
        config.paths = PathsConfig {
            config_file: config_path.to_path_buf(),
            db_file: base.join("metadata.db"),
            base_dir: base,
        };

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from default location
    pub fn load_default() -> Result<Self> {
        Self::load(&Self::default_config_path())
    }

    /// Load configuration from a specific base directory
    pub fn load_from(base_dir: Option<PathBuf>) -> Result<Self> {
        let mut config = Config::default();
        config.init_paths(base_dir);

        if config.paths.config_file.exists() {
            debug!("Loading config from {:?}", config.paths.config_file);
            let content = std::fs::read_to_string(&config.paths.config_file)?;
            let mut loaded: Config = toml::from_str(&content)?;
            loaded.paths = config.paths;
            config = loaded;
        } else {
            debug!("No config file found, using defaults");
        }

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.paths.config_file.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&self.paths.config_file, content)?;
        info!("Saved config to {:?}", self.paths.config_file);
        Ok(())
    }

    /// Get the Qdrant API key from environment
    pub fn qdrant_api_key(&self) -> Option<String> {
        if self.qdrant_api_key_env.is_empty() {
            return None;
        }
        std::env::var(&self.qdrant_api_key_env).ok()
    }

    /// Get the generation API key from environment
    pub fn generation_api_key(&self) -> Option<String> {
        std::env::var(&self.generation.api_key_env).ok()
    }

    /// Resolved path of the example corpus
    pub fn examples_path(&self) -> PathBuf {
        self.examples
            .corpus_path
            .clone()
            .unwrap_or_else(|| self.paths.base_dir.join(default_examples_file_name()))
    }

    /// Check if sqlingo is initialized (config and DB exist)
    pub fn is_initialized(&self) -> bool {
        self.paths.config_file.exists() && self.paths.db_file.exists()
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        match self.store.backend.as_str() {
            "qdrant" | "memory" => {}
            other => {
                return Err(Error::Config(format!(
                    "store.backend must be 'qdrant' or 'memory', got '{}'",
                    other
                )))
            }
        }

        if !self
            .store
            .example_collection
            .starts_with(RESERVED_COLLECTION_PREFIX)
        {
            return Err(Error::Config(format!(
                "store.example_collection must start with the reserved prefix '{}'",
                RESERVED_COLLECTION_PREFIX
            )));
        }

        match self.embedding.backend.as_str() {
            "fastembed" | "http" | "hashing" => {}
            other => {
                return Err(Error::Config(format!(
                    "embedding.backend must be 'fastembed', 'http' or 'hashing', got '{}'",
                    other
                )))
            }
        }

        if self.embedding.dimension == 0 {
            return Err(Error::Config(
                "embedding.dimension must be positive".to_string(),
            ));
        }

        if self.embedding.batch_size == 0 {
            return Err(Error::Config(
                "embedding.batch_size must be positive".to_string(),
            ));
        }

        if self.retrieval.top_k == 0 {
            return Err(Error::Config("retrieval.top_k must be positive".to_string()));
        }

        if self.retrieval.max_context_bytes == 0 {
            return Err(Error::Config(
                "retrieval.max_context_bytes must be positive".to_string(),
            ));
        }

        if self.generation.timeout_secs == 0 {
            return Err(Error::Config(
                "generation.timeout_secs must be positive".to_string(),
            ));
        }

        if self.source.connect_timeout_secs == 0 {
            return Err(Error::Config(
                "source.connect_timeout_secs must be positive".to_string(),
            ));
        }

        if self.source.max_connections == 0 {
            return Err(Error::Config(
                "source.max_connections must be positive".to_string(),
            ));
        }

        Ok(())
    }
}
