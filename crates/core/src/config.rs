use crate::chunking::ChunkingConfig;
use crate::embeddings::{DEFAULT_EMBEDDING_BATCH_SIZE, DEFAULT_EMBEDDING_DIMENSIONS};
use crate::error::ConfigError;
use crate::models::{DEFAULT_MIN_SIMILARITY, DEFAULT_QUERY_LIMIT};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_STORE_FILE: &str = "vectors.json";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    pub store: StoreConfig,
    pub chunking: ChunkingConfig,
    pub retrieval: RetrievalConfig,
    pub embedding: EmbeddingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StoreConfig {
    pub dir: PathBuf,
    pub file_name: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./chroma_data"),
            file_name: DEFAULT_STORE_FILE.to_string(),
        }
    }
}

impl StoreConfig {
    pub fn path(&self) -> PathBuf {
        self.dir.join(&self.file_name)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrievalConfig {
    pub limit: usize,
    pub min_similarity: f64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            limit: DEFAULT_QUERY_LIMIT,
            min_similarity: DEFAULT_MIN_SIMILARITY,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    #[serde(rename = "openai")]
    OpenAi,
    Ngram,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingProvider,
    pub base_url: String,
    pub model: String,
    pub api_key_env: String,
    pub batch_size: usize,
    pub max_retries: u32,
    pub timeout_secs: u64,
    pub dimensions: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::OpenAi,
            base_url: "https://models.inference.ai.azure.com".to_string(),
            model: "text-embedding-3-small".to_string(),
            api_key_env: "GITHUB_TOKEN".to_string(),
            batch_size: DEFAULT_EMBEDDING_BATCH_SIZE,
            max_retries: 3,
            timeout_secs: 30,
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunking.chunk_size == 0 {
            return Err(ConfigError::Invalid("chunking.chunk_size must be > 0".to_string()));
        }
        if self.chunking.overlap >= self.chunking.chunk_size {
            return Err(ConfigError::Invalid(format!(
                "chunking.overlap ({}) must be smaller than chunking.chunk_size ({})",
                self.chunking.overlap, self.chunking.chunk_size
            )));
        }
        if self.retrieval.limit == 0 {
            return Err(ConfigError::Invalid("retrieval.limit must be >= 1".to_string()));
        }
        if !(-1.0..=1.0).contains(&self.retrieval.min_similarity) {
            return Err(ConfigError::Invalid(
                "retrieval.min_similarity must be in [-1.0, 1.0]".to_string(),
            ));
        }
        if self.embedding.batch_size == 0 {
            return Err(ConfigError::Invalid("embedding.batch_size must be > 0".to_string()));
        }
        if self.embedding.model.trim().is_empty() {
            return Err(ConfigError::Invalid("embedding.model must not be empty".to_string()));
        }
        if self.embedding.provider == EmbeddingProvider::Ngram && self.embedding.dimensions == 0 {
            return Err(ConfigError::Invalid("embedding.dimensions must be > 0".to_string()));
        }
        if self.store.file_name.trim().is_empty() {
            return Err(ConfigError::Invalid("store.file_name must not be empty".to_string()));
        }
        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<EngineConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    EngineConfig::from_toml_str(&content)
}
