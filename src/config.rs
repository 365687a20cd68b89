//! Engine configuration, grounded on the teacher's `RAGConfig` shape:
//! nested per-concern structs, a `Default` impl matching the spec's fixed
//! defaults, and a `validate()` method.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Retry policy for chat/embedding calls (spec §4.8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub backoff_multiplier_secs: f64,
    pub backoff_min_secs: f64,
    pub backoff_max_secs: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff_multiplier_secs: 1.0,
            backoff_min_secs: 4.0,
            backoff_max_secs: 10.0,
        }
    }
}

/// Bounded fan-out caps (spec §5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConcurrencyConfig {
    pub chunk_upsert_concurrency: usize,
    pub entity_upsert_concurrency: usize,
    pub relation_upsert_concurrency: usize,
    pub entity_extract_concurrency: usize,
    pub entity_merge_concurrency: usize,
    pub relation_extract_concurrency: usize,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            chunk_upsert_concurrency: 4,
            entity_upsert_concurrency: 4,
            relation_upsert_concurrency: 2,
            entity_extract_concurrency: 4,
            entity_merge_concurrency: 2,
            relation_extract_concurrency: 5,
        }
    }
}

/// Fixed-token-window chunking parameters (spec §4.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1200,
            chunk_overlap: 200,
        }
    }
}

/// Persisted-path and embedding-dimension configuration (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub vector_db_path: PathBuf,
    pub graph_blob_path: PathBuf,
    pub embedding_dimension: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            vector_db_path: PathBuf::from("kb/hirag.db"),
            graph_blob_path: PathBuf::from("kb/hirag.gpickle"),
            embedding_dimension: 1536,
        }
    }
}

/// Chat/embedding provider credentials (spec §6's required environment).
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub api_key: String,
    pub base_url: String,
    pub chat_model: String,
    pub embedding_model: String,
}

impl ProviderConfig {
    /// Reads `OPENAI_API_KEY`/`OPENAI_BASE_URL` and optional model overrides.
    /// Missing credentials are a fatal misconfiguration (spec §7).
    pub fn from_env() -> Result<Self, String> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| "OPENAI_API_KEY environment variable is not set".to_string())?;
        let base_url = std::env::var("OPENAI_BASE_URL")
            .map_err(|_| "OPENAI_BASE_URL environment variable is not set".to_string())?;
        let chat_model =
            std::env::var("HIRAG_CHAT_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());
        let embedding_model = std::env::var("HIRAG_EMBEDDING_MODEL")
            .unwrap_or_else(|_| "text-embedding-3-small".to_string());
        Ok(Self {
            api_key,
            base_url,
            chat_model,
            embedding_model,
        })
    }
}

/// Root engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub retry: RetryConfig,
    pub concurrency: ConcurrencyConfig,
    pub chunking: ChunkingConfig,
    pub storage: StorageConfig,
    /// Default timeout for `query_all` (spec §5), in seconds.
    pub query_timeout_secs: u64,
    pub max_gleaning: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            concurrency: ConcurrencyConfig::default(),
            chunking: ChunkingConfig::default(),
            storage: StorageConfig::default(),
            query_timeout_secs: 100,
            max_gleaning: 1,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), String> {
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            return Err("chunking.chunk_overlap must be < chunk_size".into());
        }
        if self.storage.embedding_dimension == 0 {
            return Err("storage.embedding_dimension must be > 0".into());
        }
        if self.retry.max_attempts == 0 {
            return Err("retry.max_attempts must be > 0".into());
        }
        if self.query_timeout_secs == 0 {
            return Err("query_timeout_secs must be > 0".into());
        }
        Ok(())
    }

    pub fn from_file(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file: {e}"))?;
        let config: Self =
            serde_json::from_str(&content).map_err(|e| format!("Failed to parse config: {e}"))?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn overlap_must_be_smaller_than_chunk_size() {
        let mut cfg = Config::default();
        cfg.chunking.chunk_overlap = cfg.chunking.chunk_size;
        assert!(cfg.validate().is_err());
    }
}
