use crate::chunking::ChunkingConfig;
use crate::composer::{ComposerConfig, FallbackStyle};
use crate::error::ConfigError;
use crate::llm::ModelConfig;
use crate::retriever::DEFAULT_TOP_K;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

pub const DEFAULT_ENDPOINT: &str = "http://localhost:11434";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub store: StoreSettings,
    pub chunking: ChunkingSettings,
    pub embedding: EmbeddingSettings,
    pub model: ModelSettings,
    pub retrieval: RetrievalSettings,
    pub composer: ComposerSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StoreSettings {
    pub persist_dir: PathBuf,
    pub collection: String,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            persist_dir: PathBuf::from("./chroma_langchain_db"),
            collection: "hr_brochures".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChunkingSettings {
    pub max_chars: usize,
    pub overlap_chars: usize,
}

impl Default for ChunkingSettings {
    fn default() -> Self {
        let defaults = ChunkingConfig::default();
        Self {
            max_chars: defaults.max_chars,
            overlap_chars: defaults.overlap_chars,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingBackend {
    #[default]
    Ollama,
    /// Offline character-trigram vectors.
    Hashed,
}

impl std::str::FromStr for EmbeddingBackend {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "hashed" => Ok(Self::Hashed),
            other => Err(format!("unknown embedding backend `{other}` (expected ollama or hashed)")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub backend: EmbeddingBackend,
    pub endpoint: String,
    pub model: String,
    /// Only used by the hashed backend.
    pub dimensions: usize,
    pub timeout_secs: u64,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackend::Ollama,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: "mxbai-embed-large".to_string(),
            dimensions: crate::embeddings::DEFAULT_EMBEDDING_DIMENSIONS,
            timeout_secs: 30,
        }
    }
}

impl EmbeddingSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelSettings {
    pub endpoint: String,
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub timeout_secs: u64,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: "llama3.2".to_string(),
            temperature: None,
            max_tokens: None,
            timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetrievalSettings {
    pub top_k: usize,
    pub max_context_chunks: usize,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            max_context_chunks: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ComposerSettings {
    pub include_reasoning: bool,
    pub include_conclusion: bool,
    pub fallback_style: FallbackStyle,
    pub use_conversation_memory: bool,
}

impl Default for ComposerSettings {
    fn default() -> Self {
        let defaults = ComposerConfig::default();
        Self {
            include_reasoning: defaults.include_reasoning,
            include_conclusion: defaults.include_conclusion,
            fallback_style: defaults.fallback_style,
            use_conversation_memory: defaults.use_conversation_memory,
        }
    }
}

impl Settings {
    /// Reads a TOML file. Missing sections and keys take their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let settings: Settings = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunking.max_chars == 0 {
            return Err(ConfigError::Invalid {
                field: "chunking.max_chars",
                details: "must be greater than zero".to_string(),
            });
        }
        if self.chunking.overlap_chars >= self.chunking.max_chars {
            return Err(ConfigError::Invalid {
                field: "chunking.overlap_chars",
                details: format!(
                    "{} must be smaller than max_chars {}",
                    self.chunking.overlap_chars, self.chunking.max_chars
                ),
            });
        }
        if self.retrieval.top_k == 0 {
            return Err(ConfigError::Invalid {
                field: "retrieval.top_k",
                details: "must be at least 1".to_string(),
            });
        }
        if self.retrieval.max_context_chunks == 0 {
            return Err(ConfigError::Invalid {
                field: "retrieval.max_context_chunks",
                details: "must be at least 1".to_string(),
            });
        }
        if self.embedding.timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "embedding.timeout_secs",
                details: "must be at least 1".to_string(),
            });
        }
        if self.model.timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "model.timeout_secs",
                details: "must be at least 1".to_string(),
            });
        }
        if self.embedding.backend == EmbeddingBackend::Hashed && self.embedding.dimensions == 0 {
            return Err(ConfigError::Invalid {
                field: "embedding.dimensions",
                details: "must be greater than zero".to_string(),
            });
        }
        if self.store.collection.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "store.collection",
                details: "must not be empty".to_string(),
            });
        }
        if self.embedding.backend == EmbeddingBackend::Ollama {
            check_endpoint("embedding.endpoint", &self.embedding.endpoint)?;
        }
        check_endpoint("model.endpoint", &self.model.endpoint)?;
        Ok(())
    }

    pub fn chunking_config(&self) -> ChunkingConfig {
        ChunkingConfig {
            max_chars: self.chunking.max_chars,
            overlap_chars: self.chunking.overlap_chars,
        }
    }

    pub fn model_config(&self) -> ModelConfig {
        ModelConfig {
            endpoint: self.model.endpoint.clone(),
            model: self.model.model.clone(),
            temperature: self.model.temperature,
            max_tokens: self.model.max_tokens,
            timeout: Duration::from_secs(self.model.timeout_secs),
        }
    }

    pub fn composer_config(&self) -> ComposerConfig {
        ComposerConfig {
            include_reasoning: self.composer.include_reasoning,
            include_conclusion: self.composer.include_conclusion,
            fallback_style: self.composer.fallback_style,
            use_conversation_memory: self.composer.use_conversation_memory,
            max_context_chunks: self.retrieval.max_context_chunks,
            ..ComposerConfig::default()
        }
    }
}

fn check_endpoint(field: &'static str, endpoint: &str) -> Result<(), ConfigError> {
    let parsed = Url::parse(endpoint).map_err(|error| ConfigError::Invalid {
        field,
        details: format!("{endpoint}: {error}"),
    })?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(ConfigError::Invalid {
            field,
            details: format!("unsupported scheme `{scheme}`"),
        }),
    }
}
