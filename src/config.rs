// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration file support for docrag
//!
//! Loads configuration from .docragrc.toml in current directory or ~/.config/docrag/config.toml

use anyhow::Context;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::embedding::{
    ChunkConfig, ChunkStrategy, CommandProvider, EmbeddingGateway, EmbeddingProvider,
    HashProvider, TextChunker, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE,
};
use crate::errors::Result;
use crate::gemini::{self, GeminiClient};
use crate::generation::{CommandGenerator, ExtractiveGenerator, GenerationProvider};
use crate::rag::{RagService, DEFAULT_TOP_K};
use crate::store::{VectorStore, DEFAULT_EMBEDDING_DIM};

pub const CONFIG_FILE_NAME: &str = ".docragrc.toml";
pub const INDEX_PATH_ENV: &str = "DOCRAG_INDEX_PATH";
pub const VECTOR_DIMENSION_ENV: &str = "DOCRAG_VECTOR_DIMENSION";

/// Output format for results (mirrored from cli for library use)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigOutputFormat {
    #[default]
    Text,
    Json,
}

/// Where the index is persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackendKind {
    #[default]
    Json,
    Sqlite,
    Memory,
}

/// Embedding provider type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderKind {
    #[default]
    Builtin,
    Command,
    Gemini,
    Hash,
}

/// Generation provider type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationProviderKind {
    #[default]
    Extractive,
    Command,
    Gemini,
}

/// Store configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Persistence backend (json, sqlite, memory)
    pub backend: Option<StoreBackendKind>,
    /// Index file location
    pub index_path: Option<PathBuf>,
    /// Dimension of every stored vector
    pub vector_dimension: Option<usize>,
}

impl StoreConfig {
    /// Get backend (defaults to Json)
    pub fn backend(&self) -> StoreBackendKind {
        self.backend.unwrap_or_default()
    }

    /// Get index path (defaults to .docrag/index.json, or index.sqlite for sqlite)
    pub fn index_path(&self) -> PathBuf {
        if let Some(path) = &self.index_path {
            return path.clone();
        }
        match self.backend() {
            StoreBackendKind::Sqlite => PathBuf::from(".docrag").join("index.sqlite"),
            _ => PathBuf::from(".docrag").join("index.json"),
        }
    }

    /// Get vector dimension (defaults to 384)
    pub fn vector_dimension(&self) -> usize {
        self.vector_dimension.unwrap_or(DEFAULT_EMBEDDING_DIM)
    }
}

/// Chunking configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Chunking strategy (sentence, paragraph)
    pub strategy: Option<ChunkStrategy>,
    /// Number of characters per chunk
    pub chunk_size: Option<usize>,
    /// Number of overlap characters between chunks
    pub chunk_overlap: Option<usize>,
}

impl ChunkingConfig {
    pub fn strategy(&self) -> ChunkStrategy {
        self.strategy.unwrap_or_default()
    }

    /// Get chunk size (defaults to 1000)
    pub fn chunk_size(&self) -> usize {
        self.chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE)
    }

    /// Get chunk overlap (defaults to 200)
    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap.unwrap_or(DEFAULT_CHUNK_OVERLAP)
    }

    /// Builds a validated chunk configuration.
    pub fn chunk_config(&self) -> Result<ChunkConfig> {
        Ok(ChunkConfig::new(self.chunk_size(), self.chunk_overlap())?.with_strategy(self.strategy()))
    }
}

/// Retrieval configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Number of chunks retrieved per question (1-10)
    pub top_k: Option<usize>,
}

impl RetrievalConfig {
    /// Get top k (defaults to 3)
    pub fn top_k(&self) -> usize {
        self.top_k.unwrap_or(DEFAULT_TOP_K)
    }
}

/// Embedding configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Provider type (builtin, command, gemini, hash)
    pub provider: Option<EmbeddingProviderKind>,
    /// Model identifier for the embedding provider
    pub model: Option<String>,
    /// Command to execute for command provider
    pub command: Option<String>,
    /// Texts per provider call
    pub batch_size: Option<usize>,
}

impl EmbeddingConfig {
    /// Get provider type (defaults to Builtin)
    pub fn provider(&self) -> EmbeddingProviderKind {
        self.provider.unwrap_or_default()
    }

    /// Get model identifier, if configured
    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    /// Get command (defaults to "embedder")
    pub fn command(&self) -> &str {
        self.command.as_deref().unwrap_or("embedder")
    }

    pub fn batch_size(&self) -> Option<usize> {
        self.batch_size
    }
}

/// Generation configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Provider type (extractive, command, gemini)
    pub provider: Option<GenerationProviderKind>,
    /// Model identifier for the generation provider
    pub model: Option<String>,
    /// Command to execute for command provider
    pub command: Option<String>,
    /// Maximum answer length in characters
    pub max_length: Option<usize>,
    /// HTTP request timeout
    pub timeout_secs: Option<u64>,
}

impl GenerationConfig {
    /// Get provider type (defaults to Extractive)
    pub fn provider(&self) -> GenerationProviderKind {
        self.provider.unwrap_or_default()
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    /// Get command (defaults to "generator")
    pub fn command(&self) -> &str {
        self.command.as_deref().unwrap_or("generator")
    }

    /// Get max length (defaults to 1000)
    pub fn max_length(&self) -> usize {
        self.max_length.unwrap_or(crate::rag::service::DEFAULT_MAX_LENGTH)
    }

    /// Get timeout (defaults to 60 seconds)
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.unwrap_or(gemini::DEFAULT_TIMEOUT_SECS))
    }
}

/// Configuration loaded from .docragrc.toml or ~/.config/docrag/config.toml
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Default output format (text or json)
    pub default_format: Option<ConfigOutputFormat>,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub chunking: ChunkingConfig,

    #[serde(default)]
    pub retrieval: RetrievalConfig,

    #[serde(default)]
    pub embeddings: EmbeddingConfig,

    #[serde(default)]
    pub generation: GenerationConfig,
}

impl Config {
    /// Load configuration from files, then apply environment overrides
    ///
    /// Precedence (highest to lowest):
    /// 1. .docragrc.toml in current directory
    /// 2. ~/.config/docrag/config.toml
    pub fn load() -> Self {
        let mut config = Self::load_files();
        config.apply_env(|name| std::env::var(name).ok());
        config
    }

    fn load_files() -> Self {
        if let Some(config) = Self::load_from_path(&PathBuf::from(CONFIG_FILE_NAME)) {
            return config;
        }

        if let Some(home) = dirs::home_dir() {
            let config_path = home.join(".config").join("docrag").join("config.toml");
            if let Some(config) = Self::load_from_path(&config_path) {
                return config;
            }
        }

        Self::default()
    }

    fn load_from_path(path: &PathBuf) -> Option<Self> {
        let content = std::fs::read_to_string(path).ok()?;
        match Self::from_toml_str(&content) {
            Ok(config) => Some(config),
            Err(e) => {
                warn!("Failed to parse {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Parses a configuration document.
    pub fn from_toml_str(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Applies `DOCRAG_INDEX_PATH` and `DOCRAG_VECTOR_DIMENSION` overrides.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup(INDEX_PATH_ENV).filter(|v| !v.trim().is_empty()) {
            self.store.index_path = Some(PathBuf::from(path.trim()));
        }
        if let Some(raw) = lookup(VECTOR_DIMENSION_ENV) {
            match raw.trim().parse::<usize>() {
                Ok(dim) if dim > 0 => self.store.vector_dimension = Some(dim),
                _ => warn!("Ignoring invalid {}={}", VECTOR_DIMENSION_ENV, raw),
            }
        }
    }

    /// Vector dimension for the store and gateway. An explicit
    /// `store.vector_dimension` wins; otherwise it follows the embedding
    /// provider (768 for gemini, 384 for the rest).
    pub fn vector_dimension(&self) -> usize {
        match (self.store.vector_dimension, self.embeddings.provider()) {
            (Some(dimension), _) => dimension,
            (None, EmbeddingProviderKind::Gemini) => gemini::EMBEDDING_DIM,
            (None, _) => self.store.vector_dimension(),
        }
    }

    /// Opens the configured vector store.
    pub fn open_store(&self) -> Result<VectorStore> {
        let dimension = self.vector_dimension();
        match self.store.backend() {
            StoreBackendKind::Json => VectorStore::open_json(self.store.index_path(), dimension),
            StoreBackendKind::Sqlite => VectorStore::open_sqlite(self.store.index_path(), dimension),
            StoreBackendKind::Memory => Ok(VectorStore::in_memory(dimension)),
        }
    }

    /// Builds the chunker, optionally overriding individual settings.
    pub fn chunker(
        &self,
        strategy: Option<ChunkStrategy>,
        chunk_size: Option<usize>,
        chunk_overlap: Option<usize>,
    ) -> Result<TextChunker> {
        let chunking = ChunkingConfig {
            strategy: strategy.or(self.chunking.strategy),
            chunk_size: chunk_size.or(self.chunking.chunk_size),
            chunk_overlap: chunk_overlap.or(self.chunking.chunk_overlap),
        };
        Ok(TextChunker::new(chunking.chunk_config()?))
    }

    /// Creates the configured embedding provider.
    pub fn embedding_provider(&self) -> anyhow::Result<Box<dyn EmbeddingProvider>> {
        let embeddings = &self.embeddings;
        let provider: Box<dyn EmbeddingProvider> = match embeddings.provider() {
            EmbeddingProviderKind::Builtin => builtin_embedder()?,
            EmbeddingProviderKind::Command => {
                let mut provider = CommandProvider::new(
                    embeddings.command().to_string(),
                    embeddings.model().unwrap_or("local-model-id").to_string(),
                );
                if let Some(batch_size) = embeddings.batch_size() {
                    provider = provider.with_batch_size(batch_size);
                }
                Box::new(provider)
            }
            EmbeddingProviderKind::Gemini => Box::new(GeminiClient::from_env(
                embeddings
                    .model()
                    .unwrap_or(gemini::DEFAULT_EMBEDDING_MODEL)
                    .to_string(),
                self.generation.timeout(),
            )?),
            EmbeddingProviderKind::Hash => Box::new(HashProvider::new(self.vector_dimension())),
        };
        Ok(provider)
    }

    /// Creates the configured generation provider.
    pub fn generation_provider(&self) -> anyhow::Result<Box<dyn GenerationProvider>> {
        let generation = &self.generation;
        let provider: Box<dyn GenerationProvider> = match generation.provider() {
            GenerationProviderKind::Extractive => Box::new(ExtractiveGenerator::new()),
            GenerationProviderKind::Command => Box::new(CommandGenerator::new(
                generation.command().to_string(),
                generation.model().unwrap_or("local-model-id").to_string(),
            )),
            GenerationProviderKind::Gemini => Box::new(GeminiClient::from_env(
                generation
                    .model()
                    .unwrap_or(gemini::DEFAULT_GENERATION_MODEL)
                    .to_string(),
                generation.timeout(),
            )?),
        };
        Ok(provider)
    }

    /// Wires providers, store and chunker into a service.
    pub fn build_service(&self, store: Arc<VectorStore>, chunker: TextChunker) -> anyhow::Result<RagService> {
        let gateway = EmbeddingGateway::new(
            self.embedding_provider()
                .context("Failed to create embedding provider")?,
            self.vector_dimension(),
        );
        let generator = self
            .generation_provider()
            .context("Failed to create generation provider")?;

        let mut service = RagService::new(gateway, generator, store, chunker)?
            .with_max_length(self.generation.max_length());
        service.set_top_k(self.retrieval.top_k())?;
        Ok(service)
    }
}

#[cfg(not(all(target_os = "macos", target_arch = "x86_64")))]
fn builtin_embedder() -> anyhow::Result<Box<dyn EmbeddingProvider>> {
    Ok(Box::new(crate::embedding::FastEmbedder::from_env()?))
}

#[cfg(all(target_os = "macos", target_arch = "x86_64"))]
fn builtin_embedder() -> anyhow::Result<Box<dyn EmbeddingProvider>> {
    anyhow::bail!("the builtin embedder is not available on this platform; use provider = \"command\", \"gemini\" or \"hash\"")
}
