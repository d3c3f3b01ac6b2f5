// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the retrieval pipeline.

use thiserror::Error;

/// Errors raised by the chunking, storage, retrieval and answering layers.
#[derive(Error, Debug)]
pub enum RagError {
    /// Malformed or mismatched inputs.
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("No text chunks to process")]
    EmptyInput,

    #[error("No documents have been processed yet. Ingest a PDF first.")]
    NoDocuments,

    #[error("No relevant documents found for the question")]
    NoResults,

    #[error("No sufficiently relevant context found")]
    InsufficientContext,

    /// The embedding provider failed or returned an unusable response.
    #[error("Failed to get embeddings: {0}")]
    Embedding(String),

    /// The generation provider failed.
    #[error("Failed to generate answer: {0}")]
    Generation(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Both primary and fallback methods failed. Primary: {primary}, Fallback: {fallback}")]
    FallbackFailed { primary: String, fallback: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, RagError>;

impl RagError {
    /// Wraps a provider error, keeping its full context chain in the message.
    pub fn embedding(err: anyhow::Error) -> Self {
        Self::Embedding(format!("{:#}", err))
    }

    /// Wraps a generation provider error.
    pub fn generation(err: anyhow::Error) -> Self {
        Self::Generation(format!("{:#}", err))
    }
}
