// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedding module - turns document text into fixed-size vectors
//!
//! This module splits extracted text into chunks and embeds them through a
//! pluggable provider, checked by the [`EmbeddingGateway`].

pub mod chunker;
pub mod gateway;
pub mod provider;

pub use chunker::{
    normalize_whitespace, ChunkConfig, ChunkStrategy, TextChunker, DEFAULT_CHUNK_OVERLAP,
    DEFAULT_CHUNK_SIZE, MIN_CHUNK_CHARS,
};
pub use gateway::EmbeddingGateway;
pub use provider::{CommandProvider, EmbeddingProvider, HashProvider};
#[cfg(not(all(target_os = "macos", target_arch = "x86_64")))]
pub use provider::{EmbeddingProviderConfig, FastEmbedder};
