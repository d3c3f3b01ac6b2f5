// SPDX-License-Identifier: MIT OR Apache-2.0

//! Vector store and its persistence backends.

pub mod backend;
pub mod sqlite;
pub mod vector_store;

pub use backend::{IndexBackend, IndexSnapshot, JsonFileBackend, MemoryBackend};
pub use sqlite::SqliteBackend;
pub use vector_store::{
    cosine_similarity, rank_by_similarity, DocumentInfo, LoadOutcome, SearchResult,
    VectorStore, DEFAULT_EMBEDDING_DIM,
};
