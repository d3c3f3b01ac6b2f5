// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory vector store with pluggable persistence.
//!
//! Vectors and their source chunks are kept in two parallel arrays that share
//! an index. Similarity search is a brute-force cosine scan. Every mutation is
//! written through the configured [`IndexBackend`] while holding the write
//! lock, so concurrent writers are serialized and readers never observe a
//! half-applied write.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::cmp::Ordering;
use std::path::Path;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, warn};

use super::backend::{IndexBackend, IndexSnapshot, JsonFileBackend, MemoryBackend};
use super::sqlite::SqliteBackend;
use crate::errors::{RagError, Result};

/// Default embedding dimension for sentence-transformers/all-MiniLM-L6-v2.
pub const DEFAULT_EMBEDDING_DIM: usize = 384;

/// A search result from similarity search.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    /// Position of the entry in the store
    pub index: usize,
    /// Cosine similarity (-1.0 to 1.0)
    pub similarity: f32,
    /// The stored chunk
    pub document: String,
}

/// Read-only summary of the store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentInfo {
    pub total_vectors: usize,
    pub total_documents: usize,
    pub vector_dimension: usize,
    /// Time of the last write, `None` when the store is empty
    pub last_updated: Option<DateTime<Utc>>,
}

/// What happened when the store read its persisted index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Nothing was persisted; the store starts empty.
    Fresh,
    /// The persisted index was loaded.
    Loaded { entries: usize },
    /// The persisted index was unusable and the store started empty.
    Recovered { reason: String },
}

impl LoadOutcome {
    pub fn is_recovered(&self) -> bool {
        matches!(self, LoadOutcome::Recovered { .. })
    }
}

#[derive(Debug, Default)]
struct StoreState {
    vectors: Vec<Vec<f32>>,
    documents: Vec<String>,
    last_updated: Option<DateTime<Utc>>,
}

impl StoreState {
    fn snapshot(&self) -> IndexSnapshot {
        IndexSnapshot {
            vectors: self.vectors.clone(),
            documents: self.documents.clone(),
            timestamp: self.last_updated,
        }
    }
}

/// Vector store holding fixed-dimension embeddings and their chunks.
pub struct VectorStore {
    dimension: usize,
    backend: Box<dyn IndexBackend>,
    state: RwLock<StoreState>,
    load_outcome: LoadOutcome,
}

impl VectorStore {
    /// Opens a store over `backend`, loading whatever it has persisted.
    ///
    /// Unreadable or inconsistent data never fails the open: the store
    /// starts empty and [`VectorStore::load_outcome`] reports why.
    pub fn open(backend: Box<dyn IndexBackend>, dimension: usize) -> Self {
        let (state, load_outcome) = match backend.load() {
            Ok(None) => (StoreState::default(), LoadOutcome::Fresh),
            Ok(Some(snapshot)) => match validate_snapshot(&snapshot, dimension) {
                Ok(()) => {
                    let entries = snapshot.vectors.len();
                    let state = StoreState {
                        vectors: snapshot.vectors,
                        documents: snapshot.documents,
                        last_updated: snapshot.timestamp,
                    };
                    (state, LoadOutcome::Loaded { entries })
                }
                Err(reason) => (StoreState::default(), LoadOutcome::Recovered { reason }),
            },
            Err(err) => (
                StoreState::default(),
                LoadOutcome::Recovered {
                    reason: err.to_string(),
                },
            ),
        };

        let location = backend
            .location()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| backend.name().to_string());
        match &load_outcome {
            LoadOutcome::Fresh => debug!("No existing index found at {}. Starting fresh.", location),
            LoadOutcome::Loaded { entries } => {
                info!("Index loaded from {}. Vectors: {}", location, entries)
            }
            LoadOutcome::Recovered { reason } => warn!(
                "Ignoring unreadable index at {} and starting empty: {}",
                location, reason
            ),
        }

        Self {
            dimension,
            backend,
            state: RwLock::new(state),
            load_outcome,
        }
    }

    /// Creates a store that persists nothing.
    pub fn in_memory(dimension: usize) -> Self {
        Self::open(Box::new(MemoryBackend), dimension)
    }

    /// Opens a store backed by a whole-file JSON snapshot at `path`.
    pub fn open_json<P: AsRef<Path>>(path: P, dimension: usize) -> Result<Self> {
        Ok(Self::open(Box::new(JsonFileBackend::new(path)?), dimension))
    }

    /// Opens a store backed by an SQLite database at `path`.
    pub fn open_sqlite<P: AsRef<Path>>(path: P, dimension: usize) -> Result<Self> {
        Ok(Self::open(Box::new(SqliteBackend::open(path)?), dimension))
    }

    fn read_state(&self) -> RwLockReadGuard<'_, StoreState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, StoreState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the fixed vector dimension.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Returns how the persisted index was loaded.
    pub fn load_outcome(&self) -> &LoadOutcome {
        &self.load_outcome
    }

    /// Returns the persistence backend name.
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Returns the number of stored entries.
    pub fn len(&self) -> usize {
        self.read_state().vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Appends vectors with their documents and persists the index.
    ///
    /// If persisting fails the append is rolled back, so memory and disk
    /// never disagree about the number of entries.
    pub fn add_vectors(&self, vectors: Vec<Vec<f32>>, documents: Vec<String>) -> Result<()> {
        if vectors.len() != documents.len() {
            return Err(RagError::Validation(format!(
                "number of vectors ({}) must match number of documents ({})",
                vectors.len(),
                documents.len()
            )));
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dimension) {
            return Err(RagError::DimensionMismatch {
                expected: self.dimension,
                actual: bad.len(),
            });
        }
        if vectors.is_empty() {
            return Ok(());
        }

        let appended = vectors.len();
        debug!("Adding {} vectors to store", appended);

        let mut state = self.write_state();
        let previous_len = state.vectors.len();
        let previous_update = state.last_updated;

        state.vectors.extend(vectors);
        state.documents.extend(documents);
        state.last_updated = Some(Utc::now());

        if let Err(err) = self.backend.persist(&state.snapshot(), appended) {
            state.vectors.truncate(previous_len);
            state.documents.truncate(previous_len);
            state.last_updated = previous_update;
            return Err(err);
        }

        debug!(
            "Successfully added vectors. Total vectors: {}",
            state.vectors.len()
        );
        Ok(())
    }

    /// Returns the `top_k` entries most similar to `query`, best first.
    ///
    /// Equal similarities keep insertion order. An empty store yields no
    /// results rather than an error.
    pub fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<SearchResult>> {
        let state = self.read_state();
        if state.vectors.is_empty() {
            return Ok(Vec::new());
        }
        if query.len() != self.dimension {
            return Err(RagError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let mut results: Vec<SearchResult> = state
            .vectors
            .iter()
            .zip(&state.documents)
            .enumerate()
            .map(|(index, (vector, document))| SearchResult {
                index,
                similarity: cosine_similarity(query, vector),
                document: document.clone(),
            })
            .collect();

        rank_by_similarity(&mut results);
        results.truncate(top_k);

        debug!(
            "Search completed. Top similarity: {:?}",
            results.first().map(|r| r.similarity)
        );
        Ok(results)
    }

    /// Removes every entry and the persisted index. Clearing an empty store
    /// succeeds.
    pub fn clear_index(&self) -> Result<()> {
        let mut state = self.write_state();
        self.backend.clear()?;
        *state = StoreState::default();
        info!("Index cleared successfully");
        Ok(())
    }

    /// Returns a snapshot of the store's counters.
    pub fn document_info(&self) -> DocumentInfo {
        let state = self.read_state();
        DocumentInfo {
            total_vectors: state.vectors.len(),
            total_documents: state.documents.len(),
            vector_dimension: self.dimension,
            last_updated: if state.vectors.is_empty() {
                None
            } else {
                state.last_updated
            },
        }
    }

    /// Returns the document at `index`, if any.
    pub fn get_document(&self, index: usize) -> Option<String> {
        self.read_state().documents.get(index).cloned()
    }

    /// Returns the documents at `indices`, silently skipping invalid ones.
    pub fn get_documents(&self, indices: &[usize]) -> Vec<String> {
        let state = self.read_state();
        indices
            .iter()
            .filter_map(|&index| state.documents.get(index).cloned())
            .collect()
    }
}

fn validate_snapshot(snapshot: &IndexSnapshot, dimension: usize) -> std::result::Result<(), String> {
    if snapshot.vectors.len() != snapshot.documents.len() {
        return Err(format!(
            "index holds {} vectors but {} documents",
            snapshot.vectors.len(),
            snapshot.documents.len()
        ));
    }
    if let Some(bad) = snapshot.vectors.iter().find(|v| v.len() != dimension) {
        return Err(format!(
            "index vectors have dimension {}, expected {}",
            bad.len(),
            dimension
        ));
    }
    Ok(())
}

/// Sorts results best first. The sort is stable and treats `-0.0` and `0.0`
/// as equal, so ties keep insertion order.
pub fn rank_by_similarity(results: &mut [SearchResult]) {
    results.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(Ordering::Equal)
    });
}

/// Computes cosine similarity between two vectors.
///
/// Returns 0.0 when either vector has zero magnitude or the lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let magnitude_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let magnitude_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if magnitude_a == 0.0 || magnitude_b == 0.0 {
        return 0.0;
    }

    dot_product / (magnitude_a * magnitude_b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use tempfile::tempdir;

    fn docs(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_cosine_similarity() {
        let a = vec![0.3, -1.2, 4.0];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_zero_vector() {
        let zero = vec![0.0, 0.0, 0.0];
        let a = vec![1.0, 2.0, 3.0];
        assert_eq!(cosine_similarity(&zero, &a), 0.0);
        assert_eq!(cosine_similarity(&a, &zero), 0.0);
        assert_eq!(cosine_similarity(&zero, &zero), 0.0);
    }

    #[test]
    fn test_search_empty_store() {
        let store = VectorStore::in_memory(3);
        assert!(store.search(&[1.0, 0.0, 0.0], 5).unwrap().is_empty());
        // Even a wrongly sized query is fine on an empty store.
        assert!(store.search(&[1.0], 5).unwrap().is_empty());
    }

    #[test]
    fn test_sky_and_grass() {
        let store = VectorStore::in_memory(2);
        store
            .add_vectors(
                vec![vec![1.0, 0.0], vec![0.0, 1.0]],
                docs(&["The sky is blue.", "Grass is green."]),
            )
            .unwrap();

        let results = store.search(&[1.0, 0.0], 2).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].document, "The sky is blue.");
        assert_eq!(results[0].index, 0);
        assert!((results[0].similarity - 1.0).abs() < 1e-6);
        assert_eq!(results[1].document, "Grass is green.");
        assert_eq!(results[1].similarity, 0.0);
    }

    #[test]
    fn test_self_similarity_ranks_first() {
        let store = VectorStore::in_memory(3);
        store
            .add_vectors(
                vec![vec![0.9, 0.1, 0.0], vec![0.2, 0.7, 0.4], vec![0.0, 0.0, 1.0]],
                docs(&["a", "b", "c"]),
            )
            .unwrap();

        let results = store.search(&[0.2, 0.7, 0.4], 3).unwrap();
        assert_eq!(results[0].document, "b");
        assert!((results[0].similarity - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_search_top_k_and_ties() {
        let store = VectorStore::in_memory(2);
        store
            .add_vectors(
                vec![vec![0.0, 1.0], vec![1.0, 0.0], vec![2.0, 0.0], vec![0.0, 3.0]],
                docs(&["up", "right", "far right", "far up"]),
            )
            .unwrap();

        let results = store.search(&[1.0, 0.0], 3).unwrap();
        assert_eq!(results.len(), 3);
        // "right" and "far right" tie at 1.0 and keep insertion order.
        assert_eq!(results[0].document, "right");
        assert_eq!(results[1].document, "far right");
        assert_eq!(results[2].document, "up");

        assert!(store.search(&[1.0, 0.0], 0).unwrap().is_empty());
    }

    #[test]
    fn test_signed_zero_ties_keep_insertion_order() {
        let mut results = vec![
            SearchResult {
                index: 0,
                similarity: -0.0,
                document: "first".to_string(),
            },
            SearchResult {
                index: 1,
                similarity: 0.0,
                document: "second".to_string(),
            },
            SearchResult {
                index: 2,
                similarity: 0.5,
                document: "best".to_string(),
            },
        ];
        rank_by_similarity(&mut results);
        let order: Vec<usize> = results.iter().map(|r| r.index).collect();
        assert_eq!(order, vec![2, 0, 1]);
    }

    #[test]
    fn test_search_dimension_mismatch() {
        let store = VectorStore::in_memory(2);
        store
            .add_vectors(vec![vec![1.0, 0.0]], docs(&["a"]))
            .unwrap();
        let err = store.search(&[1.0, 0.0, 0.0], 1).unwrap_err();
        assert!(matches!(
            err,
            RagError::DimensionMismatch {
                expected: 2,
                actual: 3
            }
        ));
    }

    #[test]
    fn test_add_vectors_validation() {
        let store = VectorStore::in_memory(2);
        let err = store
            .add_vectors(vec![vec![1.0, 0.0]], docs(&["a", "b"]))
            .unwrap_err();
        assert!(matches!(err, RagError::Validation(_)));

        let err = store
            .add_vectors(vec![vec![1.0, 0.0, 0.0]], docs(&["a"]))
            .unwrap_err();
        assert!(matches!(err, RagError::DimensionMismatch { .. }));

        assert!(store.is_empty());
        store.add_vectors(Vec::new(), Vec::new()).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_document_info() {
        let store = VectorStore::in_memory(2);
        let info = store.document_info();
        assert_eq!(info.total_vectors, 0);
        assert_eq!(info.vector_dimension, 2);
        assert!(info.last_updated.is_none());

        let before = Utc::now();
        store
            .add_vectors(vec![vec![1.0, 0.0]], docs(&["a"]))
            .unwrap();
        let info = store.document_info();
        assert_eq!(info.total_vectors, 1);
        assert_eq!(info.total_documents, 1);
        let updated = info.last_updated.unwrap();
        assert!(updated >= before);

        // Reading again reports the write time, not the read time.
        assert_eq!(store.document_info().last_updated, Some(updated));
    }

    #[test]
    fn test_get_documents() {
        let store = VectorStore::in_memory(2);
        store
            .add_vectors(vec![vec![1.0, 0.0], vec![0.0, 1.0]], docs(&["a", "b"]))
            .unwrap();

        assert_eq!(store.get_document(1).as_deref(), Some("b"));
        assert_eq!(store.get_document(2), None);
        assert_eq!(store.get_documents(&[1, 7, 0]), docs(&["b", "a"]));
    }

    #[test]
    fn test_json_persist_and_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data").join("index.json");

        let written_at = {
            let store = VectorStore::open_json(&path, 2).unwrap();
            assert_eq!(store.load_outcome(), &LoadOutcome::Fresh);
            store
                .add_vectors(vec![vec![1.0, 0.0], vec![0.0, 1.0]], docs(&["a", "b"]))
                .unwrap();
            store.document_info().last_updated
        };

        let store = VectorStore::open_json(&path, 2).unwrap();
        assert_eq!(store.load_outcome(), &LoadOutcome::Loaded { entries: 2 });
        let info = store.document_info();
        assert_eq!(info.total_vectors, 2);
        assert_eq!(info.last_updated, written_at);
        assert_eq!(store.search(&[0.0, 1.0], 1).unwrap()[0].document, "b");
    }

    #[test]
    fn test_sqlite_persist_and_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("index.sqlite");
        {
            let store = VectorStore::open_sqlite(&path, 2).unwrap();
            store
                .add_vectors(vec![vec![1.0, 0.0]], docs(&["a"]))
                .unwrap();
            store
                .add_vectors(vec![vec![0.0, 1.0]], docs(&["b"]))
                .unwrap();
        }

        let store = VectorStore::open_sqlite(&path, 2).unwrap();
        assert_eq!(store.document_info().total_vectors, 2);
        assert_eq!(store.get_documents(&[0, 1]), docs(&["a", "b"]));
    }

    #[test]
    fn test_sqlite_write_after_recovery_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("index.sqlite");
        {
            let store = VectorStore::open_sqlite(&path, 3).unwrap();
            store
                .add_vectors(
                    vec![vec![1.0, 0.0, 0.0]; 4],
                    docs(&["old 0", "old 1", "old 2", "old 3"]),
                )
                .unwrap();
        }
        {
            let store = VectorStore::open_sqlite(&path, 2).unwrap();
            assert!(store.load_outcome().is_recovered());
            store
                .add_vectors(vec![vec![0.0, 1.0]], docs(&["new"]))
                .unwrap();
        }

        let store = VectorStore::open_sqlite(&path, 2).unwrap();
        assert_eq!(store.load_outcome(), &LoadOutcome::Loaded { entries: 1 });
        assert_eq!(store.get_documents(&[0]), docs(&["new"]));
    }

    #[test]
    fn test_clear_index() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("index.json");
        let store = VectorStore::open_json(&path, 2).unwrap();
        store
            .add_vectors(vec![vec![1.0, 0.0]], docs(&["a"]))
            .unwrap();
        assert!(path.exists());

        store.clear_index().unwrap();
        assert_eq!(store.document_info().total_vectors, 0);
        assert!(store.document_info().last_updated.is_none());
        assert!(!path.exists());

        store.clear_index().unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_malformed_index_recovers_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("index.json");
        std::fs::write(&path, "{\"vectors\": [[1.0, 0.0]], \"documents\": ").unwrap();

        let store = VectorStore::open_json(&path, 2).unwrap();
        assert!(store.load_outcome().is_recovered());
        assert!(store.is_empty());
    }

    #[test]
    fn test_inconsistent_index_recovers_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("index.json");
        std::fs::write(
            &path,
            r#"{"vectors": [[1.0, 0.0]], "documents": ["a", "b"]}"#,
        )
        .unwrap();
        let store = VectorStore::open_json(&path, 2).unwrap();
        assert!(store.load_outcome().is_recovered());

        std::fs::write(&path, r#"{"vectors": [[1.0, 0.0, 0.0]], "documents": ["a"]}"#).unwrap();
        let store = VectorStore::open_json(&path, 2).unwrap();
        match store.load_outcome() {
            LoadOutcome::Recovered { reason } => assert!(reason.contains("dimension")),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    struct FailingBackend;

    impl IndexBackend for FailingBackend {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn location(&self) -> Option<&Path> {
            None
        }

        fn load(&self) -> Result<Option<IndexSnapshot>> {
            Ok(None)
        }

        fn persist(&self, _snapshot: &IndexSnapshot, _appended: usize) -> Result<()> {
            Err(std::io::Error::new(std::io::ErrorKind::Other, "disk full").into())
        }

        fn clear(&self) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_failed_persist_rolls_back() {
        let store = VectorStore::open(Box::new(FailingBackend), 2);
        let err = store
            .add_vectors(vec![vec![1.0, 0.0]], docs(&["a"]))
            .unwrap_err();
        assert!(matches!(err, RagError::Io(_)));
        assert!(store.is_empty());
        assert!(store.document_info().last_updated.is_none());
    }

    #[test]
    fn test_concurrent_writers_are_serialized() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("index.json");
        let store = Arc::new(VectorStore::open_json(&path, 2).unwrap());

        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for i in 0..5 {
                        store
                            .add_vectors(
                                vec![vec![worker as f32, i as f32]],
                                vec![format!("worker {} item {}", worker, i)],
                            )
                            .unwrap();
                        store.search(&[1.0, 1.0], 3).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.len(), 40);
        let reloaded = VectorStore::open_json(&path, 2).unwrap();
        let info = reloaded.document_info();
        assert_eq!(info.total_vectors, 40);
        assert_eq!(info.total_documents, 40);
    }
}
