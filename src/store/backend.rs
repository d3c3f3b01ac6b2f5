// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persistence backends for the vector store.
//!
//! A backend only moves snapshots between memory and durable storage; the
//! store itself owns validation, locking and search.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::errors::Result;

/// Full contents of the index as written to disk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexSnapshot {
    #[serde(default)]
    pub vectors: Vec<Vec<f32>>,
    #[serde(default)]
    pub documents: Vec<String>,
    /// Time of the last write
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Storage for index snapshots.
///
/// Calls are serialized by the owning store, so implementations never see
/// two writes at once.
pub trait IndexBackend: Send + Sync {
    /// Short backend name for logs and stats.
    fn name(&self) -> &'static str;

    /// Location of the persisted data, if any.
    fn location(&self) -> Option<&Path>;

    /// Reads the persisted snapshot, or `None` when nothing was persisted yet.
    fn load(&self) -> Result<Option<IndexSnapshot>>;

    /// Persists `snapshot`, whose last `appended` entries are new.
    fn persist(&self, snapshot: &IndexSnapshot, appended: usize) -> Result<()>;

    /// Removes all persisted data. Must succeed when nothing is persisted.
    fn clear(&self) -> Result<()>;
}

/// Backend that keeps nothing outside the process.
#[derive(Debug, Default)]
pub struct MemoryBackend;

impl IndexBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn location(&self) -> Option<&Path> {
        None
    }

    fn load(&self) -> Result<Option<IndexSnapshot>> {
        Ok(None)
    }

    fn persist(&self, _snapshot: &IndexSnapshot, _appended: usize) -> Result<()> {
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        Ok(())
    }
}

/// Whole-file JSON snapshot.
///
/// Every write serializes the full index to a sibling temp file and renames
/// it over the target, so a crash mid-write leaves the previous index intact.
#[derive(Debug)]
pub struct JsonFileBackend {
    path: PathBuf,
}

impl JsonFileBackend {
    /// Creates a backend writing to `path`, creating its parent directory.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        Ok(Self { path })
    }

    /// Returns the index file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl IndexBackend for JsonFileBackend {
    fn name(&self) -> &'static str {
        "json"
    }

    fn location(&self) -> Option<&Path> {
        Some(&self.path)
    }

    fn load(&self) -> Result<Option<IndexSnapshot>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&self.path)?;
        let snapshot: IndexSnapshot = serde_json::from_str(&content)?;
        Ok(Some(snapshot))
    }

    fn persist(&self, snapshot: &IndexSnapshot, _appended: usize) -> Result<()> {
        let temp = self.temp_path();
        let data = serde_json::to_vec_pretty(snapshot)?;
        fs::write(&temp, data)?;
        fs::rename(&temp, &self.path)?;
        debug!("Index saved to: {}", self.path.display());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        for path in [self.path.clone(), self.temp_path()] {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn snapshot() -> IndexSnapshot {
        IndexSnapshot {
            vectors: vec![vec![1.0, 0.0], vec![0.0, 1.0]],
            documents: vec!["first".to_string(), "second".to_string()],
            timestamp: Some(Utc::now()),
        }
    }

    #[test]
    fn test_json_missing_file_loads_none() {
        let dir = tempdir().unwrap();
        let backend = JsonFileBackend::new(dir.path().join("index.json")).unwrap();
        assert!(backend.load().unwrap().is_none());
    }

    #[test]
    fn test_json_creates_parent_directory() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data").join("nested").join("index.json");
        let backend = JsonFileBackend::new(&path).unwrap();
        backend.persist(&snapshot(), 2).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_json_persist_leaves_no_temp_file() {
        let dir = tempdir().unwrap();
        let backend = JsonFileBackend::new(dir.path().join("index.json")).unwrap();
        backend.persist(&snapshot(), 2).unwrap();

        assert!(!backend.temp_path().exists());
        let loaded = backend.load().unwrap().unwrap();
        let expected = snapshot();
        assert_eq!(loaded.vectors, expected.vectors);
        assert_eq!(loaded.documents, expected.documents);
        assert!(loaded.timestamp.is_some());
    }

    #[test]
    fn test_json_file_format() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("index.json");
        let backend = JsonFileBackend::new(&path).unwrap();
        backend.persist(&snapshot(), 2).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["documents"][1], "second");
        assert_eq!(raw["vectors"][0][0], 1.0);
        assert!(raw["timestamp"].as_str().unwrap().contains('T'));
    }

    #[test]
    fn test_json_missing_keys_default_to_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("index.json");
        fs::write(&path, "{}").unwrap();
        let backend = JsonFileBackend::new(&path).unwrap();
        let loaded = backend.load().unwrap().unwrap();
        assert!(loaded.vectors.is_empty());
        assert!(loaded.documents.is_empty());
        assert!(loaded.timestamp.is_none());
    }

    #[test]
    fn test_json_malformed_is_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("index.json");
        fs::write(&path, "{not json").unwrap();
        let backend = JsonFileBackend::new(&path).unwrap();
        assert!(backend.load().is_err());
    }

    #[test]
    fn test_json_clear_is_idempotent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("index.json");
        let backend = JsonFileBackend::new(&path).unwrap();
        backend.persist(&snapshot(), 2).unwrap();

        backend.clear().unwrap();
        assert!(!path.exists());
        backend.clear().unwrap();
    }
}
