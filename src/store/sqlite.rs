// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite-based storage for index entries.
//!
//! Unlike the JSON snapshot, each write only inserts the newly appended
//! entries inside a single transaction, so a crash never leaves a half
//! written index behind.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::backend::{IndexBackend, IndexSnapshot};
use crate::errors::Result;

const LAST_UPDATED_KEY: &str = "last_updated";

/// Append-only SQLite backend.
///
/// Stores entries in `.docrag/index.sqlite` by default.
pub struct SqliteBackend {
    conn: Mutex<Connection>,
    path: PathBuf,
}

impl SqliteBackend {
    /// Opens or creates a database at the specified path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(&path)?;
        let backend = Self {
            conn: Mutex::new(conn),
            path,
        };
        backend.init_schema()?;

        Ok(backend)
    }

    /// Returns the path to the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Initializes the database schema if it does not exist.
    fn init_schema(&self) -> Result<()> {
        self.conn().execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS entries (
                position INTEGER PRIMARY KEY,
                document TEXT NOT NULL,
                embedding BLOB NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    /// Converts an embedding vector to a compact blob.
    fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    /// Converts a blob back to an embedding vector.
    fn blob_to_embedding(blob: &[u8]) -> Vec<f32> {
        blob.chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect()
    }
}

impl IndexBackend for SqliteBackend {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn location(&self) -> Option<&Path> {
        Some(&self.path)
    }

    fn load(&self) -> Result<Option<IndexSnapshot>> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare("SELECT document, embedding FROM entries ORDER BY position")?;
        let rows = stmt
            .query_map([], |row| {
                let document: String = row.get(0)?;
                let blob: Vec<u8> = row.get(1)?;
                Ok((document, Self::blob_to_embedding(&blob)))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        if rows.is_empty() {
            return Ok(None);
        }

        let timestamp: Option<String> = conn
            .query_row(
                "SELECT value FROM meta WHERE key = ?1",
                params![LAST_UPDATED_KEY],
                |row| row.get(0),
            )
            .optional()?;
        let timestamp = timestamp
            .and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok())
            .map(|ts| ts.with_timezone(&Utc));

        let (documents, vectors) = rows.into_iter().unzip();
        Ok(Some(IndexSnapshot {
            vectors,
            documents,
            timestamp,
        }))
    }

    fn persist(&self, snapshot: &IndexSnapshot, appended: usize) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let start = snapshot.vectors.len().saturating_sub(appended);
        // Rows at or past `start` are not part of the snapshot.
        tx.execute(
            "DELETE FROM entries WHERE position >= ?1",
            params![start as i64],
        )?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO entries (position, document, embedding) VALUES (?1, ?2, ?3)",
            )?;
            for position in start..snapshot.vectors.len() {
                stmt.execute(params![
                    position as i64,
                    snapshot.documents[position],
                    Self::embedding_to_blob(&snapshot.vectors[position]),
                ])?;
            }
        }

        if let Some(timestamp) = snapshot.timestamp {
            tx.execute(
                r#"
                INSERT INTO meta (key, value)
                VALUES (?1, ?2)
                ON CONFLICT(key) DO UPDATE SET value = excluded.value
                "#,
                params![LAST_UPDATED_KEY, timestamp.to_rfc3339()],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.conn().execute_batch(
            r#"
            DELETE FROM entries;
            DELETE FROM meta;
            "#,
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn snapshot(n: usize) -> IndexSnapshot {
        IndexSnapshot {
            vectors: (0..n).map(|i| vec![i as f32, 1.0, -0.5]).collect(),
            documents: (0..n).map(|i| format!("document {}", i)).collect(),
            timestamp: Some(Utc::now()),
        }
    }

    #[test]
    fn test_storage_create_and_open() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("index.sqlite");

        let backend = SqliteBackend::open(&db_path).unwrap();
        assert!(db_path.exists());
        assert!(backend.load().unwrap().is_none());
        drop(backend);

        let backend = SqliteBackend::open(&db_path).unwrap();
        assert!(backend.load().unwrap().is_none());
    }

    #[test]
    fn test_appends_only_new_entries() {
        let dir = tempdir().unwrap();
        let backend = SqliteBackend::open(dir.path().join("index.sqlite")).unwrap();

        backend.persist(&snapshot(2), 2).unwrap();
        backend.persist(&snapshot(5), 3).unwrap();

        let loaded = backend.load().unwrap().unwrap();
        assert_eq!(loaded.documents.len(), 5);
        assert_eq!(loaded.documents[4], "document 4");
        assert_eq!(loaded.vectors[3], vec![3.0, 1.0, -0.5]);
        assert!(loaded.timestamp.is_some());
    }

    #[test]
    fn test_reopen_keeps_entries() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("index.sqlite");
        {
            let backend = SqliteBackend::open(&path).unwrap();
            backend.persist(&snapshot(3), 3).unwrap();
        }
        let backend = SqliteBackend::open(&path).unwrap();
        assert_eq!(backend.load().unwrap().unwrap().vectors.len(), 3);
    }

    #[test]
    fn test_persist_drops_rows_past_snapshot() {
        let dir = tempdir().unwrap();
        let backend = SqliteBackend::open(dir.path().join("index.sqlite")).unwrap();
        backend.persist(&snapshot(4), 4).unwrap();

        backend.persist(&snapshot(1), 1).unwrap();

        let loaded = backend.load().unwrap().unwrap();
        assert_eq!(loaded.documents, vec!["document 0".to_string()]);
    }

    #[test]
    fn test_clear_is_idempotent() {
        let dir = tempdir().unwrap();
        let backend = SqliteBackend::open(dir.path().join("index.sqlite")).unwrap();
        backend.persist(&snapshot(3), 3).unwrap();

        backend.clear().unwrap();
        assert!(backend.load().unwrap().is_none());
        backend.clear().unwrap();
    }

    #[test]
    fn test_blob_roundtrip() {
        let vector = vec![0.25, -1.5, 3.0];
        let blob = SqliteBackend::embedding_to_blob(&vector);
        assert_eq!(blob.len(), 12);
        assert_eq!(SqliteBackend::blob_to_embedding(&blob), vector);
    }
}
