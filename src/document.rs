// SPDX-License-Identifier: MIT OR Apache-2.0

//! Document discovery and text extraction.

use lopdf::Document;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

use crate::errors::{RagError, Result};

/// File extensions accepted by [`load_text`].
pub const SUPPORTED_EXTENSIONS: &[&str] = &["pdf", "txt", "md"];

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
}

/// Returns true when `path` has a supported extension.
pub fn is_supported(path: &Path) -> bool {
    extension_of(path)
        .map(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

/// Extracts the text of a PDF, text or markdown file.
pub fn load_text(path: &Path) -> Result<String> {
    match extension_of(path).as_deref() {
        Some("pdf") => load_pdf(path),
        Some("txt") | Some("md") => Ok(fs::read_to_string(path)?),
        _ => Err(RagError::Validation(format!(
            "unsupported file type: {} (expected one of: {})",
            path.display(),
            SUPPORTED_EXTENSIONS.join(", ")
        ))),
    }
}

fn load_pdf(path: &Path) -> Result<String> {
    let doc = Document::load(path).map_err(|e| {
        RagError::Validation(format!("failed to read PDF {}: {}", path.display(), e))
    })?;

    // Pages come back keyed by page number, already in order.
    let pages = doc.get_pages();
    let mut texts = Vec::with_capacity(pages.len());
    for page_num in pages.keys() {
        match doc.extract_text(&[*page_num]) {
            Ok(text) => {
                let trimmed = text.trim();
                if !trimmed.is_empty() {
                    texts.push(trimmed.to_string());
                }
            }
            Err(err) => debug!("Skipping page {} of {}: {}", page_num, path.display(), err),
        }
    }

    if texts.is_empty() {
        return Err(RagError::Validation(format!(
            "no extractable text in {}",
            path.display()
        )));
    }
    debug!("Extracted {} pages from {}", texts.len(), path.display());
    Ok(texts.join("\n\n"))
}

/// Expands `path` into the documents to ingest.
///
/// A file is returned as is. A directory is walked recursively for
/// supported files, sorted by path.
pub fn collect_documents(path: &Path) -> Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    if !path.is_dir() {
        return Err(RagError::Validation(format!(
            "path does not exist: {}",
            path.display()
        )));
    }

    let mut files: Vec<PathBuf> = WalkDir::new(path)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|p| is_supported(p))
        .collect();
    files.sort();
    Ok(files)
}
