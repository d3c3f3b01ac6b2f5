// SPDX-License-Identifier: MIT OR Apache-2.0

//! Text chunker for embedding generation.
//!
//! This module splits extracted document text into chunks suitable for
//! embedding generation. The default strategy walks the normalized text in
//! fixed-size character windows, preferring to cut at a sentence end near the
//! end of the window and overlapping consecutive windows otherwise. A
//! paragraph packer is available as an alternative.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::errors::{RagError, Result};

/// Default number of characters per chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// Default overlap between consecutive chunks cut at a hard boundary.
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

/// Chunks with this many characters or fewer are skipped.
pub const MIN_CHUNK_CHARS: usize = 50;

/// A sentence end is only used as a cut point past this fraction of the window.
const SENTENCE_BREAK_RATIO: f64 = 0.7;

static PARAGRAPH_BREAK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n\s*\n").expect("valid paragraph regex"));

/// How text is split into chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkStrategy {
    /// Sliding character window with sentence-aware cuts
    #[default]
    Sentence,
    /// Blank-line separated paragraphs packed up to the chunk size
    Paragraph,
}

impl std::fmt::Display for ChunkStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChunkStrategy::Sentence => write!(f, "sentence"),
            ChunkStrategy::Paragraph => write!(f, "paragraph"),
        }
    }
}

/// Configuration for the text chunker.
#[derive(Debug, Clone)]
pub struct ChunkConfig {
    /// Number of characters per chunk.
    pub chunk_size: usize,
    /// Number of characters repeated between chunks cut at a hard boundary.
    pub chunk_overlap: usize,
    /// Chunks must be strictly longer than this (sentence strategy only).
    pub min_chunk_chars: usize,
    /// Splitting strategy.
    pub strategy: ChunkStrategy,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            min_chunk_chars: MIN_CHUNK_CHARS,
            strategy: ChunkStrategy::default(),
        }
    }
}

impl ChunkConfig {
    /// Creates a new ChunkConfig with the specified parameters.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(RagError::InvalidConfig(
                "chunk_size must be greater than 0".to_string(),
            ));
        }
        if chunk_overlap >= chunk_size {
            return Err(RagError::InvalidConfig(format!(
                "chunk_overlap ({}) must be less than chunk_size ({})",
                chunk_overlap, chunk_size
            )));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
            ..Default::default()
        })
    }

    /// Sets the minimum chunk length.
    pub fn with_min_chunk_chars(mut self, chars: usize) -> Self {
        self.min_chunk_chars = chars;
        self
    }

    /// Sets the splitting strategy.
    pub fn with_strategy(mut self, strategy: ChunkStrategy) -> Self {
        self.strategy = strategy;
        self
    }
}

/// Splits document text into chunks for embedding generation.
#[derive(Debug, Clone)]
pub struct TextChunker {
    config: ChunkConfig,
}

impl TextChunker {
    /// Creates a new chunker with the given configuration.
    pub fn new(config: ChunkConfig) -> Self {
        Self { config }
    }

    /// Creates a chunker with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(ChunkConfig::default())
    }

    /// Returns the current configuration.
    pub fn config(&self) -> &ChunkConfig {
        &self.config
    }

    /// Splits text using the configured strategy.
    pub fn chunk_text(&self, text: &str) -> Vec<String> {
        match self.config.strategy {
            ChunkStrategy::Sentence => self.chunk_sentences(text),
            ChunkStrategy::Paragraph => self.chunk_paragraphs(text),
        }
    }

    /// Splits text into sentence-aware, overlapping windows.
    ///
    /// Algorithm:
    /// ```text
    /// text = normalize_whitespace(text)
    /// start = 0
    /// while start < len(text):
    ///   end = min(start + chunk_size, len(text))
    ///   window = text[start..end]
    ///   if end < len(text):
    ///     p = last index of '.', '?' or '!' in window
    ///     if p > 0.7 * chunk_size:
    ///       emit window[..=p]; start += p + 1
    ///     else:
    ///       emit window; start = end - chunk_overlap
    ///   else:
    ///     emit window; start = end
    /// ```
    ///
    /// Emitted chunks are trimmed and kept only if longer than
    /// `min_chunk_chars`.
    pub fn chunk_sentences(&self, text: &str) -> Vec<String> {
        let normalized = normalize_whitespace(text);
        if normalized.is_empty() {
            return Vec::new();
        }

        let chars: Vec<char> = normalized.chars().collect();
        let total = chars.len();
        let size = self.config.chunk_size.max(1);
        let overlap = self.config.chunk_overlap.min(size - 1);
        let break_threshold = size as f64 * SENTENCE_BREAK_RATIO;

        let mut chunks = Vec::new();
        let mut start = 0_usize;

        while start < total {
            let end = (start + size).min(total);
            let window = &chars[start..end];

            let (piece, next_start) = if end < total {
                match window.iter().rposition(|c| matches!(c, '.' | '?' | '!')) {
                    Some(pos) if pos as f64 > break_threshold => (&window[..=pos], start + pos + 1),
                    _ => (window, end - overlap),
                }
            } else {
                (window, end)
            };

            let chunk: String = piece.iter().collect();
            let trimmed = chunk.trim();
            if trimmed.chars().count() > self.config.min_chunk_chars {
                chunks.push(trimmed.to_string());
            }

            start = next_start;
        }

        chunks
    }

    /// Packs blank-line separated paragraphs into chunks of at most
    /// `chunk_size` characters. Paragraphs are never split, so a paragraph
    /// longer than `chunk_size` becomes a chunk of its own.
    pub fn chunk_paragraphs(&self, text: &str) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut current = String::new();
        let mut current_len = 0_usize;

        for paragraph in PARAGRAPH_BREAK.split(text) {
            let paragraph = paragraph.trim();
            if paragraph.is_empty() {
                continue;
            }
            let paragraph_len = paragraph.chars().count();

            if current_len + paragraph_len > self.config.chunk_size {
                if !current.is_empty() {
                    chunks.push(std::mem::take(&mut current));
                }
                current.push_str(paragraph);
                current_len = paragraph_len;
            } else {
                if !current.is_empty() {
                    current.push_str("\n\n");
                    current_len += 2;
                }
                current.push_str(paragraph);
                current_len += paragraph_len;
            }
        }

        if !current.is_empty() {
            chunks.push(current);
        }

        chunks
    }
}

/// Collapses every run of whitespace into a single space and trims the ends.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
