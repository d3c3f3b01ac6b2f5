// SPDX-License-Identifier: MIT OR Apache-2.0

//! Answer orchestration: ingest chunks, retrieve context, generate answers.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::context::build_context;
use crate::document;
use crate::embedding::{EmbeddingGateway, TextChunker};
use crate::errors::{RagError, Result};
use crate::generation::GenerationProvider;
use crate::store::{SearchResult, VectorStore};

pub const DEFAULT_TOP_K: usize = 3;
pub const MAX_TOP_K: usize = 10;
pub const DEFAULT_MAX_LENGTH: usize = 1000;
pub const PREVIEW_CHARS: usize = 200;

static ANSWER_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*answer:\s*").expect("valid answer prefix regex"));

/// How an answer was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerMode {
    /// From chunks retrieved by similarity
    Grounded,
    /// From one random chunk after the grounded path failed
    Fallback,
}

/// A chunk that contributed to an answer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Source {
    /// `None` for fallback answers, which skip similarity search
    pub similarity: Option<f32>,
    pub preview: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub answer: String,
    pub context: String,
    pub sources: Vec<Source>,
    pub mode: AnswerMode,
}

/// Service-level counters.
#[derive(Debug, Clone, Serialize)]
pub struct RagStats {
    pub total_documents: usize,
    pub total_vectors: usize,
    pub vector_dimension: usize,
    pub top_k: usize,
    pub last_updated: Option<DateTime<Utc>>,
    pub backend: &'static str,
    pub embedding_model: String,
    pub generation_model: String,
}

/// Retrieval-augmented question answering over a shared [`VectorStore`].
pub struct RagService {
    gateway: EmbeddingGateway,
    generator: Box<dyn GenerationProvider>,
    store: Arc<VectorStore>,
    chunker: TextChunker,
    top_k: usize,
    max_length: usize,
}

impl RagService {
    /// Creates a service. The gateway and store must agree on the dimension.
    pub fn new(
        gateway: EmbeddingGateway,
        generator: Box<dyn GenerationProvider>,
        store: Arc<VectorStore>,
        chunker: TextChunker,
    ) -> Result<Self> {
        if gateway.dimension() != store.dimension() {
            return Err(RagError::InvalidConfig(format!(
                "embedding dimension {} does not match store dimension {}",
                gateway.dimension(),
                store.dimension()
            )));
        }
        Ok(Self {
            gateway,
            generator,
            store,
            chunker,
            top_k: DEFAULT_TOP_K,
            max_length: DEFAULT_MAX_LENGTH,
        })
    }

    /// Sets the maximum answer length in characters.
    pub fn with_max_length(mut self, max_length: usize) -> Self {
        self.max_length = max_length.max(1);
        self
    }

    pub fn store(&self) -> &Arc<VectorStore> {
        &self.store
    }

    pub fn chunker(&self) -> &TextChunker {
        &self.chunker
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Sets how many chunks are retrieved per question (1 to 10).
    pub fn set_top_k(&mut self, top_k: usize) -> Result<()> {
        if !(1..=MAX_TOP_K).contains(&top_k) {
            return Err(RagError::InvalidConfig(format!(
                "top_k must be between 1 and {}, got {}",
                MAX_TOP_K, top_k
            )));
        }
        self.top_k = top_k;
        Ok(())
    }

    /// Embeds `chunks` and stores them. Returns the number of chunks stored.
    pub fn process_document(&mut self, chunks: &[String]) -> Result<usize> {
        if chunks.is_empty() {
            return Err(RagError::EmptyInput);
        }
        debug!("Processing {} text chunks", chunks.len());

        let vectors = self.gateway.embed(chunks)?;
        self.store.add_vectors(vectors, chunks.to_vec())?;

        info!("Stored {} chunks", chunks.len());
        Ok(chunks.len())
    }

    /// Chunks `text` with the configured chunker and stores the chunks.
    pub fn ingest_text(&mut self, text: &str) -> Result<usize> {
        let chunks = self.chunker.chunk_text(text);
        self.process_document(&chunks)
    }

    /// Loads a PDF or text file, then chunks and stores it.
    pub fn ingest_file(&mut self, path: &Path) -> Result<usize> {
        let text = document::load_text(path)?;
        let stored = self.ingest_text(&text)?;
        info!("Ingested {} ({} chunks)", path.display(), stored);
        Ok(stored)
    }

    /// Answers `question` from the most similar stored chunks.
    pub fn get_answer(&mut self, question: &str) -> Result<Answer> {
        if self.store.is_empty() {
            return Err(RagError::NoDocuments);
        }

        let query = self.gateway.embed_one(question)?;
        let results = self.store.search(&query, self.top_k)?;
        if results.is_empty() {
            return Err(RagError::NoResults);
        }

        let built = build_context(&results)?;
        let answer = self.generate_answer(question, &built.text)?;

        Ok(Answer {
            answer,
            sources: built.used.iter().map(source_for).collect(),
            context: built.text,
            mode: AnswerMode::Grounded,
        })
    }

    /// Like [`RagService::get_answer`], but falls back to one random stored
    /// chunk as context when the grounded path fails.
    pub fn get_answer_with_fallback(&mut self, question: &str) -> Result<Answer> {
        let primary = match self.get_answer(question) {
            Ok(answer) => return Ok(answer),
            Err(err) => err,
        };
        warn!(
            "Grounded answer failed ({}); answering from a random chunk",
            primary
        );

        self.answer_from_random_chunk(question)
            .map_err(|fallback| RagError::FallbackFailed {
                primary: primary.to_string(),
                fallback: fallback.to_string(),
            })
    }

    fn answer_from_random_chunk(&mut self, question: &str) -> Result<Answer> {
        let total = self.store.len();
        if total == 0 {
            return Err(RagError::NoDocuments);
        }
        let index = rand::thread_rng().gen_range(0..total);
        let chunk = self
            .store
            .get_document(index)
            .ok_or(RagError::NoDocuments)?;

        let answer = self.generate_answer(question, &chunk)?;
        Ok(Answer {
            answer,
            sources: vec![Source {
                similarity: None,
                preview: preview(&chunk),
            }],
            context: chunk,
            mode: AnswerMode::Fallback,
        })
    }

    fn generate_answer(&mut self, question: &str, context: &str) -> Result<String> {
        let prompt = build_prompt(context, question);
        let raw = self
            .generator
            .generate(&prompt, self.max_length)
            .map_err(RagError::generation)?;
        Ok(clean_answer(&raw, self.max_length))
    }

    pub fn stats(&self) -> RagStats {
        let info = self.store.document_info();
        RagStats {
            total_documents: info.total_documents,
            total_vectors: info.total_vectors,
            vector_dimension: info.vector_dimension,
            top_k: self.top_k,
            last_updated: info.last_updated,
            backend: self.store.backend_name(),
            embedding_model: self.gateway.model_id().to_string(),
            generation_model: self.generator.model_id().to_string(),
        }
    }
}

/// Builds the generation prompt for `question` over `context`.
pub fn build_prompt(context: &str, question: &str) -> String {
    format!(
        "Context: {}\n\nQuestion: {}\n\nPlease provide a clear and concise answer based on the context provided.",
        context, question
    )
}

/// Caps `raw` at `max_length` characters, then strips a leading `Answer:`.
pub fn clean_answer(raw: &str, max_length: usize) -> String {
    let limited = match raw.char_indices().nth(max_length) {
        Some((cut, _)) => format!("{}...", &raw[..cut]),
        None => raw.to_string(),
    };
    ANSWER_PREFIX.replace(&limited, "").trim().to_string()
}

fn source_for(result: &SearchResult) -> Source {
    Source {
        similarity: Some(result.similarity),
        preview: preview(&result.document),
    }
}

fn preview(document: &str) -> String {
    match document.char_indices().nth(PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}...", &document[..cut]),
        None => document.to_string(),
    }
}
