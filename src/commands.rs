// SPDX-License-Identifier: MIT OR Apache-2.0

//! Subcommand implementations for the docrag binary.

use anyhow::{bail, Context, Result};
use colored::Colorize;
use indicatif::{ParallelProgressIterator, ProgressBar, ProgressStyle};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;

use docrag::config::Config;
use docrag::document;
use docrag::embedding::{ChunkStrategy, TextChunker};
use docrag::output::{
    colorize_context, colorize_count, colorize_heading, colorize_path, colorize_score,
    colorize_warning, print_json, use_colors,
};
use docrag::rag::{AnswerMode, RagService};
use docrag::store::{LoadOutcome, VectorStore};

use crate::cli::OutputFormat;

#[derive(Debug, Serialize)]
struct IngestedFile {
    path: String,
    chunks: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct IngestReport {
    files: Vec<IngestedFile>,
    total_chunks: usize,
    total_vectors: usize,
}

#[derive(Debug, Serialize)]
struct ChunkReport<'a> {
    path: String,
    strategy: ChunkStrategy,
    chunks: &'a [String],
}

fn open_service(config: &Config, chunker: TextChunker) -> Result<RagService> {
    let store = config.open_store().context("Failed to open vector store")?;
    config.build_service(Arc::new(store), chunker)
}

/// Extracts and chunks every document in parallel, then embeds and stores
/// them one file at a time.
pub fn ingest(
    config: &Config,
    paths: &[PathBuf],
    strategy: Option<ChunkStrategy>,
    chunk_size: Option<usize>,
    chunk_overlap: Option<usize>,
    format: OutputFormat,
) -> Result<()> {
    let chunker = config.chunker(strategy, chunk_size, chunk_overlap)?;

    let mut seen = HashSet::new();
    let mut files = Vec::new();
    for path in paths {
        for file in document::collect_documents(path)? {
            let key = file.canonicalize().unwrap_or_else(|_| file.clone());
            if seen.insert(key) {
                files.push(file);
            }
        }
    }
    if files.is_empty() {
        bail!("No PDF, text or markdown files found");
    }

    let mut service = open_service(config, chunker)?;

    let pb = if format == OutputFormat::Text && files.len() > 1 {
        let pb = ProgressBar::new(files.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{bar:40.cyan/blue}] {pos}/{len} files | Extracting")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("##."),
        );
        pb
    } else {
        ProgressBar::hidden()
    };

    let chunker = service.chunker();
    let extracted: Vec<(PathBuf, std::result::Result<Vec<String>, String>)> = files
        .par_iter()
        .progress_with(pb.clone())
        .map(|path| {
            let chunks = document::load_text(path)
                .map(|text| chunker.chunk_text(&text))
                .map_err(|e| e.to_string());
            (path.clone(), chunks)
        })
        .collect();
    pb.finish_and_clear();

    let mut report = IngestReport {
        files: Vec::with_capacity(extracted.len()),
        total_chunks: 0,
        total_vectors: 0,
    };
    for (path, chunks) in extracted {
        let outcome = chunks.and_then(|chunks| {
            service
                .process_document(&chunks)
                .map_err(|e| e.to_string())
        });
        let shown = path.display().to_string();
        match outcome {
            Ok(stored) => {
                report.total_chunks += stored;
                report.files.push(IngestedFile {
                    path: shown,
                    chunks: stored,
                    error: None,
                });
            }
            Err(err) => {
                warn!("Failed to ingest {}: {}", shown, err);
                report.files.push(IngestedFile {
                    path: shown,
                    chunks: 0,
                    error: Some(err),
                });
            }
        }
    }
    report.total_vectors = service.stats().total_vectors;

    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Text => {
            let use_color = use_colors();
            for file in &report.files {
                match &file.error {
                    None => println!(
                        "{} {} ({} chunks)",
                        "✓".green(),
                        colorize_path(&file.path, use_color),
                        colorize_count(file.chunks, use_color)
                    ),
                    Some(err) => println!(
                        "{} {}: {}",
                        "✗".red(),
                        colorize_path(&file.path, use_color),
                        err
                    ),
                }
            }
            println!(
                "\nStored {} chunks. Index now holds {} vectors.",
                colorize_count(report.total_chunks, use_color),
                colorize_count(report.total_vectors, use_color)
            );
        }
    }

    if report.files.iter().all(|f| f.error.is_some()) {
        bail!("No documents were ingested");
    }
    Ok(())
}

pub fn ask(
    config: &Config,
    question: &str,
    top_k: Option<usize>,
    fallback: bool,
    show_context: bool,
    format: OutputFormat,
) -> Result<()> {
    let chunker = config.chunker(None, None, None)?;
    let mut service = open_service(config, chunker)?;
    if let Some(top_k) = top_k {
        service.set_top_k(top_k)?;
    }

    let answer = if fallback {
        service.get_answer_with_fallback(question)?
    } else {
        service.get_answer(question)?
    };

    match format {
        OutputFormat::Json => print_json(&answer)?,
        OutputFormat::Text => {
            let use_color = use_colors();
            if answer.mode == AnswerMode::Fallback {
                println!(
                    "{}",
                    colorize_warning(
                        "No relevant passages found; answering from a random passage.",
                        use_color
                    )
                );
            }
            println!("{}", answer.answer);

            if show_context {
                println!("\n{}", colorize_heading("Context:", use_color));
                println!("{}", colorize_context(&answer.context, use_color));
            }

            println!("\n{}", colorize_heading("Sources:", use_color));
            for (rank, source) in answer.sources.iter().enumerate() {
                let score = match source.similarity {
                    Some(similarity) => colorize_score(similarity, use_color),
                    None => "n/a".to_string(),
                };
                println!(
                    "  {}. [{}] {}",
                    rank + 1,
                    score,
                    colorize_context(&source.preview.replace('\n', " "), use_color)
                );
            }
        }
    }
    Ok(())
}

pub fn info(config: &Config, format: OutputFormat) -> Result<()> {
    let store = config.open_store().context("Failed to open vector store")?;
    let info = store.document_info();

    match format {
        OutputFormat::Json => {
            let value = serde_json::json!({
                "total_documents": info.total_documents,
                "total_vectors": info.total_vectors,
                "vector_dimension": info.vector_dimension,
                "top_k": config.retrieval.top_k(),
                "last_updated": info.last_updated,
                "backend": store.backend_name(),
                "index_path": index_location(config, &store),
                "recovered": store.load_outcome().is_recovered(),
            });
            print_json(&value)?;
        }
        OutputFormat::Text => {
            let use_color = use_colors();
            println!("{}", colorize_heading("docrag index", use_color));
            println!("  Backend:          {}", store.backend_name());
            if let Some(path) = index_location(config, &store) {
                println!("  Index path:       {}", colorize_path(&path, use_color));
            }
            println!(
                "  Documents:        {}",
                colorize_count(info.total_documents, use_color)
            );
            println!(
                "  Vectors:          {}",
                colorize_count(info.total_vectors, use_color)
            );
            println!("  Vector dimension: {}", info.vector_dimension);
            println!("  Top k:            {}", config.retrieval.top_k());
            match info.last_updated {
                Some(ts) => println!("  Last updated:     {}", ts.to_rfc3339()),
                None => println!("  Last updated:     never"),
            }
            if let LoadOutcome::Recovered { reason } = store.load_outcome() {
                println!(
                    "  {} {}",
                    colorize_warning("Index was unreadable:", use_color),
                    reason
                );
            }
        }
    }
    Ok(())
}

fn index_location(config: &Config, store: &VectorStore) -> Option<String> {
    match store.backend_name() {
        "memory" => None,
        _ => Some(config.store.index_path().display().to_string()),
    }
}

pub fn clear(config: &Config, format: OutputFormat) -> Result<()> {
    let store = config.open_store().context("Failed to open vector store")?;
    let removed = store.len();
    store.clear_index()?;

    match format {
        OutputFormat::Json => print_json(&serde_json::json!({ "removed": removed }))?,
        OutputFormat::Text => println!(
            "Cleared {} vectors from the index.",
            colorize_count(removed, use_colors())
        ),
    }
    Ok(())
}

pub fn chunk(
    config: &Config,
    path: &Path,
    strategy: Option<ChunkStrategy>,
    format: OutputFormat,
) -> Result<()> {
    let chunker = config.chunker(strategy, None, None)?;
    let text = document::load_text(path)?;
    let chunks = chunker.chunk_text(&text);

    match format {
        OutputFormat::Json => print_json(&ChunkReport {
            path: path.display().to_string(),
            strategy: chunker.config().strategy,
            chunks: &chunks,
        })?,
        OutputFormat::Text => {
            let use_color = use_colors();
            for (i, chunk) in chunks.iter().enumerate() {
                println!(
                    "{} {} ({} chars)",
                    colorize_heading(&format!("--- chunk {}", i + 1), use_color),
                    colorize_path(&path.display().to_string(), use_color),
                    chunk.chars().count()
                );
                println!("{}\n", chunk);
            }
            println!("{} chunks", colorize_count(chunks.len(), use_color));
        }
    }
    Ok(())
}
