// SPDX-License-Identifier: MIT OR Apache-2.0

//! CLI argument parsing using clap

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

/// docrag - Ask questions about your PDF documents
///
/// Extracts text from PDFs, embeds it into a local vector index and answers
/// questions from the most relevant passages.
#[derive(Parser, Debug)]
#[command(name = "docrag")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true)]
    pub format: Option<OutputFormat>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output format for results
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Chunking strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum CliChunkStrategy {
    /// Character windows cut at sentence ends
    Sentence,
    /// Blank-line separated paragraphs
    Paragraph,
}

impl From<CliChunkStrategy> for docrag::embedding::ChunkStrategy {
    fn from(value: CliChunkStrategy) -> Self {
        match value {
            CliChunkStrategy::Sentence => Self::Sentence,
            CliChunkStrategy::Paragraph => Self::Paragraph,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Extract, chunk, embed and store PDF or text files
    #[command(alias = "i")]
    Ingest {
        /// Files or directories to ingest
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Chunking strategy
        #[arg(long, value_enum)]
        strategy: Option<CliChunkStrategy>,

        /// Characters per chunk
        #[arg(long)]
        chunk_size: Option<usize>,

        /// Characters repeated between consecutive chunks
        #[arg(long)]
        chunk_overlap: Option<usize>,
    },

    /// Answer a question from the ingested documents
    #[command(alias = "a")]
    Ask {
        /// The question to answer
        question: String,

        /// Number of chunks to retrieve (1-10)
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Answer from a random stored chunk if retrieval fails
        #[arg(long)]
        fallback: bool,

        /// Print the context given to the generator
        #[arg(long)]
        show_context: bool,
    },

    /// Show index statistics
    Info,

    /// Remove every stored chunk and the index file
    Clear,

    /// Print the chunks a file would be split into, without storing them
    Chunk {
        /// File to chunk
        path: PathBuf,

        /// Chunking strategy
        #[arg(long, value_enum)]
        strategy: Option<CliChunkStrategy>,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}
