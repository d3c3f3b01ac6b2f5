// SPDX-License-Identifier: MIT OR Apache-2.0

//! docrag - Ask questions about PDF documents
//!
//! Extracts text from PDFs, embeds the chunks into a local vector index and
//! answers questions from the most similar passages.

mod cli;
mod commands;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Commands, OutputFormat};
use docrag::config::{Config, ConfigOutputFormat};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    // Initialize tracing with DOCRAG_LOG env var (e.g., DOCRAG_LOG=debug docrag ask "question")
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("DOCRAG_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load();
    let format = cli.format.unwrap_or(match config.default_format.unwrap_or_default() {
        ConfigOutputFormat::Text => OutputFormat::Text,
        ConfigOutputFormat::Json => OutputFormat::Json,
    });

    match cli.command {
        Commands::Ingest {
            paths,
            strategy,
            chunk_size,
            chunk_overlap,
        } => {
            commands::ingest(
                &config,
                &paths,
                strategy.map(Into::into),
                chunk_size,
                chunk_overlap,
                format,
            )?;
        }
        Commands::Ask {
            question,
            top_k,
            fallback,
            show_context,
        } => {
            commands::ask(&config, &question, top_k, fallback, show_context, format)?;
        }
        Commands::Info => {
            commands::info(&config, format)?;
        }
        Commands::Clear => {
            commands::clear(&config, format)?;
        }
        Commands::Chunk { path, strategy } => {
            commands::chunk(&config, &path, strategy.map(Into::into), format)?;
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "docrag", &mut std::io::stdout());
        }
    }

    Ok(())
}
