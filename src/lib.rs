// SPDX-License-Identifier: MIT OR Apache-2.0

//! docrag - Retrieval-augmented question answering over PDF documents
//!
//! Shared modules for the docrag CLI tool.

pub mod config;
pub mod document;
pub mod embedding;
pub mod errors;
pub mod gemini;
pub mod generation;
pub mod output;
pub mod rag;
pub mod store;

pub use errors::{RagError, Result};
