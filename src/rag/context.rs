// SPDX-License-Identifier: MIT OR Apache-2.0

//! Turns ranked search results into a prompt context block.

use crate::errors::{RagError, Result};
use crate::store::{rank_by_similarity, SearchResult};

/// Results at or below this similarity never reach the prompt.
pub const SIMILARITY_THRESHOLD: f32 = 0.3;

/// Maximum number of chunks placed in the context.
pub const MAX_CONTEXT_CHUNKS: usize = 3;

/// Context text together with the results it was built from.
#[derive(Debug, Clone)]
pub struct BuiltContext {
    pub text: String,
    pub used: Vec<SearchResult>,
}

/// Builds the context block from search results.
///
/// Keeps results above [`SIMILARITY_THRESHOLD`], best first, at most
/// [`MAX_CONTEXT_CHUNKS`] of them. Fails with `InsufficientContext` when
/// nothing survives.
pub fn build_context(results: &[SearchResult]) -> Result<BuiltContext> {
    let mut used: Vec<SearchResult> = results
        .iter()
        .filter(|r| r.similarity > SIMILARITY_THRESHOLD)
        .cloned()
        .collect();
    rank_by_similarity(&mut used);
    used.truncate(MAX_CONTEXT_CHUNKS);

    if used.is_empty() {
        return Err(RagError::InsufficientContext);
    }

    let text = used
        .iter()
        .enumerate()
        .map(|(i, r)| {
            format!(
                "[Document {} - Similarity: {:.3}]\n{}",
                i + 1,
                r.similarity,
                r.document
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    Ok(BuiltContext { text, used })
}
