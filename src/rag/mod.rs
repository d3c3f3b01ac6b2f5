// SPDX-License-Identifier: MIT OR Apache-2.0

//! Retrieval and answer orchestration.

pub mod context;
pub mod service;

pub use context::{build_context, BuiltContext, MAX_CONTEXT_CHUNKS, SIMILARITY_THRESHOLD};
pub use service::{
    build_prompt, clean_answer, Answer, AnswerMode, RagService, RagStats, Source, DEFAULT_TOP_K,
    MAX_TOP_K,
};
