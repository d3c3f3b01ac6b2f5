// SPDX-License-Identifier: MIT OR Apache-2.0

//! Google Generative Language API adapter.
//!
//! One typed client serves both capabilities: `batchEmbedContents` for
//! embeddings and `generateContent` for answers.

use anyhow::{anyhow, bail, Context, Result};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::embedding::EmbeddingProvider;
use crate::generation::GenerationProvider;

pub const GEMINI_API_KEY_ENV: &str = "GEMINI_API_KEY";
pub const DEFAULT_GENERATION_MODEL: &str = "gemini-1.5-flash";
pub const DEFAULT_EMBEDDING_MODEL: &str = "embedding-001";
/// Vector length returned by the Gemini embedding models.
pub const EMBEDDING_DIM: usize = 768;
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const MAX_EMBED_BATCH: usize = 100;

/// Blocking client for one Gemini model.
pub struct GeminiClient {
    http: Client,
    api_key: String,
    model: String,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: String,
    content: Content<'a>,
}

#[derive(Debug, Serialize)]
struct BatchEmbedRequest<'a> {
    requests: Vec<EmbedRequest<'a>>,
}

#[derive(Debug, Deserialize)]
struct ContentEmbedding {
    values: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<ContentEmbedding>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    max_output_tokens: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<ResponseContent>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

impl GeminiClient {
    /// Creates a client for `model` with the given request timeout.
    pub fn new(api_key: String, model: String, timeout: Duration) -> Result<Self> {
        if api_key.trim().is_empty() {
            bail!("{} is empty", GEMINI_API_KEY_ENV);
        }
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            http,
            api_key,
            model,
            base_url: API_BASE.to_string(),
        })
    }

    /// Creates a client reading the API key from `GEMINI_API_KEY`.
    pub fn from_env(model: String, timeout: Duration) -> Result<Self> {
        let api_key = std::env::var(GEMINI_API_KEY_ENV)
            .with_context(|| format!("{} is required for the gemini provider", GEMINI_API_KEY_ENV))?;
        Self::new(api_key, model, timeout)
    }

    /// Points the client at another API root.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/models/{}:{}", self.base_url, self.model, method)
    }

    fn post<B: Serialize, R: for<'de> Deserialize<'de>>(&self, method: &str, body: &B) -> Result<R> {
        let response = self
            .http
            .post(self.endpoint(method))
            .query(&[("key", self.api_key.as_str())])
            .json(body)
            .send()
            .with_context(|| format!("Gemini {} request failed", method))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().unwrap_or_default();
            bail!("Gemini {} returned {}: {}", method, status, detail.trim());
        }
        response
            .json()
            .with_context(|| format!("Failed to decode Gemini {} response", method))
    }
}

impl EmbeddingProvider for GeminiClient {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn batch_size(&self) -> usize {
        MAX_EMBED_BATCH
    }

    fn embed_texts(&mut self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        debug!("Getting embeddings for {} texts from {}", texts.len(), self.model);

        let request = BatchEmbedRequest {
            requests: texts
                .iter()
                .map(|text| EmbedRequest {
                    model: format!("models/{}", self.model),
                    content: Content {
                        parts: vec![Part { text }],
                    },
                })
                .collect(),
        };
        let response: BatchEmbedResponse = self.post("batchEmbedContents", &request)?;
        Ok(response.embeddings.into_iter().map(|e| e.values).collect())
    }
}

impl GenerationProvider for GeminiClient {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn generate(&mut self, prompt: &str, max_length: usize) -> Result<String> {
        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part { text: prompt }],
            }],
            // Roughly four characters per token.
            generation_config: GenerationConfig {
                max_output_tokens: (max_length / 4).max(64),
            },
        };
        let response: GenerateResponse = self.post("generateContent", &request)?;
        let content = response
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .ok_or_else(|| anyhow!("Gemini returned no candidates"))?;
        Ok(content
            .parts
            .into_iter()
            .map(|p| p.text)
            .collect::<Vec<_>>()
            .join(""))
    }
}
